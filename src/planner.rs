//! Tear-down and bring-up planning
//!
//! Works out which interfaces have to go down and come back up, and in
//! which order, from a diff and the dependency graphs of both snapshots.

use crate::diff::ConfigDiff;
use crate::model::{InterfaceType, Snapshot};
use crate::network::Sysfs;
use crate::stanza;
use log::info;
use std::collections::{BTreeMap, BTreeSet};

/// Priority of interface types when walking a list
#[derive(Debug, Clone, Copy)]
pub struct TypeOrder(&'static [InterfaceType]);

impl TypeOrder {
    /// Dependents first
    pub const DOWN: TypeOrder = TypeOrder(&[
        InterfaceType::Label,
        InterfaceType::Vlan,
        InterfaceType::Bonding,
        InterfaceType::Lo,
        InterfaceType::Eth,
    ]);

    /// Prerequisites first
    pub const UP: TypeOrder = TypeOrder(&[
        InterfaceType::Eth,
        InterfaceType::Lo,
        InterfaceType::Bonding,
        InterfaceType::Vlan,
        InterfaceType::Label,
    ]);

    /// Upgrade bootstrap configuration order
    pub const ONLINE: TypeOrder = TypeOrder(&[
        InterfaceType::Eth,
        InterfaceType::Bonding,
        InterfaceType::Vlan,
        InterfaceType::Label,
    ]);

    pub fn types(&self) -> &'static [InterfaceType] {
        self.0
    }
}

/// Group by type in priority order, alphabetical within a type
///
/// Interfaces whose type is not in the order are left out.
pub fn sort_by_type<'a, I>(snapshot: &Snapshot, ifaces: I, order: TypeOrder) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut by_type: BTreeMap<InterfaceType, Vec<&String>> = BTreeMap::new();
    for iface in ifaces {
        if let Some(iftype) = snapshot.iface_type(iface) {
            by_type.entry(iftype).or_default().push(iface);
        }
    }

    let mut sorted = Vec::new();
    for iftype in order.types() {
        if let Some(names) = by_type.get_mut(iftype) {
            names.sort();
            sorted.extend(names.iter().map(|n| n.to_string()));
        }
    }
    sorted
}

/// Modified and removed interfaces plus their active dependents
pub fn down_list(current: &Snapshot, diff: &ConfigDiff) -> BTreeSet<String> {
    let base: BTreeSet<String> = diff.modified.union(&diff.removed).cloned().collect();
    let dependents = current.dependent_closure(&base);
    base.union(&dependents).cloned().collect()
}

/// Unchanged physical, bonded and VLAN interfaces the kernel lacks or has down
pub fn missing_list(new: &Snapshot, diff: &ConfigDiff, sysfs: &Sysfs) -> BTreeSet<String> {
    let changed: BTreeSet<&String> = diff.modified.iter().chain(&diff.added).collect();
    let mut missing = BTreeSet::new();
    for iface in new.auto() {
        if changed.contains(iface) {
            continue;
        }
        let eligible = matches!(
            new.iface_type(iface),
            Some(InterfaceType::Eth | InterfaceType::Bonding | InterfaceType::Vlan)
        );
        if eligible && sysfs.is_missing_or_down(iface) {
            info!("Interface {} is missing or down, adding to up list", iface);
            missing.insert(iface.clone());
        }
    }
    missing
}

/// Modified, added and missing interfaces plus their active dependents
pub fn up_list(new: &Snapshot, diff: &ConfigDiff, missing: &BTreeSet<String>) -> BTreeSet<String> {
    let base: BTreeSet<String> = diff
        .modified
        .iter()
        .chain(&diff.added)
        .chain(missing)
        .cloned()
        .collect();
    let dependents = new.dependent_closure(&base);
    base.union(&dependents).cloned().collect()
}

/// Interfaces whose routes have to be pushed again
///
/// Labels stand for their base interface; bond slaves carry no routes.
pub fn updated_ifaces<'a, I>(snapshot: &Snapshot, ifaces: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut updated = BTreeSet::new();
    for iface in ifaces {
        match snapshot.iface_type(iface) {
            Some(InterfaceType::Label) => {
                updated.insert(stanza::base_iface(iface).to_string());
            }
            Some(
                InterfaceType::Eth | InterfaceType::Vlan | InterfaceType::Bonding | InterfaceType::Lo,
            ) => {
                updated.insert(iface.clone());
            }
            Some(InterfaceType::Slave) | None => {}
        }
    }
    updated
}

/// Ordered work for one full reconciliation
#[derive(Debug, Default)]
pub struct Plan {
    pub down: Vec<String>,
    pub up: Vec<String>,
    pub updated: BTreeSet<String>,
}

impl Plan {
    pub fn new(current: &Snapshot, new: &Snapshot, diff: &ConfigDiff, sysfs: &Sysfs) -> Self {
        let down = down_list(current, diff);
        let missing = missing_list(new, diff, sysfs);
        let up = up_list(new, diff, &missing);

        Self {
            down: sort_by_type(current, &down, TypeOrder::DOWN),
            up: sort_by_type(new, &up, TypeOrder::UP),
            updated: updated_ifaces(new, &up),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.down.is_empty() && self.up.is_empty()
    }
}
