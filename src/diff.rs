//! Snapshot comparison
//!
//! Only recognized properties take part in change detection; anything
//! else in a stanza is carried to disk but never triggers a reconfiguration.

use crate::model::Snapshot;
use crate::stanza::{Properties, is_recognized, sort_properties};
use log::info;
use std::collections::BTreeSet;

/// Interfaces that differ between the current and new snapshots
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub modified: BTreeSet<String>,
}

impl ConfigDiff {
    /// Compare the current snapshot against the new one
    pub fn between(current: &Snapshot, new: &Snapshot) -> Self {
        let added: BTreeSet<String> = new.auto().difference(current.auto()).cloned().collect();
        let removed: BTreeSet<String> =
            current.auto().difference(new.auto()).cloned().collect();

        let mut modified = BTreeSet::new();
        for (name, new_props) in new.ifaces() {
            let Some(current_props) = current.properties(name) else {
                continue;
            };
            if current_props.is_empty() {
                continue;
            }
            if properties_differ(name, current_props, new_props) {
                modified.insert(name.clone());
            }
        }

        log_set("Added interfaces", &added);
        log_set("Removed interfaces", &removed);
        log_set("Modified interfaces", &modified);

        Self {
            added,
            removed,
            modified,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

fn log_set(label: &str, set: &BTreeSet<String>) {
    if !set.is_empty() {
        let names: Vec<&str> = set.iter().map(String::as_str).collect();
        info!("{}: {}", label, names.join(", "));
    }
}

fn recognized(props: &Properties) -> BTreeSet<&str> {
    props
        .keys()
        .map(String::as_str)
        .filter(|name| is_recognized(name))
        .collect()
}

fn render_value(value: Option<&Option<String>>) -> &str {
    value.and_then(|v| v.as_deref()).unwrap_or("")
}

/// Compare recognized properties, logging every difference
fn properties_differ(iface: &str, current: &Properties, new: &Properties) -> bool {
    let current_names = recognized(current);
    let new_names = recognized(new);

    let removed = sort_properties(current_names.difference(&new_names).copied());
    let added = sort_properties(new_names.difference(&current_names).copied());
    let changed = sort_properties(
        current_names
            .intersection(&new_names)
            .copied()
            .filter(|name| current.get(*name) != new.get(*name)),
    );

    for name in &removed {
        info!(
            "Interface {}: property '{}' removed (was '{}')",
            iface,
            name,
            render_value(current.get(*name))
        );
    }
    for name in &added {
        info!(
            "Interface {}: property '{}' added with '{}'",
            iface,
            name,
            render_value(new.get(*name))
        );
    }
    for name in &changed {
        info!(
            "Interface {}: property '{}' changed from '{}' to '{}'",
            iface,
            name,
            render_value(current.get(*name)),
            render_value(new.get(*name))
        );
    }

    !(removed.is_empty() && added.is_empty() && changed.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Origin;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_added_removed_modified() {
        let current = Snapshot::from_stanzas(
            "auto lo enp0s3 enp0s8\n\
             iface lo inet loopback\n\
             iface enp0s3 inet static\n  address 10.0.0.2\n  netmask 255.255.255.0\n\
             iface enp0s8 inet manual\n  mtu 1500\n",
            Origin::Applied,
        );
        let new = Snapshot::from_stanzas(
            "auto lo enp0s3 enp0s9\n\
             iface lo inet loopback\n\
             iface enp0s3 inet static\n  address 10.0.0.3\n  netmask 255.255.255.0\n\
             iface enp0s9 inet manual\n",
            Origin::Generated,
        );

        let diff = ConfigDiff::between(&current, &new);
        assert_eq!(diff.added, set(&["enp0s9"]));
        assert_eq!(diff.removed, set(&["enp0s8"]));
        assert_eq!(diff.modified, set(&["enp0s3"]));
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_unrecognized_properties_ignored() {
        let current = Snapshot::from_stanzas(
            "auto enp0s3\niface enp0s3 inet manual\n  stx-description ifname:a\n",
            Origin::Applied,
        );
        let new = Snapshot::from_stanzas(
            "auto enp0s3\niface enp0s3 inet manual\n  stx-description ifname:b\n  bond-use-carrier\n",
            Origin::Generated,
        );
        assert!(ConfigDiff::between(&current, &new).is_empty());
    }

    #[test]
    fn test_value_presence_counts_as_change() {
        let current = Snapshot::from_stanzas(
            "auto enp0s3\niface enp0s3 inet manual\n  up\n",
            Origin::Applied,
        );
        let new = Snapshot::from_stanzas(
            "auto enp0s3\niface enp0s3 inet manual\n  up echo hi\n",
            Origin::Generated,
        );
        assert_eq!(ConfigDiff::between(&current, &new).modified, set(&["enp0s3"]));
    }

    #[test]
    fn test_iface_line_change_is_modification() {
        let current =
            Snapshot::from_stanzas("auto enp0s3\niface enp0s3 inet manual\n", Origin::Applied);
        let new = Snapshot::from_stanzas("auto enp0s3\niface enp0s3 inet dhcp\n", Origin::Generated);
        assert_eq!(ConfigDiff::between(&current, &new).modified, set(&["enp0s3"]));
    }

    #[test]
    fn test_empty_current_properties_are_absent() {
        let mut ifaces = crate::stanza::Interfaces::new();
        ifaces.insert("enp0s3".to_string(), Properties::new());
        let current = Snapshot::build(vec!["enp0s3".to_string()], ifaces, Origin::Applied);
        let new = Snapshot::from_stanzas(
            "auto enp0s3\niface enp0s3 inet static\n  address 10.0.0.2\n",
            Origin::Generated,
        );
        let diff = ConfigDiff::between(&current, &new);
        assert!(diff.modified.is_empty());
        assert!(diff.added.is_empty());
    }
}
