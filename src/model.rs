//! Configuration model
//!
//! Classifies parsed interfaces and records which interfaces have to be
//! reconfigured whenever another one changes.

use crate::stanza::{self, Interfaces, Properties, StanzaParser};
use log::{debug, error, warn};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

static VLAN_NNN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^vlan([0-9]+)$").expect("valid regex"));
static VLAN_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)\.([0-9]+)$").expect("valid regex"));
static VLAN_PRE_UP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ip\s+link\s+add\s+link\s+(\S+)\s+name\s+\S+\s+type\s+vlan\s+id\s+(\d+)")
        .expect("valid regex")
});

/// Kind of interface, decided from its name and properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InterfaceType {
    Eth,
    Vlan,
    Bonding,
    Slave,
    Label,
    Lo,
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterfaceType::Eth => "eth",
            InterfaceType::Vlan => "vlan",
            InterfaceType::Bonding => "bonding",
            InterfaceType::Slave => "slave",
            InterfaceType::Label => "label",
            InterfaceType::Lo => "lo",
        };
        write!(f, "{}", s)
    }
}

/// Raw device and VLAN id of a VLAN interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanAttributes {
    pub raw_device: String,
    pub id: u64,
}

/// Numeric VLAN id; the patterns only capture digits, so failure is overflow
fn vlan_id(iface: &str, digits: &str) -> Option<u64> {
    match digits.parse() {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("VLAN id '{}' of interface {} is not usable: {}", digits, iface, e);
            None
        }
    }
}

/// VLAN attributes if the interface is a VLAN
///
/// `vlanNNN` names only count as VLANs when `vlan-raw-device` is set.
pub fn vlan_attributes(iface: &str, props: &Properties) -> Option<VlanAttributes> {
    if let Some(caps) = VLAN_NNN.captures(iface) {
        let Some(raw_device) = stanza::prop(props, "vlan-raw-device") else {
            warn!(
                "vlan-raw-device property is empty or not specified for interface {}, \
                 so it will not be considered as a valid VLAN",
                iface
            );
            return None;
        };
        let id = vlan_id(iface, &caps[1])?;
        return Some(VlanAttributes {
            raw_device: raw_device.to_string(),
            id,
        });
    }

    if let Some(caps) = VLAN_DOT.captures(iface) {
        let id = vlan_id(iface, &caps[2])?;
        return Some(VlanAttributes {
            raw_device: caps[1].to_string(),
            id,
        });
    }

    let pre_up = stanza::prop(props, "pre-up")?;
    let caps = VLAN_PRE_UP.captures(pre_up)?;
    Some(VlanAttributes {
        raw_device: caps[1].to_string(),
        id: vlan_id(iface, &caps[2])?,
    })
}

/// Classify one interface; also returns the interfaces it depends on
fn classify(iface: &str, props: &Properties) -> (InterfaceType, Vec<String>) {
    if stanza::is_label(iface) {
        return (
            InterfaceType::Label,
            vec![stanza::base_iface(iface).to_string()],
        );
    }
    if iface == "lo" {
        return (InterfaceType::Lo, Vec::new());
    }
    if let Some(vlan) = vlan_attributes(iface, props) {
        debug!("{} is VLAN {} on {}", iface, vlan.id, vlan.raw_device);
        return (InterfaceType::Vlan, vec![vlan.raw_device]);
    }
    if let Some(slaves) = stanza::prop(props, "bond-slaves") {
        let slaves = slaves.split_whitespace().map(String::from).collect();
        return (InterfaceType::Bonding, slaves);
    }
    if stanza::prop(props, "bond-master").is_some() {
        return (InterfaceType::Slave, Vec::new());
    }
    (InterfaceType::Eth, Vec::new())
}

/// Prerequisite -> dependent edges between interfaces
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.nodes.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), idx);
        idx
    }

    /// Record that `dependent` must be reconfigured when `prerequisite` changes
    pub fn add_dependent(&mut self, prerequisite: &str, dependent: &str) {
        let from = self.node(prerequisite);
        let to = self.node(dependent);
        self.graph.update_edge(from, to, ());
    }

    /// Direct dependents of an interface
    pub fn dependents(&self, iface: &str) -> BTreeSet<&str> {
        self.nodes
            .get(iface)
            .map(|idx| {
                self.graph
                    .neighbors_directed(*idx, Direction::Outgoing)
                    .map(|n| self.graph[n].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Where a snapshot was read from, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Generated,
    Applied,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Generated => write!(f, "generated configuration"),
            Origin::Applied => write!(f, "applied configuration"),
        }
    }
}

/// One complete interface configuration, immutable once built
#[derive(Debug, Default)]
pub struct Snapshot {
    auto: BTreeSet<String>,
    ifaces: Interfaces,
    types: BTreeMap<String, InterfaceType>,
    dependencies: DependencyGraph,
}

impl Snapshot {
    /// Build a snapshot from parser output
    ///
    /// Auto-listed interfaces without a definition are reported and dropped.
    pub fn build(auto: Vec<String>, ifaces: Interfaces, origin: Origin) -> Self {
        let (valid, invalid): (Vec<String>, Vec<String>) =
            auto.into_iter().partition(|name| ifaces.contains_key(name));
        if !invalid.is_empty() {
            error!(
                "Auto list from {} has interfaces that have no or invalid config: {}",
                origin,
                invalid.join(", ")
            );
        }

        let mut types = BTreeMap::new();
        let mut dependencies = DependencyGraph::new();
        for (name, props) in &ifaces {
            let (iftype, prerequisites) = classify(name, props);
            match iftype {
                InterfaceType::Slave => {
                    if let Some(master) = stanza::prop(props, "bond-master") {
                        dependencies.add_dependent(name, master);
                    }
                }
                InterfaceType::Bonding => {
                    for slave in &prerequisites {
                        dependencies.add_dependent(slave, name);
                    }
                }
                _ => {
                    for prerequisite in &prerequisites {
                        dependencies.add_dependent(prerequisite, name);
                    }
                }
            }
            types.insert(name.clone(), iftype);
        }

        Self {
            auto: valid.into_iter().collect(),
            ifaces,
            types,
            dependencies,
        }
    }

    /// Parse stanza text and build a snapshot from it
    pub fn from_stanzas(content: &str, origin: Origin) -> Self {
        let (auto, ifaces) = StanzaParser::parse_str(content);
        Self::build(auto, ifaces, origin)
    }

    pub fn auto(&self) -> &BTreeSet<String> {
        &self.auto
    }

    pub fn ifaces(&self) -> &Interfaces {
        &self.ifaces
    }

    pub fn properties(&self, iface: &str) -> Option<&Properties> {
        self.ifaces.get(iface)
    }

    pub fn iface_type(&self, iface: &str) -> Option<InterfaceType> {
        self.types.get(iface).copied()
    }

    /// Whether there is nothing beyond loopback to configure
    pub fn is_trivial(&self) -> bool {
        self.auto.iter().all(|name| name == "lo")
    }

    /// Interfaces reachable from `seeds` through active interfaces only
    ///
    /// An interface outside the auto set neither joins the result nor
    /// propagates to its dependents.
    pub fn dependent_closure<'a, I>(&self, seeds: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut covered: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&str> = seeds.into_iter().map(String::as_str).collect();

        while let Some(iface) = pending.pop() {
            if covered.contains(iface) || !self.auto.contains(iface) {
                continue;
            }
            covered.insert(iface);
            pending.extend(self.dependencies.dependents(iface));
        }

        covered.into_iter().map(String::from).collect()
    }
}
