//! ifupdown stanza files
//!
//! Provides:
//! - Line-oriented parsing into an auto list and per-interface property sets
//! - Fixed-order serialization of property sets
//! - Generation headers for the files netapply writes

pub mod parser;
pub mod writer;

use std::collections::BTreeMap;

pub use parser::StanzaParser;
pub use writer::{header, is_recognized, render_auto, render_iface, sort_properties};

/// Properties of one interface stanza; a property may carry no value
pub type Properties = BTreeMap<String, Option<String>>;

/// Interface name to property set
pub type Interfaces = BTreeMap<String, Properties>;

/// Non-empty value of a property
pub fn prop<'a>(props: &'a Properties, name: &str) -> Option<&'a str> {
    props
        .get(name)
        .and_then(|v| v.as_deref())
        .filter(|v| !v.is_empty())
}

/// Whether the interface is an address label (`base:suffix`)
pub fn is_label(iface: &str) -> bool {
    iface.contains(':')
}

/// Interface a label rides on; the name itself for non-labels
pub fn base_iface(iface: &str) -> &str {
    iface.split(':').next().unwrap_or(iface)
}
