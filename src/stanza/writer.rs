//! Stanza serialization
//!
//! ifupdown reads some properties positionally, so property lines are
//! always written in a fixed order.

use crate::stanza::Properties;
use crate::stanza::parser::ALLOW_KEY;
use chrono::Local;

/// Recognized properties in write order; `allow-` always goes last
pub const PROPERTY_ORDER: &[&str] = &[
    "iface",
    "vlan-raw-device",
    "address",
    "netmask",
    "gateway",
    "bond-master",
    "bond-miimon",
    "bond-mode",
    "bond-primary",
    "bond-slaves",
    "hwaddress",
    "mtu",
    "pre-up",
    "up",
    "post-up",
    "pre-down",
    "down",
    "post-down",
];

/// Position for properties outside the recognized list
const UNRECOGNIZED_POS: usize = PROPERTY_ORDER.len();

fn position(prop: &str) -> usize {
    if prop == ALLOW_KEY {
        return UNRECOGNIZED_POS + 1;
    }
    PROPERTY_ORDER
        .iter()
        .position(|p| *p == prop)
        .unwrap_or(UNRECOGNIZED_POS)
}

/// Whether a property takes part in change detection
pub fn is_recognized(prop: &str) -> bool {
    prop == ALLOW_KEY || PROPERTY_ORDER.contains(&prop)
}

/// Sort property names into write order, unrecognized ones alphabetically
pub fn sort_properties<'a, I>(props: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sorted: Vec<&str> = props.into_iter().collect();
    sorted.sort_by(|a, b| position(a).cmp(&position(b)).then_with(|| a.cmp(b)));
    sorted
}

/// Generation header stamped on every written file
pub fn header() -> String {
    Local::now()
        .format("# HEADER: Last generated at: %Y-%m-%d %H:%M:%S %z")
        .to_string()
}

/// Contents of a per-interface file
pub fn render_iface(props: &Properties) -> String {
    let mut lines = vec![header()];
    for name in sort_properties(props.keys().map(String::as_str)) {
        let line = match props.get(name).and_then(|v| v.as_deref()) {
            Some(value) if name == ALLOW_KEY => value.to_string(),
            Some(value) => format!("{} {}", name, value),
            None => name.to_string(),
        };
        lines.push(line);
    }
    lines.join("\n") + "\n"
}

/// Contents of the auto file
pub fn render_auto<'a, I>(auto: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let names: Vec<&str> = auto.into_iter().map(String::as_str).collect();
    format!("{}\nauto {}\n", header(), names.join(" "))
}
