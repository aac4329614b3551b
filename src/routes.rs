//! Static route reconciliation
//!
//! Route files hold one route per line:
//! `network netmask nexthop interface [metric <value>]`, with `default` as
//! the network of a default route.

use crate::config::Paths;
use crate::error::{Error, Result};
use crate::network::IpRoute;
use crate::network::netmask;
use crate::stanza;
use log::{error, info, warn};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

/// One static route, as written in a route file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteEntry {
    line: String,
    pub network: String,
    pub netmask: String,
    pub nexthop: String,
    pub iface: String,
    pub metric: Option<String>,
}

impl RouteEntry {
    /// Parse a whitespace-separated route line
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return None;
        }
        Some(Self {
            line: fields.join(" "),
            network: fields[0].to_string(),
            netmask: fields[1].to_string(),
            nexthop: fields[2].to_string(),
            iface: fields[3].to_string(),
            metric: fields.get(5).map(|m| m.to_string()),
        })
    }

    /// Default route through a gateway
    pub fn default_via(iface: &str, gateway: &str) -> Self {
        Self {
            line: format!("default - {} {}", gateway, iface),
            network: "default".to_string(),
            netmask: String::new(),
            nexthop: gateway.to_string(),
            iface: iface.to_string(),
            metric: None,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.nexthop.contains(':')
    }

    /// Destination in `ip route` notation
    pub fn destination(&self) -> Result<String> {
        if self.network == "default" {
            return Ok(self.network.clone());
        }
        let prefix = netmask::prefix_len(&self.netmask)?;
        Ok(format!("{}/{}", self.network, prefix))
    }

    fn with_metric(&self, mut text: String) -> String {
        if let Some(metric) = &self.metric {
            text.push_str(" metric ");
            text.push_str(metric);
        }
        text
    }

    /// `<dest> via <nexthop> dev <iface> [metric <m>]`
    pub fn description(&self) -> Result<String> {
        let text = format!(
            "{} via {} dev {}",
            self.destination()?,
            self.nexthop,
            self.iface
        );
        Ok(self.with_metric(text))
    }

    /// `<dest> [metric <m>]`, matching any route to the same destination
    pub fn selector(&self) -> Result<String> {
        Ok(self.with_metric(self.destination()?))
    }

    /// Install the route, replacing a route to the same destination
    pub fn push(&self, ip: &IpRoute<'_>) {
        if let Err(e) = self.try_push(ip) {
            error!("Failed to add route entry '{}' to the kernel: {}", self, e);
        }
    }

    fn try_push(&self, ip: &IpRoute<'_>) -> Result<()> {
        let description = self.description()?;
        info!("Adding route: {}", description);

        let exact = ip.route_show(self.is_ipv6(), &description);
        if exact.success() && exact.output.contains(&self.network) {
            info!("Route already exists, skipping");
            return Ok(());
        }

        let same_destination = ip.route_show(self.is_ipv6(), &self.selector()?);
        if same_destination.success() && same_destination.output.contains(&self.network) {
            info!(
                "Route to specified network already exists, replacing: {}",
                same_destination.output.trim()
            );
            ip.route_replace(&description);
        } else {
            ip.route_add(&description);
        }
        Ok(())
    }

    /// Delete the route from the kernel
    pub fn remove(&self, ip: &IpRoute<'_>) {
        match self.description() {
            Ok(description) => {
                info!("Removing route: {}", description);
                ip.route_del(&description);
            }
            Err(e) => error!("Failed to remove route entry '{}' from the kernel: {}", self, e),
        }
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line)
    }
}

/// Parse route lines, skipping blanks and comments
pub fn parse_entries(content: &str, source: &Path) -> Vec<RouteEntry> {
    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match RouteEntry::parse(line) {
            Some(entry) => entries.push(entry),
            None => warn!(
                "Invalid route in file '{}', must have at least 4 parameters, {} found: '{}'",
                source.display(),
                line.split_whitespace().count(),
                line
            ),
        }
    }
    entries
}

/// Entries of every existing file, in file order
pub fn read_entries(files: &[&Path]) -> Vec<RouteEntry> {
    let mut entries = Vec::new();
    for file in files {
        if let Ok(content) = fs::read_to_string(file) {
            entries.extend(parse_entries(&content, file));
        }
    }
    entries
}

fn write_entries(path: &Path, entries: &[RouteEntry]) -> Result<()> {
    let mut lines = vec![stanza::header()];
    lines.extend(entries.iter().map(|e| e.to_string()));
    fs::write(path, lines.join("\n") + "\n").map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Bring kernel routes in line with the generated route files
///
/// Routes on `updated` interfaces are pushed again even when unchanged,
/// since bringing an interface down drops its routes.
pub fn update_routes(paths: &Paths, ip: &IpRoute<'_>, updated: &BTreeSet<String>) -> Result<()> {
    let desired = read_entries(&[
        paths.generated_routes.as_path(),
        paths.generated_routes6.as_path(),
    ]);
    let applied = read_entries(&[paths.applied_routes.as_path()]);

    let desired_set: HashSet<&RouteEntry> = desired.iter().collect();
    let applied_set: HashSet<&RouteEntry> = applied.iter().collect();

    write_entries(&paths.applied_routes, &desired)?;

    if desired_set != applied_set {
        info!(
            "Differences found between {} and {}",
            paths.generated_routes.display(),
            paths.applied_routes.display()
        );
        for entry in applied.iter().filter(|e| !desired_set.contains(e)) {
            entry.remove(ip);
        }
    } else {
        info!(
            "No differences found between {} and {}",
            paths.generated_routes.display(),
            paths.applied_routes.display()
        );
        if updated.is_empty() {
            return Ok(());
        }
    }

    for entry in &desired {
        if !applied_set.contains(entry) {
            info!(
                "Route not previously present in {}, adding",
                paths.applied_routes.display()
            );
        } else if updated.contains(&entry.iface) {
            info!("Route is associated with an updated interface, adding");
        } else {
            continue;
        }
        entry.push(ip);
    }
    Ok(())
}
