//! Re-enrollment of a management interface
//!
//! While a re-enrollment is running, the interface stanza supplied through
//! cloud-init is applied in place so that the host stays reachable before
//! the regular configuration takes over.

use super::Reconciler;
use crate::stanza::{self, Interfaces, StanzaParser};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::net::IpAddr;

/// Address family of a gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IpFamily {
    V4,
    V6,
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "ipv4"),
            IpFamily::V6 => write!(f, "ipv6"),
        }
    }
}

/// Interfaces carrying a valid gateway, grouped by family in name order
pub fn gateway_candidates(ifaces: &Interfaces) -> BTreeMap<IpFamily, Vec<&str>> {
    let mut candidates: BTreeMap<IpFamily, Vec<&str>> = BTreeMap::new();
    for (iface, props) in ifaces {
        let Some(gateway) = stanza::prop(props, "gateway") else {
            continue;
        };
        let family = match gateway.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => IpFamily::V4,
            Ok(IpAddr::V6(_)) => IpFamily::V6,
            Err(_) => {
                warn!(
                    "Enrollment: Invalid gateway address '{}' for interface '{}'",
                    gateway, iface
                );
                continue;
            }
        };
        candidates.entry(family).or_default().push(iface);
    }
    candidates
}

impl Reconciler<'_> {
    /// Apply the cloud-init interface stanza while re-enrollment is running
    pub(super) fn check_enrollment(&self) {
        let paths = &self.settings.paths;
        if !paths.enrollment_marker.is_file() || !paths.cloud_init_file.is_file() {
            return;
        }

        info!(
            "Enrollment: Parsing file '{}'",
            paths.cloud_init_file.display()
        );
        let content = match fs::read_to_string(&paths.cloud_init_file) {
            Ok(content) => content,
            Err(e) => {
                error!(
                    "Enrollment: Failed to read '{}': {}",
                    paths.cloud_init_file.display(),
                    e
                );
                return;
            }
        };

        let (_, mut ifaces) = StanzaParser::parse_str(&content);
        ifaces.remove("lo");
        if ifaces.is_empty() {
            warn!(
                "Enrollment: Could not find any valid interface config in '{}'",
                paths.cloud_init_file.display()
            );
            return;
        }

        let candidates = gateway_candidates(&ifaces);
        if candidates.is_empty() {
            warn!("Enrollment: No interface with gateway address found, skipping");
            return;
        }

        for (family, names) in &candidates {
            let Some(iface) = names.first() else {
                continue;
            };
            if names.len() > 1 {
                warn!(
                    "Enrollment: Multiple interfaces with gateway for {} found: {}, using {}",
                    family,
                    names.join(", "),
                    iface
                );
            }
            let Some(props) = ifaces.get(*iface) else {
                continue;
            };
            info!(
                "Enrollment: Configuring interface {} with gateway {}",
                iface,
                stanza::prop(props, "gateway").unwrap_or_default()
            );
            self.ensure_configured(iface, props);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::tests::{actions, add_link, host};
    use crate::testing::FakeRunner;

    const CLOUD_INIT: &str = "auto lo enp0s3 enp0s8\n\
        iface lo inet loopback\n\
        iface enp0s8 inet static\n  address 10.10.20.5/24\n  gateway 10.10.20.1\n\
        iface enp0s3 inet static\n  address 10.10.10.5\n  netmask 255.255.255.0\n  gateway 10.10.10.1\n\
        iface enp0s9 inet6 static\n  address fd00::5\n  netmask 64\n  gateway bogus\n\
        iface enp0s10 inet6 static\n  address fd01::5\n  netmask 64\n  gateway fd01::1\n";

    #[test]
    fn test_gateway_candidates() {
        let (_, ifaces) = StanzaParser::parse_str(CLOUD_INIT);
        let candidates = gateway_candidates(&ifaces);

        assert_eq!(candidates[&IpFamily::V4], vec!["enp0s3", "enp0s8"]);
        assert_eq!(candidates[&IpFamily::V6], vec!["enp0s10"]);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_no_gateway_candidates() {
        let (_, ifaces) = StanzaParser::parse_str("iface enp0s3 inet dhcp\n");
        assert!(gateway_candidates(&ifaces).is_empty());
    }

    #[test]
    fn test_enrollment_configures_first_candidate_per_family() {
        let (_dir, settings) = host();
        let paths = &settings.paths;
        fs::write(&paths.generated_interfaces, "auto lo\niface lo inet loopback\n").unwrap();
        fs::write(&paths.enrollment_marker, "").unwrap();
        fs::write(&paths.cloud_init_file, CLOUD_INIT).unwrap();
        add_link(paths, "enp0s3", "up");
        add_link(paths, "enp0s10", "up");

        let runner = FakeRunner::new();
        Reconciler::new(&settings, &runner).apply(false).unwrap();

        assert_eq!(
            actions(&runner),
            vec![
                "/usr/sbin/ip -br addr show dev enp0s3",
                "/usr/sbin/ip -br addr show dev enp0s3",
                "/usr/sbin/ip addr add 10.10.10.5/24 dev enp0s3",
                "/usr/sbin/ip route show default via 10.10.10.1 dev enp0s3",
                "/usr/sbin/ip route show default",
                "/usr/sbin/ip route add default via 10.10.10.1 dev enp0s3",
                "/usr/sbin/ip -br addr show dev enp0s10",
                "/usr/sbin/ip -br addr show dev enp0s10",
                "/usr/sbin/ip addr add fd01::5/64 dev enp0s10",
                "/usr/sbin/ip -6 route show default via fd01::1 dev enp0s10",
                "/usr/sbin/ip -6 route show default",
                "/usr/sbin/ip route add default via fd01::1 dev enp0s10",
            ]
        );
    }

    #[test]
    fn test_enrollment_needs_marker() {
        let (_dir, settings) = host();
        let paths = &settings.paths;
        fs::write(&paths.generated_interfaces, "auto lo\niface lo inet loopback\n").unwrap();
        fs::write(&paths.cloud_init_file, CLOUD_INIT).unwrap();

        let runner = FakeRunner::new();
        Reconciler::new(&settings, &runner).apply(false).unwrap();
        assert!(actions(&runner).is_empty());
    }
}
