//! Idempotent interface configuration
//!
//! Used during upgrade bootstrap and re-enrollment, when interfaces must
//! not be torn down. Every step checks the kernel before changing it, so
//! running it again is harmless.

use super::Reconciler;
use crate::error::Result;
use crate::model::Snapshot;
use crate::network::netmask;
use crate::planner::{TypeOrder, sort_by_type, updated_ifaces};
use crate::routes::RouteEntry;
use crate::stanza::{self, Properties};
use log::{error, info};
use std::collections::BTreeSet;

/// `address/prefix` to configure on an interface, if any
pub fn iface_address(iface: &str, props: &Properties) -> Option<String> {
    let address = stanza::prop(props, "address")?;
    if address.contains('/') {
        return Some(address.to_string());
    }
    let Some(mask) = stanza::prop(props, "netmask") else {
        error!("Interface {} has address but no netmask", iface);
        return None;
    };
    match netmask::cidr(address, mask) {
        Ok(cidr) => Some(cidr),
        Err(e) => {
            error!("Failed to get {} interface prefix length: {}", iface, e);
            None
        }
    }
}

impl Reconciler<'_> {
    /// Configure every interface in place, without tearing anything down
    pub(super) fn update_online(&self, new: &Snapshot) -> Result<BTreeSet<String>> {
        let ordered = sort_by_type(new, new.auto(), TypeOrder::ONLINE);
        if ordered.is_empty() {
            return Ok(BTreeSet::new());
        }

        self.write_files(new)?;
        for iface in &ordered {
            info!("Configuring interface {}", iface);
            if let Some(props) = new.properties(iface) {
                self.ensure_configured(iface, props);
            }
        }
        Ok(updated_ifaces(new, &ordered))
    }

    /// Make sure an interface is up with its address and gateway
    pub fn ensure_configured(&self, iface: &str, props: &Properties) {
        if stanza::is_label(iface) {
            self.ensure_label_configured(iface, props);
        } else {
            self.ensure_link_configured(iface, props);
        }
    }

    fn ensure_label_configured(&self, iface: &str, props: &Properties) {
        let Some(address) = iface_address(iface, props) else {
            return;
        };
        let base = stanza::base_iface(iface);

        let existing = self.ip.addr_list(base).unwrap_or_default();
        if existing.contains(&address) {
            info!(
                "Link already has address '{}', no need to set label up",
                address
            );
        } else if !self.ip.ifup(iface) {
            self.ip.addr_add(base, &address);
        }

        if let Some(gateway) = stanza::prop(props, "gateway") {
            RouteEntry::default_via(base, gateway).push(&self.ip);
        }
    }

    fn ensure_link_configured(&self, iface: &str, props: &Properties) {
        if self.sysfs.is_missing_or_down(iface) {
            info!(
                "Interface '{}' is missing or down, flushing IPs and bringing up",
                iface
            );
            if self.sysfs.link_exists(iface) {
                self.ip.addr_flush(iface);
            }
            self.ip.ifup(iface);
        }

        let Some(address) = iface_address(iface, props) else {
            return;
        };
        let present = self
            .ip
            .addr_list(iface)
            .is_some_and(|existing| existing.contains(&address));
        if !present {
            self.ip.addr_add(iface, &address);
        }

        if let Some(gateway) = stanza::prop(props, "gateway") {
            RouteEntry::default_via(iface, gateway).push(&self.ip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::tests::{actions, add_link, host};
    use crate::stanza::StanzaParser;
    use crate::testing::FakeRunner;
    use std::fs;

    fn props(text: &str, iface: &str) -> Properties {
        let (_, mut ifaces) = StanzaParser::parse_str(text);
        ifaces.remove(iface).unwrap()
    }

    #[test]
    fn test_iface_address() {
        let v4 = props(
            "iface a inet static\n address 10.0.0.2\n netmask 255.255.255.0\n",
            "a",
        );
        assert_eq!(iface_address("a", &v4).as_deref(), Some("10.0.0.2/24"));

        let cidr = props("iface a inet static\n address 10.0.0.2/16\n", "a");
        assert_eq!(iface_address("a", &cidr).as_deref(), Some("10.0.0.2/16"));

        let v6 = props("iface a inet6 static\n address fd00::2\n netmask 64\n", "a");
        assert_eq!(iface_address("a", &v6).as_deref(), Some("fd00::2/64"));

        let no_mask = props("iface a inet static\n address 10.0.0.2\n", "a");
        assert_eq!(iface_address("a", &no_mask), None);

        let bad_mask = props(
            "iface a inet static\n address 10.0.0.2\n netmask 255.0.255.0\n",
            "a",
        );
        assert_eq!(iface_address("a", &bad_mask), None);

        let none = props("iface a inet dhcp\n", "a");
        assert_eq!(iface_address("a", &none), None);
    }

    #[test]
    fn test_upgrade_bootstrap_configures_in_place() {
        let (_dir, settings) = host();
        let paths = &settings.paths;
        fs::write(&paths.upgrade_marker, "").unwrap();
        fs::write(
            &paths.generated_interfaces,
            "auto enp0s3 enp0s8 enp0s3:1-1\n\
             iface enp0s3 inet manual\n\
             iface enp0s8 inet static\n  address 10.30.0.5\n  netmask 255.255.255.0\n\
             iface enp0s3:1-1 inet static\n  address 10.20.1.2\n  netmask 255.255.255.0\n  gateway 10.20.1.1\n",
        )
        .unwrap();
        add_link(paths, "enp0s3", "up");
        add_link(paths, "enp0s8", "down");

        let runner = FakeRunner::new();
        Reconciler::new(&settings, &runner).apply(false).unwrap();

        assert_eq!(
            actions(&runner),
            vec![
                "/usr/sbin/ip addr flush dev enp0s8",
                "/sbin/ifup -v enp0s8",
                "/usr/sbin/ip -br addr show dev enp0s8",
                "/usr/sbin/ip -br addr show dev enp0s8",
                "/usr/sbin/ip addr add 10.30.0.5/24 dev enp0s8",
                "/usr/sbin/ip -br addr show dev enp0s3",
                "/sbin/ifup -v enp0s3:1-1",
                "/usr/sbin/ip route show default via 10.20.1.1 dev enp0s3",
                "/usr/sbin/ip route show default",
                "/usr/sbin/ip route add default via 10.20.1.1 dev enp0s3",
            ]
        );
        assert!(paths.ifcfg("enp0s8").is_file());
        assert!(paths.auto_file().is_file());
        assert!(!paths.lock_file.exists());
    }

    #[test]
    fn test_label_with_address_present() {
        let (_dir, settings) = host();
        let runner = FakeRunner::new().respond(
            "/usr/sbin/ip -br addr show dev enp0s3",
            0,
            "enp0s3 UP 10.0.2.15/24 10.20.1.2/24",
        );
        let label = props(
            "iface enp0s3:1-1 inet static\n address 10.20.1.2\n netmask 255.255.255.0\n",
            "enp0s3:1-1",
        );

        Reconciler::new(&settings, &runner).ensure_configured("enp0s3:1-1", &label);
        assert_eq!(
            runner.commands(),
            vec!["/usr/sbin/ip -br addr show dev enp0s3"]
        );
    }

    #[test]
    fn test_label_falls_back_to_address_add() {
        let (_dir, settings) = host();
        let runner = FakeRunner::new().respond("/sbin/ifup", 1, "ifup: failed");
        let label = props(
            "iface enp0s3:1-1 inet static\n address 10.20.1.2\n netmask 255.255.255.0\n",
            "enp0s3:1-1",
        );

        Reconciler::new(&settings, &runner).ensure_configured("enp0s3:1-1", &label);
        assert_eq!(
            runner.commands(),
            vec![
                "/usr/sbin/ip -br addr show dev enp0s3",
                "/sbin/ifup -v enp0s3:1-1",
                "/usr/sbin/ip -br addr show dev enp0s3",
                "/usr/sbin/ip addr add 10.20.1.2/24 dev enp0s3",
            ]
        );
    }

    #[test]
    fn test_missing_link_not_flushed() {
        let (_dir, settings) = host();
        let runner = FakeRunner::new();
        let link = props("iface vlan100 inet manual\n vlan-raw-device enp0s3\n", "vlan100");

        Reconciler::new(&settings, &runner).ensure_configured("vlan100", &link);
        assert_eq!(runner.commands(), vec!["/sbin/ifup -v vlan100"]);
    }
}
