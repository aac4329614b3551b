//! iproute2 and ifupdown invocations
//!
//! Failures are logged with the command output and reported as `false`
//! (or `None`); a single interface never aborts the run.

use crate::config::Commands;
use crate::exec::{CommandOutput, CommandRunner, SPAWN_FAILED, format_output};
use log::{error, info};

/// Thin wrapper issuing `ip`, `ifup` and `ifdown` through a runner
pub struct IpRoute<'a> {
    runner: &'a dyn CommandRunner,
    commands: &'a Commands,
}

impl<'a> IpRoute<'a> {
    pub fn new(runner: &'a dyn CommandRunner, commands: &'a Commands) -> Self {
        Self { runner, commands }
    }

    /// Run a command; spawn failures come back as a failed output
    fn run(&self, argv: &[&str]) -> CommandOutput {
        self.runner.run(argv).unwrap_or_else(|e| {
            error!("{}", e);
            CommandOutput::new(SPAWN_FAILED, e.to_string())
        })
    }

    fn ip(&self, args: &[&str]) -> CommandOutput {
        let mut argv = vec![self.commands.ip.as_str()];
        argv.extend_from_slice(args);
        self.run(&argv)
    }

    fn ip_checked(&self, args: &[&str], what: &str, iface: &str) -> bool {
        let out = self.ip(args);
        if !out.success() {
            error!(
                "Command '{}' failed for interface {}:{}",
                what,
                iface,
                format_output(&out.output)
            );
        }
        out.success()
    }

    /// `ifup -v <iface>`
    pub fn ifup(&self, iface: &str) -> bool {
        info!("Bringing {} up", iface);
        let out = self.run(&[self.commands.ifup.as_str(), "-v", iface]);
        if !out.success() {
            error!(
                "Command 'ifup' failed for interface {}:{}",
                iface,
                format_output(&out.output)
            );
        }
        out.success()
    }

    /// `ifdown -v <iface>`
    pub fn ifdown(&self, iface: &str) -> bool {
        let out = self.run(&[self.commands.ifdown.as_str(), "-v", iface]);
        if !out.success() {
            error!(
                "Command 'ifdown' failed for interface {}:{}",
                iface,
                format_output(&out.output)
            );
        }
        out.success()
    }

    pub fn link_set_down(&self, iface: &str) -> bool {
        self.ip_checked(&["link", "set", "down", "dev", iface], "ip link set down", iface)
    }

    pub fn addr_flush(&self, iface: &str) -> bool {
        self.ip_checked(&["addr", "flush", "dev", iface], "ip addr flush", iface)
    }

    /// Addresses on a link in `address/prefix` form
    pub fn addr_list(&self, iface: &str) -> Option<Vec<String>> {
        let out = self.ip(&["-br", "addr", "show", "dev", iface]);
        if !out.success() {
            error!(
                "Failed to get IP address list from {}:{}",
                iface,
                format_output(&out.output)
            );
            return None;
        }
        Some(
            out.output
                .split_whitespace()
                .skip(2)
                .map(String::from)
                .collect(),
        )
    }

    /// Add an address unless the link already has it
    pub fn addr_add(&self, iface: &str, address: &str) -> bool {
        info!("Adding IP {} to interface {}", address, iface);
        let Some(existing) = self.addr_list(iface) else {
            return false;
        };
        if existing.iter().any(|a| a == address) {
            info!("Interface {} already has address {}, skipping", iface, address);
            return true;
        }
        let out = self.ip(&["addr", "add", address, "dev", iface]);
        if !out.success() {
            error!(
                "Failed to add IP address to interface {}:{}",
                iface,
                format_output(&out.output)
            );
        }
        out.success()
    }

    /// `ip [-6] route show <selector...>`
    pub fn route_show(&self, ipv6: bool, selector: &str) -> CommandOutput {
        let mut args = Vec::new();
        if ipv6 {
            args.push("-6");
        }
        args.extend(["route", "show"]);
        args.extend(selector.split_whitespace());
        self.ip(&args)
    }

    fn route_change(&self, verb: &str, description: &str) -> bool {
        let mut args = vec!["route", verb];
        args.extend(description.split_whitespace());
        let out = self.ip(&args);
        if !out.success() {
            let action = match verb {
                "add" => "adding",
                "del" => "removing",
                _ => "replacing",
            };
            error!(
                "Failed {} route {}:{}",
                action,
                description,
                format_output(&out.output)
            );
        }
        out.success()
    }

    pub fn route_add(&self, description: &str) -> bool {
        self.route_change("add", description)
    }

    pub fn route_replace(&self, description: &str) -> bool {
        self.route_change("replace", description)
    }

    pub fn route_del(&self, description: &str) -> bool {
        self.route_change("del", description)
    }

    /// Links, addresses and both route tables, for the log
    pub fn network_info(&self) -> String {
        let links = self.ip(&["addr", "show"]).output;
        let routes_v4 = self.ip(&["route", "show"]).output;
        let routes_v6 = self.ip(&["-6", "route", "show"]).output;
        format!(
            "Network info:\n************ Links/addresses ************\n{}\
             ************ IPv4 routes ****************\n{}\
             ************ IPv6 routes ****************\n{}\
             *****************************************",
            links, routes_v4, routes_v6
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;

    #[test]
    fn test_addr_list() {
        let runner = FakeRunner::new().respond(
            "/usr/sbin/ip -br addr show dev enp0s3",
            0,
            "enp0s3           UP             10.0.2.15/24 fe80::a00:27ff:fe6b:1e1f/64 \n",
        );
        let commands = Commands::default();
        let ip = IpRoute::new(&runner, &commands);

        assert_eq!(
            ip.addr_list("enp0s3"),
            Some(vec![
                "10.0.2.15/24".to_string(),
                "fe80::a00:27ff:fe6b:1e1f/64".to_string()
            ])
        );
    }

    #[test]
    fn test_addr_list_failure() {
        let runner = FakeRunner::new().respond(
            "/usr/sbin/ip -br addr show dev bogus",
            1,
            "Device \"bogus\" does not exist.",
        );
        let commands = Commands::default();
        assert_eq!(IpRoute::new(&runner, &commands).addr_list("bogus"), None);
    }

    #[test]
    fn test_addr_add_skips_existing() {
        let runner = FakeRunner::new().respond(
            "/usr/sbin/ip -br addr show dev enp0s3",
            0,
            "enp0s3 UP 10.0.2.15/24",
        );
        let commands = Commands::default();
        let ip = IpRoute::new(&runner, &commands);

        assert!(ip.addr_add("enp0s3", "10.0.2.15/24"));
        assert!(ip.addr_add("enp0s3", "10.0.3.15/24"));
        assert_eq!(
            runner.commands(),
            vec![
                "/usr/sbin/ip -br addr show dev enp0s3",
                "/usr/sbin/ip -br addr show dev enp0s3",
                "/usr/sbin/ip addr add 10.0.3.15/24 dev enp0s3",
            ]
        );
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let runner = FakeRunner::new().fail_spawn("/sbin/ifup");
        let commands = Commands::default();
        assert!(!IpRoute::new(&runner, &commands).ifup("enp0s3"));
    }

    #[test]
    fn test_route_commands() {
        let runner = FakeRunner::new();
        let commands = Commands::default();
        let ip = IpRoute::new(&runner, &commands);

        ip.route_show(true, "fd00::/64 via fd01::1 dev enp0s8");
        ip.route_del("10.10.0.0/16 via 192.168.1.1 dev enp0s3 metric 1");
        assert_eq!(
            runner.commands(),
            vec![
                "/usr/sbin/ip -6 route show fd00::/64 via fd01::1 dev enp0s8",
                "/usr/sbin/ip route del 10.10.0.0/16 via 192.168.1.1 dev enp0s3 metric 1",
            ]
        );
    }
}
