//! Reconciliation of applied interface configuration with the generated one
//!
//! Handles:
//! - Loading the generated and applied snapshots
//! - Tearing down and bringing up interfaces in dependency order
//! - Rewriting the applied per-interface files and the auto file
//! - Cleaning up the install-time pxeboot configuration
//! - Handing over to route reconciliation and re-enrollment

pub mod enrollment;
pub mod online;

use crate::config::Settings;
use crate::diff::ConfigDiff;
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::lock;
use crate::model::{InterfaceType, Origin, Snapshot};
use crate::network::{IpRoute, Sysfs};
use crate::planner::Plan;
use crate::routes;
use crate::stanza::{self, Interfaces, Properties, StanzaParser};
use log::{error, info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Name of the per-interface file left behind by the installer
const PXEBOOT: &str = "pxeboot";

/// Drives one reconciliation run
pub struct Reconciler<'a> {
    /// Loaded settings
    settings: &'a Settings,

    /// Command wrappers
    ip: IpRoute<'a>,

    /// Host state probes
    sysfs: Sysfs,
}

impl<'a> Reconciler<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn CommandRunner) -> Self {
        Self {
            settings,
            ip: IpRoute::new(runner, &settings.commands),
            sysfs: Sysfs::new(&settings.paths),
        }
    }

    /// Run reconciliation, or only the route part when `routes_only`
    pub fn apply(&self, routes_only: bool) -> Result<()> {
        let paths = &self.settings.paths;

        if routes_only {
            info!("Process Debian route config");
            routes::update_routes(paths, &self.ip, &BTreeSet::new())?;
        } else {
            if !paths.generated_dir.is_dir() {
                error!("No puppet files? Nothing to do! Aborting...");
                return Err(Error::MissingSourceDir(paths.generated_dir.clone()));
            }
            info!("Process Debian network config");
            info!("{}", self.ip.network_info());

            let updated = self.update_interfaces()?;
            routes::update_routes(paths, &self.ip, &updated)?;
            self.check_enrollment();

            info!("{}", self.ip.network_info());
        }

        info!("Finished");
        Ok(())
    }

    /// Reconcile interfaces; returns the interfaces whose routes need pushing
    pub fn update_interfaces(&self) -> Result<BTreeSet<String>> {
        let new = self.load_generated();
        if new.is_trivial() {
            let names: Vec<&str> = new.auto().iter().map(String::as_str).collect();
            info!(
                "Generated {} with empty configuration: '{}', exiting",
                self.settings.paths.generated_interfaces.display(),
                names.join(" ")
            );
            return Ok(BTreeSet::new());
        }

        self.disable_pxeboot();

        if self.settings.paths.upgrade_marker.is_file() {
            info!("Upgrade bootstrap is in execution");
            return self.update_online(&new);
        }

        self.update_ifupdown(&new)
    }

    fn load_generated(&self) -> Snapshot {
        let path = &self.settings.paths.generated_interfaces;
        match fs::read_to_string(path) {
            Ok(content) => Snapshot::from_stanzas(&content, Origin::Generated),
            Err(e) => {
                error!("Failed to read '{}': {}", path.display(), e);
                Snapshot::default()
            }
        }
    }

    /// Snapshot of what was applied by the previous run
    fn load_current(&self) -> Snapshot {
        let auto_path = self.settings.paths.auto_file();
        let auto = match fs::read_to_string(&auto_path) {
            Ok(content) => StanzaParser::parse_str(&content).0,
            Err(_) => {
                info!("Auto file '{}' not found", auto_path.display());
                Vec::new()
            }
        };

        let mut ifaces = Interfaces::new();
        for iface in &auto {
            ifaces.insert(iface.clone(), self.read_ifcfg(iface));
        }
        Snapshot::build(auto, ifaces, Origin::Applied)
    }

    fn read_ifcfg(&self, iface: &str) -> Properties {
        let path = self.settings.paths.ifcfg(iface);
        let Ok(content) = fs::read_to_string(&path) else {
            warn!("Interface config file not found: '{}'", path.display());
            return Properties::new();
        };

        let (_, mut parsed) = StanzaParser::parse_str(&content);
        if parsed.is_empty() {
            warn!("No interface config found in '{}'", path.display());
            return Properties::new();
        }
        let names: Vec<&str> = parsed.keys().map(String::as_str).collect();
        let names = names.join(", ");
        if parsed.len() > 1 {
            warn!(
                "Multiple interface configs found in '{}': {}",
                path.display(),
                names
            );
        }
        match parsed.remove(iface) {
            Some(props) => props,
            None => {
                warn!(
                    "Interface config file '{}' has no config for {}, found: {}",
                    path.display(),
                    iface,
                    names
                );
                Properties::new()
            }
        }
    }

    /// Take down interfaces configured by the installer and drop its file
    fn disable_pxeboot(&self) {
        let path = self.settings.paths.ifcfg(PXEBOOT);
        if !path.is_file() {
            return;
        }
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to read '{}': {}", path.display(), e);
                return;
            }
        };

        let pxeboot = Snapshot::from_stanzas(&content, Origin::Applied);
        if pxeboot.ifaces().is_empty() {
            info!(
                "Pxeboot install config file '{}' has no valid interface config, skipping",
                path.display()
            );
            return;
        }

        for iface in pxeboot.ifaces().keys() {
            info!(
                "Turn off pxeboot install config for {}, will be turned on later",
                iface
            );
            let iftype = pxeboot.iface_type(iface).unwrap_or(InterfaceType::Eth);
            self.set_iface_down(iface, iftype);
        }

        info!("Remove ifcfg-pxeboot, left from kickstart install phase");
        self.remove_iface_file(PXEBOOT);
    }

    /// Full reconciliation through ifupdown
    fn update_ifupdown(&self, new: &Snapshot) -> Result<BTreeSet<String>> {
        let current = self.load_current();
        let diff = ConfigDiff::between(&current, new);
        if diff.is_empty() {
            info!("No interface configuration changes");
        }
        let plan = Plan::new(&current, new, &diff, &self.sysfs);

        let _lock = if plan.is_empty() {
            None
        } else {
            Some(lock::acquire(
                &self.settings.paths.lock_file,
                &self.settings.lock,
            )?)
        };

        for iface in &plan.down {
            if let Some(iftype) = current.iface_type(iface) {
                self.set_iface_down(iface, iftype);
            }
        }
        for iface in &diff.removed {
            self.remove_iface_file(iface);
        }
        self.write_files(new)?;
        for iface in &plan.up {
            self.ip.ifup(iface);
        }

        Ok(plan.updated)
    }

    fn set_iface_down(&self, iface: &str, iftype: InterfaceType) {
        info!("Bringing {} down", iface);

        if self.sysfs.ifstate_is_up(iface) {
            self.ip.ifdown(iface);
        }

        match iftype {
            InterfaceType::Label => {}
            InterfaceType::Eth
            | InterfaceType::Vlan
            | InterfaceType::Bonding
            | InterfaceType::Slave
            | InterfaceType::Lo => {
                if self.sysfs.link_exists(iface) {
                    self.ip.link_set_down(iface);
                    self.ip.addr_flush(iface);
                }
            }
        }
    }

    /// Write every per-interface file and the auto file
    fn write_files(&self, snapshot: &Snapshot) -> Result<()> {
        let paths = &self.settings.paths;
        fs::create_dir_all(&paths.applied_dir).map_err(|e| Error::WriteFile {
            path: paths.applied_dir.clone(),
            source: e,
        })?;

        for (iface, props) in snapshot.ifaces() {
            write_file(&paths.ifcfg(iface), &stanza::render_iface(props))?;
        }
        write_file(&paths.auto_file(), &stanza::render_auto(snapshot.auto()))
    }

    fn remove_iface_file(&self, iface: &str) {
        let path = self.settings.paths.ifcfg(iface);
        if !path.exists() {
            info!("File {} does not exist, no need to remove", path.display());
            return;
        }
        info!("Removing {}", path.display());
        if let Err(e) = fs::remove_file(&path) {
            error!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}
