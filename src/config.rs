//! Settings file parsing for netapply
//!
//! Every value has a default matching the stock platform layout, so the
//! settings file is optional. Its location comes from `NETAPPLY_CONFIG`,
//! falling back to `/etc/netapply.toml`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an alternate settings file
pub const CONFIG_ENV: &str = "NETAPPLY_CONFIG";

/// Settings file used when `NETAPPLY_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "/etc/netapply.toml";

/// Resolve the settings file location
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load settings from a file, using defaults when it does not exist
pub fn load(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let settings: Settings = toml::from_str(&content)?;
    Ok(settings)
}

/// Root settings structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// File and directory layout
    pub paths: Paths,

    /// External tools and their timeouts
    pub commands: Commands,

    /// Synchronization lock retry policy
    pub lock: LockSettings,
}

/// File and directory layout
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Directory holding the generated configuration
    pub generated_dir: PathBuf,
    /// Generated interface stanzas
    pub generated_interfaces: PathBuf,
    /// Generated IPv4 routes
    pub generated_routes: PathBuf,
    /// Generated IPv6 routes
    pub generated_routes6: PathBuf,
    /// Directory holding the applied per-interface files and the auto file
    pub applied_dir: PathBuf,
    /// Previously applied routes
    pub applied_routes: PathBuf,
    /// Lock shared with the inventory agent
    pub lock_file: PathBuf,
    /// Present while an upgrade bootstrap is running
    pub upgrade_marker: PathBuf,
    /// Present while a re-enrollment is running
    pub enrollment_marker: PathBuf,
    /// Interface fragment supplied for re-enrollment
    pub cloud_init_file: PathBuf,
    /// Prefix of the ifupdown state markers (`<prefix><iface>`)
    pub ifstate_prefix: PathBuf,
    /// Kernel network device directory
    pub sysfs_net: PathBuf,
    /// Log destination, stderr when unset or unwritable
    pub log_file: Option<PathBuf>,
}

impl Default for Paths {
    fn default() -> Self {
        let generated = PathBuf::from("/var/run/network-scripts.puppet");
        let applied = PathBuf::from("/etc/network/interfaces.d");
        Self {
            generated_interfaces: generated.join("interfaces"),
            generated_routes: generated.join("routes"),
            generated_routes6: generated.join("routes6"),
            generated_dir: generated,
            cloud_init_file: applied.join("50-cloud-init"),
            applied_dir: applied,
            applied_routes: PathBuf::from("/etc/network/routes"),
            lock_file: PathBuf::from("/var/run/apply_network_config.lock"),
            upgrade_marker: PathBuf::from("/var/run/.network_upgrade_bootstrap"),
            enrollment_marker: PathBuf::from("/var/run/.enroll-init-reconfigure"),
            ifstate_prefix: PathBuf::from("/run/network/ifstate."),
            sysfs_net: PathBuf::from("/sys/class/net"),
            log_file: Some(PathBuf::from("/var/log/user.log")),
        }
    }
}

impl Paths {
    /// Prefix applied to per-interface file names
    pub const IFCFG_PREFIX: &'static str = "ifcfg-";

    /// Default layout relocated under `root`
    #[cfg(test)]
    pub fn rooted(root: &Path) -> Self {
        let rebase = |p: &Path| root.join(p.strip_prefix("/").unwrap_or(p));
        let defaults = Self::default();
        Self {
            generated_dir: rebase(&defaults.generated_dir),
            generated_interfaces: rebase(&defaults.generated_interfaces),
            generated_routes: rebase(&defaults.generated_routes),
            generated_routes6: rebase(&defaults.generated_routes6),
            applied_dir: rebase(&defaults.applied_dir),
            applied_routes: rebase(&defaults.applied_routes),
            lock_file: rebase(&defaults.lock_file),
            upgrade_marker: rebase(&defaults.upgrade_marker),
            enrollment_marker: rebase(&defaults.enrollment_marker),
            cloud_init_file: rebase(&defaults.cloud_init_file),
            ifstate_prefix: rebase(&defaults.ifstate_prefix),
            sysfs_net: rebase(&defaults.sysfs_net),
            log_file: None,
        }
    }

    /// Per-interface stanza file in the applied directory
    pub fn ifcfg(&self, iface: &str) -> PathBuf {
        self.applied_dir
            .join(format!("{}{}", Self::IFCFG_PREFIX, iface))
    }

    /// Applied auto file
    pub fn auto_file(&self) -> PathBuf {
        self.applied_dir.join("auto")
    }

    /// ifupdown state marker for an interface
    pub fn ifstate(&self, iface: &str) -> PathBuf {
        let mut path = self.ifstate_prefix.clone().into_os_string();
        path.push(iface);
        PathBuf::from(path)
    }
}

/// External tools and their timeouts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Commands {
    /// iproute2 binary
    pub ip: String,
    /// ifupdown bring-up tool
    pub ifup: String,
    /// ifupdown tear-down tool
    pub ifdown: String,
    /// Seconds before a command is sent SIGTERM
    pub timeout_secs: u64,
    /// Seconds between SIGTERM and SIGKILL
    pub term_wait_secs: u64,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            ip: "/usr/sbin/ip".to_string(),
            ifup: "/sbin/ifup".to_string(),
            ifdown: "/sbin/ifdown".to_string(),
            timeout_secs: 30,
            term_wait_secs: 10,
        }
    }
}

impl Commands {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn term_wait(&self) -> Duration {
        Duration::from_secs(self.term_wait_secs)
    }
}

/// Synchronization lock retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Attempts before giving up
    pub attempts: u32,
    /// Seconds to sleep between attempts
    pub interval_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval_secs: 5,
        }
    }
}

impl LockSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
