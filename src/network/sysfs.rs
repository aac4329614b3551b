//! Kernel and ifupdown state probes
//!
//! Reads `/sys/class/net` and the ifupdown state markers. Nothing here
//! mutates the system.

use crate::config::Paths;
use std::fs;
use std::path::PathBuf;

/// Read-only view of interface state on the host
#[derive(Debug, Clone)]
pub struct Sysfs {
    net_dir: PathBuf,
    ifstate_prefix: PathBuf,
}

impl Sysfs {
    pub fn new(paths: &Paths) -> Self {
        Self {
            net_dir: paths.sysfs_net.clone(),
            ifstate_prefix: paths.ifstate_prefix.clone(),
        }
    }

    /// Whether the kernel has a device link for the interface
    pub fn link_exists(&self, iface: &str) -> bool {
        self.net_dir
            .join(iface)
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    /// Whether the interface is absent or its operational state is not `up`
    pub fn is_missing_or_down(&self, iface: &str) -> bool {
        let path = self.net_dir.join(iface).join("operstate");
        match fs::read_to_string(&path) {
            Ok(state) => state.trim() != "up",
            Err(_) => true,
        }
    }

    /// Whether ifupdown considers the interface configured
    pub fn ifstate_is_up(&self, iface: &str) -> bool {
        let mut path = self.ifstate_prefix.clone().into_os_string();
        path.push(iface);
        fs::read_to_string(PathBuf::from(path))
            .map(|content| content.trim() == iface)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Paths, Sysfs) {
        let dir = TempDir::new().unwrap();
        let paths = Paths::rooted(dir.path());
        fs::create_dir_all(&paths.sysfs_net).unwrap();
        fs::create_dir_all(paths.ifstate_prefix.parent().unwrap()).unwrap();
        let sysfs = Sysfs::new(&paths);
        (dir, paths, sysfs)
    }

    fn add_device(paths: &Paths, iface: &str, operstate: &str) {
        let device = paths.sysfs_net.join("devices").join(iface);
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("operstate"), operstate).unwrap();
        symlink(&device, paths.sysfs_net.join(iface)).unwrap();
    }

    #[test]
    fn test_link_exists() {
        let (_dir, paths, sysfs) = setup();
        add_device(&paths, "enp0s3", "up\n");
        fs::create_dir_all(paths.sysfs_net.join("plain")).unwrap();

        assert!(sysfs.link_exists("enp0s3"));
        assert!(!sysfs.link_exists("plain"));
        assert!(!sysfs.link_exists("enp0s9"));
    }

    #[test]
    fn test_missing_or_down() {
        let (_dir, paths, sysfs) = setup();
        add_device(&paths, "enp0s3", "up\n");
        add_device(&paths, "enp0s8", "down\n");
        add_device(&paths, "enp0s9", "lowerlayerdown\n");

        assert!(!sysfs.is_missing_or_down("enp0s3"));
        assert!(sysfs.is_missing_or_down("enp0s8"));
        assert!(sysfs.is_missing_or_down("enp0s9"));
        assert!(sysfs.is_missing_or_down("bond0"));
    }

    #[test]
    fn test_ifstate_is_up() {
        let (_dir, paths, sysfs) = setup();
        fs::write(paths.ifstate("enp0s3"), "enp0s3\n").unwrap();
        fs::write(paths.ifstate("enp0s8"), "").unwrap();

        assert!(sysfs.ifstate_is_up("enp0s3"));
        assert!(!sysfs.ifstate_is_up("enp0s8"));
        assert!(!sysfs.ifstate_is_up("vlan100"));
    }
}
