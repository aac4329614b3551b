//! Host network adapters
//!
//! Provides:
//! - iproute2/ifupdown command wrappers
//! - sysfs and ifstate probes
//! - Netmask to prefix length conversion

pub mod iproute;
pub mod netmask;
pub mod sysfs;

pub use iproute::IpRoute;
pub use sysfs::Sysfs;
