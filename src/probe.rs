use std::fmt;
use std::str::FromStr;
use anyhow::{anyhow, Error};
use log::debug;
use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub enum DriverTier {
    Polling,
    Netlink,
    Ebpf,
}

/// Kernel release as (major, minor).
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Release(pub u32, pub u32);

const EBPF:    Release = Release(4, 9);
const NETLINK: Release = Release(2, 6);

impl DriverTier {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ebpf    => "eBPF (Tier 1)",
            Self::Netlink => "Netlink (Tier 2)",
            Self::Polling => "Standard Polling (Tier 0)",
        }
    }
}

impl Release {
    /// Parses the leading `major.minor` of a release string like
    /// `5.15.0-91-generic`.
    pub fn parse(release: &str) -> Option<Self> {
        let mut split = release.split(|c: char| !c.is_ascii_digit());
        let major = split.next()?.parse().ok()?;
        let minor = split.next()?.parse().ok()?;
        Some(Self(major, minor))
    }
}

pub fn select(release: Option<Release>, bpf: impl FnOnce() -> bool) -> DriverTier {
    match release {
        Some(r) if r >= EBPF && bpf() => DriverTier::Ebpf,
        Some(r) if r >= NETLINK       => DriverTier::Netlink,
        _                             => DriverTier::Polling,
    }
}

#[cfg(target_os = "linux")]
pub fn probe() -> DriverTier {
    let release = match procfs::sys::kernel::Version::current() {
        Ok(v)  => Some(Release(v.major.into(), v.minor.into())),
        Err(e) => {
            debug!("kernel version unavailable: {}", e);
            None
        }
    };

    let tier = select(release, bpf_syscall);
    debug!("kernel {:?}, driver {}", release, tier.name());
    tier
}

#[cfg(not(target_os = "linux"))]
pub fn probe() -> DriverTier {
    debug!("no connector subsystem on this platform");
    DriverTier::Polling
}

/// A null `bpf(0, NULL, 0)` fails with anything but ENOSYS when the
/// syscall exists.
#[cfg(target_os = "linux")]
fn bpf_syscall() -> bool {
    let ret = unsafe { libc::syscall(libc::SYS_bpf, 0, std::ptr::null::<u8>(), 0) };
    if ret != -1 {
        return true;
    }
    let errno = std::io::Error::last_os_error().raw_os_error();
    errno != Some(libc::ENOSYS)
}

impl fmt::Display for DriverTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriverTier {
    type Err = Error;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        match arg.to_ascii_lowercase().as_str() {
            "polling" => Ok(Self::Polling),
            "netlink" => Ok(Self::Netlink),
            "ebpf"    => Ok(Self::Ebpf),
            _         => Err(anyhow!("invalid driver: {}", arg)),
        }
    }
}
