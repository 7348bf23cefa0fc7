use std::time::Duration;
use anyhow::Result;
use log::{debug, warn};
use tokio::time::timeout;
use crate::probe::DriverTier;

/// What decides when to rescan: kernel exec notifications or the clock alone.
pub enum Source {
    #[cfg(target_os = "linux")]
    Connector(connector::Connector, DriverTier),
    Polling,
}

impl Source {
    /// Opens the notification channel for `tier`. Any failure to open it,
    /// missing privilege included, degrades to polling.
    pub fn open(tier: DriverTier) -> Self {
        match tier {
            DriverTier::Ebpf | DriverTier::Netlink => Self::connector(tier),
            DriverTier::Polling                    => Self::Polling,
        }
    }

    #[cfg(target_os = "linux")]
    fn connector(tier: DriverTier) -> Self {
        match connector::Connector::open() {
            Ok(c)  => {
                debug!("subscribed to proc connector");
                Self::Connector(c, tier)
            }
            Err(e) => {
                warn!("proc connector unavailable, polling: {:?}", e);
                Self::Polling
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn connector(_tier: DriverTier) -> Self {
        Self::Polling
    }

    pub fn tier(&self) -> DriverTier {
        match self {
            #[cfg(target_os = "linux")]
            Self::Connector(_, tier) => *tier,
            Self::Polling            => DriverTier::Polling,
        }
    }

    /// Waits up to `limit` for a readable kernel message. `Ok(true)` only
    /// when it carried a process exec.
    pub async fn poll_ready(&mut self, limit: Duration) -> Result<bool> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Connector(c, _) => match timeout(limit, c.recv()).await {
                Ok(result) => result,
                Err(_)     => Ok(false),
            },
            Self::Polling => {
                tokio::time::sleep(limit).await;
                Ok(false)
            }
        }
    }
}

#[cfg(target_os = "linux")]
pub mod connector {
    use std::io;
    use std::mem::{size_of, zeroed};
    use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::process;
    use anyhow::Result;
    use log::trace;
    use tokio::io::unix::AsyncFd;
    use crate::event::{decode, subscribe, CN_IDX_PROC};

    const BUF: usize = 4096;

    pub struct Connector {
        fd:  AsyncFd<OwnedFd>,
        buf: Vec<u8>,
    }

    impl Connector {
        pub fn open() -> Result<Self> {
            let fd = unsafe {
                libc::socket(
                    libc::PF_NETLINK,
                    libc::SOCK_DGRAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                    libc::NETLINK_CONNECTOR,
                )
            };

            if fd < 0 {
                return Err(io::Error::last_os_error().into());
            }

            let fd  = unsafe { OwnedFd::from_raw_fd(fd) };
            let pid = process::id();

            let mut sa: libc::sockaddr_nl = unsafe { zeroed() };
            sa.nl_family = libc::AF_NETLINK as libc::sa_family_t;
            sa.nl_groups = CN_IDX_PROC;
            sa.nl_pid    = pid;

            let ptr = &sa as *const libc::sockaddr_nl as *const libc::sockaddr;
            let len = size_of::<libc::sockaddr_nl>() as libc::socklen_t;
            if unsafe { libc::bind(fd.as_raw_fd(), ptr, len) } < 0 {
                return Err(io::Error::last_os_error().into());
            }

            let msg = subscribe(pid);
            let n = unsafe {
                libc::send(fd.as_raw_fd(), msg.as_ptr().cast(), msg.len(), 0)
            };
            if n < 0 {
                return Err(io::Error::last_os_error().into());
            }

            let fd  = AsyncFd::new(fd)?;
            let buf = vec![0u8; BUF];

            Ok(Self { fd, buf })
        }

        /// Reads one datagram. Decode errors fail this call only.
        pub async fn recv(&mut self) -> Result<bool> {
            loop {
                let mut guard = self.fd.readable().await?;
                let buf = &mut self.buf;

                match guard.try_io(|fd| read(fd.as_raw_fd(), buf)) {
                    Ok(Ok(0))  => return Ok(false),
                    Ok(Ok(n))  => {
                        let events = decode(&self.buf[..n])?;
                        trace!("connector events: {:?}", events);
                        return Ok(events.iter().any(|e| e.is_exec()));
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_)     => continue,
                }
            }
        }
    }

    fn read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), 0) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}
