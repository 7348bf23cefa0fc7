use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use libc::pid_t;
use log::{debug, trace};
use procfs::ProcError;
use procfs::process::{all_processes_with_root, FDTarget, Process};
use crate::data::{ACCESS_DENIED, UNRESOLVED};

/// Display name and executable of a resolved owner.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    pub name: String,
    pub exe:  String,
}

pub trait Resolver {
    /// Maps the wanted socket inodes to the first process holding each one.
    fn index(&mut self, inodes: &HashSet<u64>) -> HashMap<u64, pid_t>;

    fn identify(&mut self, pid: pid_t) -> Identity;
}

/// Resolves inodes with one sweep of every process fd table per scan.
pub struct ProcSweep {
    root: PathBuf,
}

impl ProcSweep {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn process(&self, pid: pid_t) -> Result<Process, ProcError> {
        Process::new_with_root(self.root.join(pid.to_string()))
    }
}

impl Resolver for ProcSweep {
    fn index(&mut self, inodes: &HashSet<u64>) -> HashMap<u64, pid_t> {
        let mut index = HashMap::with_capacity(inodes.len());

        if inodes.is_empty() {
            return index;
        }

        let procs = match all_processes_with_root(&self.root) {
            Ok(procs) => procs,
            Err(e)    => {
                debug!("process list unavailable: {}", e);
                return index;
            }
        };

        for proc in procs.flatten() {
            let fds = match proc.fd() {
                Ok(fds) => fds,
                Err(e)  => {
                    trace!("pid {} fds unreadable: {}", proc.pid(), e);
                    continue;
                }
            };

            for fd in fds.flatten() {
                if let FDTarget::Socket(inode) = fd.target {
                    if inodes.contains(&inode) {
                        index.entry(inode).or_insert_with(|| proc.pid());
                    }
                }
            }

            if index.len() == inodes.len() {
                break;
            }
        }

        index
    }

    fn identify(&mut self, pid: pid_t) -> Identity {
        let proc = match self.process(pid) {
            Ok(proc) => proc,
            Err(e)   => return Identity::sentinel(&e),
        };

        let name = match proc.stat() {
            Ok(stat) => stat.comm,
            Err(e)   => comm(&self.root, pid).unwrap_or_else(|| sentinel(&e)),
        };

        let exe = match proc.exe() {
            Ok(path) => path.display().to_string(),
            Err(e)   => sentinel(&e),
        };

        Identity { name, exe }
    }
}

impl Identity {
    pub fn unresolved() -> Self {
        Self {
            name: UNRESOLVED.to_owned(),
            exe:  UNRESOLVED.to_owned(),
        }
    }

    fn sentinel(e: &ProcError) -> Self {
        Self {
            name: UNRESOLVED.to_owned(),
            exe:  sentinel(e),
        }
    }
}

fn sentinel(e: &ProcError) -> String {
    match e {
        ProcError::PermissionDenied(_) => ACCESS_DENIED.to_owned(),
        _                              => UNRESOLVED.to_owned(),
    }
}

fn comm(root: &Path, pid: pid_t) -> Option<String> {
    let comm = std::fs::read_to_string(root.join(pid.to_string()).join("comm")).ok()?;
    Some(comm.trim_end().to_owned())
}
