use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use libc::pid_t;
use log::{debug, trace};
use crate::data::{Protocol, Record, Snapshot};
use crate::error::ScanError;
use crate::owner::{Identity, ProcSweep, Resolver};
use crate::table::{self, Endian, Owner, Row};

const TABLES: &[(Protocol, &[&str])] = &[
    (Protocol::TCP, &["net/tcp", "net/tcp6"]),
    (Protocol::UDP, &["net/udp", "net/udp6"]),
];

pub struct Scanner {
    root:     PathBuf,
    endian:   Endian,
    resolver: Box<dyn Resolver>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let resolver = Box::new(ProcSweep::new(root.clone()));
        Self::with_resolver(root, resolver)
    }

    pub fn with_resolver(root: impl Into<PathBuf>, resolver: Box<dyn Resolver>) -> Self {
        Self {
            root:     root.into(),
            endian:   Endian::native(),
            resolver: resolver,
        }
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Reads every socket table and attributes each socket to its owner.
    /// Fails only when no table at all could be read.
    pub fn scan(&mut self) -> Result<Snapshot, ScanError> {
        let mut rows = Vec::new();
        let mut read = 0;

        for (protocol, paths) in TABLES {
            let mut found = false;

            for path in paths.iter() {
                let path = self.root.join(path);
                let text = match fs::read_to_string(&path) {
                    Ok(text) => text,
                    Err(e)   => {
                        trace!("{}: {}", path.display(), e);
                        continue;
                    }
                };

                let skipped = table::parse(&text, *protocol, self.endian, &mut rows)?;
                if skipped > 0 {
                    debug!("{}: skipped {} malformed rows", path.display(), skipped);
                }
                found = true;
            }

            if found {
                read += 1;
            } else {
                debug!("no {} table under {}", protocol, self.root.display());
            }
        }

        if read == 0 {
            return Err(ScanError::Unavailable(self.root.display().to_string()));
        }

        self.attribute(rows)
    }

    fn attribute(&mut self, rows: Vec<Row>) -> Result<Snapshot, ScanError> {
        let inodes = rows.iter().filter_map(|row| match row.owner {
            Owner::Inode(0)     => None,
            Owner::Inode(inode) => Some(inode),
            Owner::Pid(_)       => None,
        }).collect::<HashSet<_>>();

        let index = self.resolver.index(&inodes);
        let mut identities = HashMap::<pid_t, Identity>::new();

        let mut records = Vec::new();
        records.try_reserve_exact(rows.len())?;

        for row in rows {
            let pid = match row.owner {
                Owner::Inode(inode) => index.get(&inode).copied(),
                Owner::Pid(pid)     => Some(pid).filter(|pid| *pid > 0),
            };

            let (pid, identity) = match pid {
                Some(pid) => {
                    let resolver = &mut self.resolver;
                    let identity = identities.entry(pid).or_insert_with(|| {
                        resolver.identify(pid)
                    });
                    (pid, identity.clone())
                }
                None => (-1, Identity::unresolved()),
            };

            records.push(Record {
                protocol: row.protocol,
                local:    row.local,
                remote:   row.remote,
                state:    row.state,
                pid:      pid,
                process:  identity.name,
                exe:      identity.exe,
                reason:   None,
            });
        }

        debug!("scanned {} sockets, {} owners", records.len(), identities.len());

        Ok(Snapshot::new(records))
    }
}
