use std::collections::HashMap;
use std::net::IpAddr;
use libc::pid_t;
use serde::Serialize;
use crate::data::{Record, Snapshot, State};
use crate::history::History;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Reason {
    TempDir,
    HiddenDir,
    UnusualPort,
    Spike,
}

/// Tunables for the classifier rules.
#[derive(Clone, Debug)]
pub struct Rules {
    pub temp_dirs: Vec<String>,
    pub ports:     Vec<u16>,
    pub spike:     usize,
}

/// Per-pid connection counts for the current scan and the highest count
/// each pid reached in the retained history.
#[derive(Debug, Default)]
pub struct Census {
    current: HashMap<pid_t, usize>,
    peaks:   HashMap<pid_t, usize>,
}

pub struct Classifier {
    rules: Rules,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TempDir     => "TempDir",
            Self::HiddenDir   => "HiddenDir",
            Self::UnusualPort => "UnusualPort",
            Self::Spike       => "Spike",
        }
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            temp_dirs: vec!["/tmp".into(), "/var/tmp".into(), "/dev/shm".into()],
            ports:     vec![80, 443, 22, 21, 25, 53, 3306, 5432, 6379, 8080, 8443, 9000, 27017, 5000],
            spike:     5,
        }
    }
}

impl Census {
    pub fn new(snapshot: &Snapshot, history: &History) -> Self {
        let current = counts(snapshot);
        let peaks   = history.peaks();
        Self { current, peaks }
    }

    pub fn current(&self, pid: pid_t) -> usize {
        self.current.get(&pid).copied().unwrap_or(0)
    }

    pub fn peak(&self, pid: pid_t) -> usize {
        self.peaks.get(&pid).copied().unwrap_or(0)
    }
}

pub fn counts(snapshot: &Snapshot) -> HashMap<pid_t, usize> {
    let mut counts = HashMap::new();
    for record in snapshot.records.iter().filter(|r| r.is_resolved()) {
        *counts.entry(record.pid).or_insert(0) += 1;
    }
    counts
}

impl Classifier {
    pub fn new(rules: Rules) -> Self {
        Self { rules }
    }

    /// First matching rule wins: temp dir, hidden dir, unusual port, spike.
    pub fn classify(&self, record: &Record, census: &Census) -> Option<Reason> {
        if self.in_temp_dir(&record.exe) {
            return Some(Reason::TempDir);
        }

        if has_hidden_dir(&record.exe) {
            return Some(Reason::HiddenDir);
        }

        if self.unusual_port(record) {
            return Some(Reason::UnusualPort);
        }

        if self.spike(record.pid, census) {
            return Some(Reason::Spike);
        }

        None
    }

    /// Overwrites `reason` on every record of `snapshot`.
    pub fn apply(&self, snapshot: &mut Snapshot, history: &History) {
        let census = Census::new(snapshot, history);
        for record in &mut snapshot.records {
            record.reason = self.classify(record, &census);
        }
    }

    fn in_temp_dir(&self, exe: &str) -> bool {
        self.rules.temp_dirs.iter().any(|dir| {
            let dir = dir.trim_end_matches('/');
            exe.strip_prefix(dir).map_or(false, |rest| rest.starts_with('/'))
        })
    }

    fn unusual_port(&self, record: &Record) -> bool {
        if record.state != State::Established {
            return false;
        }

        let remote = record.remote.to_string();
        if is_internal(&remote) {
            return false;
        }

        match port(&remote) {
            Some(port) => !self.rules.ports.contains(&port),
            None       => false,
        }
    }

    /// A pid missing from the retained history has a peak of zero.
    fn spike(&self, pid: pid_t, census: &Census) -> bool {
        if pid <= 0 {
            return false;
        }
        census.current(pid) > census.peak(pid) + self.rules.spike
    }
}

/// True for loopback, `localhost` and unspecified hosts, with or without
/// a port and IPv6 brackets. IPv4-mapped IPv6 addresses are judged by
/// their IPv4 form.
pub fn is_internal(addr: &str) -> bool {
    let host = host(addr);
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => match ip.to_ipv4_mapped() {
            Some(v4) => v4.is_loopback() || v4.is_unspecified(),
            None     => ip.is_loopback() || ip.is_unspecified(),
        },
        Ok(ip) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}

/// The remote end of an established socket is somewhere else.
pub fn is_external(record: &Record) -> bool {
    !is_internal(&record.remote.to_string())
}

fn host(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host,
        _ => addr,
    }
}

fn port(addr: &str) -> Option<u16> {
    addr.rsplit_once(':')?.1.parse().ok()
}

fn has_hidden_dir(exe: &str) -> bool {
    let mut parts = exe.split('/').collect::<Vec<_>>();
    parts.pop();
    parts.iter().any(|p| p.starts_with('.') && *p != "." && *p != "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Protocol;

    fn record(pid: pid_t, exe: &str, remote: &str, state: State) -> Record {
        Record {
            protocol: Protocol::TCP,
            local:    "10.0.0.5:40000".parse().unwrap(),
            remote:   remote.parse().unwrap(),
            state:    state,
            pid:      pid,
            process:  "proc".to_owned(),
            exe:      exe.to_owned(),
            reason:   None,
        }
    }

    fn snapshot(pid: pid_t, n: usize) -> Snapshot {
        let records = (0..n).map(|_| {
            record(pid, "/usr/bin/app", "10.9.9.9:443", State::Established)
        }).collect();
        Snapshot::new(records)
    }

    fn history(pid: pid_t, counts: &[usize]) -> History {
        let mut history = History::new(5);
        for n in counts {
            history.push(snapshot(pid, *n));
        }
        history
    }

    #[test]
    fn temp_path_precedes_port() {
        let c = Classifier::new(Rules::default());
        let r = record(7, "/tmp/x", "93.184.216.34:4444", State::Established);
        let census = Census::default();
        assert_eq!(c.classify(&r, &census), Some(Reason::TempDir));
        assert_eq!(c.classify(&r, &census), Some(Reason::TempDir));
    }

    #[test]
    fn temp_prefix_must_be_a_directory() {
        let c = Classifier::new(Rules::default());
        let census = Census::default();
        let r = record(7, "/tmpfoo/x", "10.0.0.9:443", State::Established);
        assert_eq!(c.classify(&r, &census), None);
        let r = record(7, "/dev/shm/.k/x", "10.0.0.9:443", State::Established);
        assert_eq!(c.classify(&r, &census), Some(Reason::TempDir));
    }

    #[test]
    fn hidden_directory() {
        let c = Classifier::new(Rules::default());
        let census = Census::default();
        let r = record(7, "/home/u/.cache/miner", "10.0.0.9:443", State::Established);
        assert_eq!(c.classify(&r, &census), Some(Reason::HiddenDir));
        let r = record(7, "/home/u/bin/.dotfile", "10.0.0.9:443", State::Established);
        assert_eq!(c.classify(&r, &census), None);
    }

    #[test]
    fn unusual_port_only_for_established_external() {
        let c = Classifier::new(Rules::default());
        let census = Census::default();

        let r = record(7, "/usr/bin/nc", "93.184.216.34:4444", State::Established);
        assert_eq!(c.classify(&r, &census), Some(Reason::UnusualPort));

        let r = record(7, "/usr/bin/nc", "93.184.216.34:4444", State::TimeWait);
        assert_eq!(c.classify(&r, &census), None);

        let r = record(7, "/usr/bin/curl", "93.184.216.34:443", State::Established);
        assert_eq!(c.classify(&r, &census), None);

        let internal = [
            "127.0.0.1:4444",
            "[::1]:4444",
            "0.0.0.0:4444",
            "[::]:4444",
            "[::ffff:127.0.0.1]:4444",
            "[::ffff:0.0.0.0]:4444",
        ];
        for remote in internal {
            let r = record(7, "/usr/bin/nc", remote, State::Established);
            assert_eq!(c.classify(&r, &census), None, "{}", remote);
        }
    }

    #[test]
    fn internal_hosts() {
        assert!(is_internal("127.0.0.1:80"));
        assert!(is_internal("localhost:80"));
        assert!(is_internal("localhost"));
        assert!(is_internal("::1"));
        assert!(is_internal("[::1]:8080"));
        assert!(is_internal("0.0.0.0:0"));
        assert!(!is_internal("10.0.0.1:80"));
        assert!(!is_internal("[2001:db8::1]:80"));
        assert!(is_internal("[::ffff:127.0.0.9]:80"));
        assert!(!is_internal("[::ffff:93.184.216.34]:80"));
    }

    #[test]
    fn mapped_peers_follow_their_ipv4_form() {
        let c = Classifier::new(Rules::default());
        let census = Census::default();

        let r = record(7, "/usr/bin/nc", "[::ffff:127.0.0.1]:4444", State::Established);
        assert!(!is_external(&r));
        assert_eq!(c.classify(&r, &census), None);

        let r = record(7, "/usr/bin/nc", "[::ffff:93.184.216.34]:4444", State::Established);
        assert!(is_external(&r));
        assert_eq!(c.classify(&r, &census), Some(Reason::UnusualPort));
    }

    #[test]
    fn spike_boundary() {
        let c = Classifier::new(Rules::default());
        let history = history(42, &[3, 3, 3, 3, 3]);

        let now = snapshot(42, 8);
        let census = Census::new(&now, &history);
        assert_eq!(c.classify(&now.records[0], &census), None);

        let now = snapshot(42, 9);
        let census = Census::new(&now, &history);
        assert_eq!(c.classify(&now.records[0], &census), Some(Reason::Spike));
    }

    #[test]
    fn spike_compares_against_peak() {
        let c = Classifier::new(Rules::default());
        let history = history(42, &[1, 6, 2]);

        let now = snapshot(42, 11);
        let census = Census::new(&now, &history);
        assert_eq!(c.classify(&now.records[0], &census), None);

        let now = snapshot(42, 12);
        let census = Census::new(&now, &history);
        assert_eq!(c.classify(&now.records[0], &census), Some(Reason::Spike));
    }

    #[test]
    fn spike_from_empty_history() {
        let c = Classifier::new(Rules::default());

        let now = snapshot(42, 20);
        let census = Census::new(&now, &History::new(5));
        assert_eq!(c.classify(&now.records[0], &census), Some(Reason::Spike));

        let now = snapshot(42, 5);
        let census = Census::new(&now, &History::new(5));
        assert_eq!(c.classify(&now.records[0], &census), None);

        let now = snapshot(42, 6);
        let census = Census::new(&now, &History::new(5));
        assert_eq!(c.classify(&now.records[0], &census), Some(Reason::Spike));

        let now = snapshot(-1, 20);
        let census = Census::new(&now, &history(-1, &[0]));
        assert_eq!(c.classify(&now.records[0], &census), None);
    }

    #[test]
    fn spike_does_not_override_earlier_rules() {
        let c = Classifier::new(Rules::default());
        let history = history(42, &[1]);

        let mut now = snapshot(42, 10);
        now.records[0].exe = "/var/tmp/dropper".to_owned();
        c.apply(&mut now, &history);

        assert_eq!(now.records[0].reason, Some(Reason::TempDir));
        assert!(now.records[1..].iter().all(|r| r.reason == Some(Reason::Spike)));
    }

    #[test]
    fn apply_is_idempotent() {
        let c = Classifier::new(Rules::default());
        let history = history(42, &[3]);
        let mut now = snapshot(42, 9);
        now.records.push(record(5, "/usr/bin/ssh", "8.8.4.4:2222", State::Established));

        c.apply(&mut now, &history);
        let first = now.records.iter().map(|r| r.reason).collect::<Vec<_>>();
        c.apply(&mut now, &history);
        let second = now.records.iter().map(|r| r.reason).collect::<Vec<_>>();

        assert_eq!(first, second);
        assert_eq!(now.records[9].risk_reason(), "UnusualPort");
    }
}
