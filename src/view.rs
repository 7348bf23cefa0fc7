use std::str::FromStr;
use anyhow::{anyhow, Error};
use crate::classify::is_external;
use crate::data::{Record, State};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum View {
    Overview,
    All,
    Established,
    Listen,
    Suspicious,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Sort {
    None,
    Pid,
    Process,
    Remote,
}

/// A presentation-side selection over one inventory.
#[derive(Clone, Debug)]
pub struct Query {
    pub view:   View,
    pub sort:   Sort,
    pub filter: String,
}

impl View {
    pub fn matches(self, record: &Record) -> bool {
        match self {
            Self::Overview    => record.state == State::Established && is_external(record),
            Self::All         => true,
            Self::Established => record.state == State::Established,
            Self::Listen      => record.state == State::Listen,
            Self::Suspicious  => record.reason.is_some(),
        }
    }
}

impl Sort {
    pub fn next(self) -> Self {
        match self {
            Self::None    => Self::Pid,
            Self::Pid     => Self::Process,
            Self::Process => Self::Remote,
            Self::Remote  => Self::None,
        }
    }

    fn apply(self, records: &mut [&Record]) {
        match self {
            Self::None    => (),
            Self::Pid     => records.sort_by_key(|r| r.pid),
            Self::Process => records.sort_by(|a, b| a.process.cmp(&b.process)),
            Self::Remote  => records.sort_by_cached_key(|r| r.remote.to_string()),
        }
    }
}

impl Query {
    /// Selects, filters and orders records without touching the inventory.
    pub fn apply<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        let mut selected = records.iter().filter(|r| {
            self.view.matches(r) && self.search(r)
        }).collect::<Vec<_>>();
        self.sort.apply(&mut selected);
        selected
    }

    fn search(&self, record: &Record) -> bool {
        if self.filter.is_empty() {
            return true;
        }
        record.process.contains(&self.filter) || record.remote.to_string().contains(&self.filter)
    }
}

impl Default for Query {
    fn default() -> Self {
        Self {
            view:   View::All,
            sort:   Sort::None,
            filter: String::new(),
        }
    }
}

impl FromStr for View {
    type Err = Error;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        match arg.to_ascii_lowercase().as_str() {
            "overview"    | "1" => Ok(Self::Overview),
            "all"         | "2" => Ok(Self::All),
            "established" | "3" => Ok(Self::Established),
            "listen"      | "4" => Ok(Self::Listen),
            "suspicious"  | "5" => Ok(Self::Suspicious),
            _                   => Err(anyhow!("invalid view: {}", arg)),
        }
    }
}

impl FromStr for Sort {
    type Err = Error;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        match arg.to_ascii_lowercase().as_str() {
            "none"    => Ok(Self::None),
            "pid"     => Ok(Self::Pid),
            "process" => Ok(Self::Process),
            "remote"  => Ok(Self::Remote),
            _         => Err(anyhow!("invalid sort: {}", arg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Reason;
    use crate::data::Protocol;

    fn record(pid: i32, process: &str, remote: &str, state: State) -> Record {
        Record {
            protocol: Protocol::TCP,
            local:    "10.0.0.1:1000".parse().unwrap(),
            remote:   remote.parse().unwrap(),
            state:    state,
            pid:      pid,
            process:  process.to_owned(),
            exe:      "/usr/bin/x".to_owned(),
            reason:   None,
        }
    }

    fn inventory() -> Vec<Record> {
        let mut nc = record(30, "nc", "203.0.113.9:4444", State::Established);
        nc.reason = Some(Reason::UnusualPort);
        vec![
            record(20, "firefox", "93.184.216.34:443", State::Established),
            record(10, "sshd", "0.0.0.0:0", State::Listen),
            nc,
            record(40, "redis", "127.0.0.1:6379", State::Established),
        ]
    }

    fn pids(records: &[&Record]) -> Vec<i32> {
        records.iter().map(|r| r.pid).collect()
    }

    #[test]
    fn views_select() {
        let records = inventory();
        let mut query = Query::default();

        assert_eq!(pids(&query.apply(&records)), vec![20, 10, 30, 40]);
        query.view = View::Overview;
        assert_eq!(pids(&query.apply(&records)), vec![20, 30]);
        query.view = View::Established;
        assert_eq!(pids(&query.apply(&records)), vec![20, 30, 40]);
        query.view = View::Listen;
        assert_eq!(pids(&query.apply(&records)), vec![10]);
        query.view = View::Suspicious;
        assert_eq!(pids(&query.apply(&records)), vec![30]);
    }

    #[test]
    fn search_matches_process_or_remote() {
        let records = inventory();
        let mut query = Query::default();
        query.filter = "fire".to_owned();
        assert_eq!(pids(&query.apply(&records)), vec![20]);
        query.filter = "4444".to_owned();
        assert_eq!(pids(&query.apply(&records)), vec![30]);
    }

    #[test]
    fn sorts_cycle_and_order() {
        let records = inventory();
        let mut query = Query::default();

        query.sort = query.sort.next();
        assert_eq!(query.sort, Sort::Pid);
        assert_eq!(pids(&query.apply(&records)), vec![10, 20, 30, 40]);

        query.sort = query.sort.next();
        assert_eq!(pids(&query.apply(&records)), vec![20, 30, 40, 10]);

        query.sort = query.sort.next();
        assert_eq!(pids(&query.apply(&records)), vec![10, 40, 30, 20]);

        assert_eq!(query.sort.next(), Sort::None);
        assert_eq!(records[0].pid, 20);
    }
}
