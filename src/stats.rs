use std::collections::HashMap;
use serde::Serialize;
use crate::data::{Snapshot, State, UNRESOLVED};

const NO_PROCESS: &str = "-";

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Statistics {
    pub total:       usize,
    pub established: usize,
    pub listening:   usize,
    pub suspicious:  usize,
    pub top_process: String,
    pub top_count:   usize,
}

impl Statistics {
    /// One pass over `snapshot`. The top process is the one with the most
    /// established sockets; ties go to the one that appeared first.
    pub fn aggregate(snapshot: &Snapshot) -> Self {
        let mut stats  = Self::default();
        let mut active = HashMap::<&str, usize>::new();
        let mut order  = Vec::<&str>::new();

        for record in &snapshot.records {
            stats.total += 1;

            match record.state {
                State::Established => stats.established += 1,
                State::Listen      => stats.listening += 1,
                _                  => (),
            }

            if record.reason.is_some() {
                stats.suspicious += 1;
            }

            if record.state != State::Established || record.process == UNRESOLVED {
                continue;
            }

            let name = record.process.as_str();
            let count = active.entry(name).or_insert_with(|| {
                order.push(name);
                0
            });
            *count += 1;
        }

        for name in order {
            let count = active[name];
            if count > stats.top_count {
                stats.top_process = name.to_owned();
                stats.top_count   = count;
            }
        }

        stats
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            total:       0,
            established: 0,
            listening:   0,
            suspicious:  0,
            top_process: NO_PROCESS.to_owned(),
            top_count:   0,
        }
    }
}
