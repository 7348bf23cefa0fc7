use std::path::PathBuf;
use std::time::Duration;
use crate::classify::Rules;
use crate::probe::DriverTier;
use crate::sched::Cadence;
use crate::view::{Query, Sort, View};

pub const PROC: &str = "/proc";

#[derive(Clone, Debug)]
pub struct Config {
    pub root:    PathBuf,
    pub driver:  Option<DriverTier>,
    pub cadence: Cadence,
    pub rules:   Rules,
    pub query:   Query,
}

/// Command-line overrides; anything unset keeps its default.
#[derive(Debug, Default)]
pub struct Overrides {
    pub root:     Option<PathBuf>,
    pub driver:   Option<DriverTier>,
    pub interval: Option<u64>,
    pub stale:    Option<u64>,
    pub debounce: Option<u64>,
    pub spike:    Option<usize>,
    pub view:     Option<View>,
    pub sort:     Option<Sort>,
    pub filter:   Option<String>,
}

impl Config {
    pub fn new(o: Overrides) -> Self {
        let mut config = Self::default();
        let ms = Duration::from_millis;

        if let Some(root) = o.root {
            config.root = root;
        }
        config.driver = o.driver;

        let cadence = &mut config.cadence;
        cadence.interval = o.interval.map(ms).unwrap_or(cadence.interval);
        cadence.stale    = o.stale.map(ms).unwrap_or(cadence.stale);
        cadence.debounce = o.debounce.map(ms).unwrap_or(cadence.debounce);
        cadence.stale    = cadence.stale.max(cadence.interval);

        if let Some(spike) = o.spike {
            config.rules.spike = spike;
        }

        let query = &mut config.query;
        query.view   = o.view.unwrap_or(query.view);
        query.sort   = o.sort.unwrap_or(query.sort);
        query.filter = o.filter.unwrap_or_default();

        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root:    PathBuf::from(PROC),
            driver:  None,
            cadence: Cadence::default(),
            rules:   Rules::default(),
            query:   Query::default(),
        }
    }
}
