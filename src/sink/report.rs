use std::time::SystemTime;
use serde::Serialize;
use crate::data::{Record, Snapshot};
use crate::history::Trend;
use crate::probe::DriverTier;
use crate::stats::Statistics;
use crate::view::Query;

/// What one committed scan hands to presentation.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub hostname:  String,
    pub driver:    &'static str,
    pub timestamp: SystemTime,
    pub stats:     &'a Statistics,
    pub trend:     Vec<usize>,
    pub records:   Vec<&'a Record>,
}

impl<'a> Report<'a> {
    pub fn new(
        driver:   DriverTier,
        snapshot: &'a Snapshot,
        stats:    &'a Statistics,
        trend:    &Trend,
        query:    &Query,
    ) -> Self {
        let hostname = hostname::get().ok().and_then(|h| h.into_string().ok());

        Self {
            hostname:  hostname.unwrap_or_default(),
            driver:    driver.name(),
            timestamp: snapshot.timestamp,
            stats:     stats,
            trend:     trend.points(),
            records:   query.apply(&snapshot.records),
        }
    }
}
