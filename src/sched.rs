use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::Result;
use log::{debug, trace, warn};
use tokio::sync::mpsc::Receiver;
use crate::classify::Classifier;
use crate::data::Snapshot;
use crate::error::ScanError;
use crate::history::{History, Trend};
use crate::scan::Scanner;
use crate::sink::{Report, Sink};
use crate::source::Source;
use crate::stats::Statistics;
use crate::view::Query;

/// Longest single wait before the scheduler re-evaluates.
pub const TICK: Duration = Duration::from_millis(100);

#[derive(Copy, Clone, Debug)]
pub struct Cadence {
    pub interval: Duration,
    pub stale:    Duration,
    pub debounce: Duration,
}

#[derive(Debug)]
pub enum Input {
    Key(u8),
    Quit,
}

#[derive(Debug, Default)]
pub struct Clock {
    last_scan:  Option<Instant>,
    last_input: Option<Instant>,
}

pub struct Monitor {
    scanner:    Scanner,
    classifier: Classifier,
    cadence:    Cadence,
    clock:      Clock,
    history:    History,
    trend:      Trend,
    stats:      Statistics,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            stale:    Duration::from_secs(5),
            debounce: Duration::from_millis(500),
        }
    }
}

impl Clock {
    /// A kernel trigger or a stale inventory always rescans. Otherwise the
    /// normal interval must have passed with no recent user input.
    pub fn due(&self, now: Instant, triggered: bool, cadence: &Cadence) -> bool {
        let last = match self.last_scan {
            Some(last) => last,
            None       => return true,
        };

        let elapsed = now.saturating_duration_since(last);
        if triggered || elapsed >= cadence.stale {
            return true;
        }

        let idle = match self.last_input {
            Some(input) => now.saturating_duration_since(input) >= cadence.debounce,
            None        => true,
        };

        elapsed >= cadence.interval && idle
    }

    pub fn scanned(&mut self, now: Instant) {
        self.last_scan = Some(now);
    }

    pub fn interacted(&mut self, now: Instant) {
        self.last_input = Some(now);
    }
}

impl Monitor {
    pub fn new(scanner: Scanner, classifier: Classifier, cadence: Cadence) -> Self {
        Self {
            scanner:    scanner,
            classifier: classifier,
            cadence:    cadence,
            clock:      Clock::default(),
            history:    History::default(),
            trend:      Trend::default(),
            stats:      Statistics::default(),
        }
    }

    /// Scans, classifies against the retained history, then commits. A
    /// failed scan leaves the current inventory and statistics in place.
    pub fn refresh(&mut self) -> Result<Arc<Snapshot>, ScanError> {
        self.clock.scanned(Instant::now());

        let mut snapshot = self.scanner.scan()?;
        self.classifier.apply(&mut snapshot, &self.history);

        let stats = Statistics::aggregate(&snapshot);
        self.trend.push(stats.total);
        self.stats = stats;

        trace!("{:?}", self.stats);

        Ok(self.history.push(snapshot))
    }

    /// One scan for export, with no history behind it.
    pub fn once(&mut self) -> Result<Arc<Snapshot>, ScanError> {
        self.refresh()
    }

    pub fn current(&self) -> Option<&Arc<Snapshot>> {
        self.history.latest()
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn trend(&self) -> &Trend {
        &self.trend
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Multiplexes kernel triggers, user input and the clock until a quit
    /// request arrives. Every committed rescan is handed to `sink`.
    pub async fn run(
        &mut self,
        source: &mut Source,
        input:  &mut Receiver<Input>,
        sink:   &Sink,
        query:  &Query,
    ) -> Result<()> {
        let tier = source.tier();
        let mut open = true;

        loop {
            let triggered = tokio::select! {
                ready = source.poll_ready(TICK) => match ready {
                    Ok(triggered) => triggered,
                    Err(e)        => {
                        debug!("discarded kernel message: {:?}", e);
                        false
                    }
                },
                key = input.recv(), if open => match key {
                    Some(Input::Key(_)) => {
                        self.clock.interacted(Instant::now());
                        false
                    }
                    Some(Input::Quit) => break,
                    None              => {
                        open = false;
                        false
                    }
                },
            };

            if !self.clock.due(Instant::now(), triggered, &self.cadence) {
                continue;
            }

            match self.refresh() {
                Ok(snapshot) => {
                    let report = Report::new(tier, &snapshot, &self.stats, &self.trend, query);
                    sink.send(&report)?;
                }
                Err(e) => warn!("scan failed, keeping previous inventory: {}", e),
            }
        }

        Ok(())
    }
}
