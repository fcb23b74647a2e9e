//! Fixed-cadence progress sampling.
//!
//! A [`ProgressSampler`] owns the receiving end of the completion channel. It
//! tallies every [`Completion`] and hands a cumulative [`ProgressSnapshot`] to a
//! [`ProgressSink`] on each interval boundary, whether or not anything
//! completed in between, plus one final snapshot once the channel closes.

use std::fmt;
use std::time::Duration;

use cachelift_core::InsertOutcome;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// One finished unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Completion {
    Inserted,
    AlreadyPresent,
    /// A data log record scanned during an index rebuild.
    Indexed,
}

impl From<InsertOutcome> for Completion {
    fn from(outcome: InsertOutcome) -> Self {
        match outcome {
            InsertOutcome::Inserted => Completion::Inserted,
            InsertOutcome::AlreadyPresent => Completion::AlreadyPresent,
        }
    }
}

/// Cumulative progress at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Everything completed so far. Never decreases.
    pub completed: u64,
    pub inserted: u64,
    pub already_present: u64,
    /// Advisory total; `None` when unknown.
    pub total_estimate: Option<u64>,
    pub elapsed: Duration,
    /// Set on the snapshot emitted after the completion stream closed.
    pub is_final: bool,
}

impl ProgressSnapshot {
    /// Completion percentage against the estimate.
    ///
    /// May exceed 100 when the estimate was low.
    pub fn percent(&self) -> Option<f64> {
        self.total_estimate.map(|total| {
            if total == 0 {
                100.0
            } else {
                self.completed as f64 * 100.0 / total as f64
            }
        })
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "completed {}", self.completed)?;
        if let Some(percent) = self.percent() {
            write!(f, " ({percent:.2}%)")?;
        }
        Ok(())
    }
}

/// Receives snapshots. Presentation is up to the implementation.
pub trait ProgressSink: Send {
    fn on_snapshot(&mut self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressSnapshot) + Send,
{
    fn on_snapshot(&mut self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    inserted: u64,
    already_present: u64,
    indexed: u64,
}

impl Tally {
    fn record(&mut self, completion: Completion) {
        match completion {
            Completion::Inserted => self.inserted += 1,
            Completion::AlreadyPresent => self.already_present += 1,
            Completion::Indexed => self.indexed += 1,
        }
    }

    fn total(&self) -> u64 {
        self.inserted + self.already_present + self.indexed
    }
}

pub struct ProgressSampler {
    interval: Duration,
    total_estimate: Option<u64>,
    started: Instant,
}

impl ProgressSampler {
    pub fn new(interval: Duration, total_estimate: Option<u64>) -> Self {
        Self {
            interval,
            total_estimate,
            started: Instant::now(),
        }
    }

    /// Run on a dedicated task. The handle resolves to the final snapshot.
    pub fn spawn<P>(self, completions: mpsc::Receiver<Completion>, sink: P) -> JoinHandle<ProgressSnapshot>
    where
        P: ProgressSink + 'static,
    {
        tokio::spawn(self.run(completions, sink))
    }

    /// Consume completions until every sender is dropped.
    pub async fn run<P: ProgressSink>(
        self,
        mut completions: mpsc::Receiver<Completion>,
        mut sink: P,
    ) -> ProgressSnapshot {
        let mut ticker = time::interval_at(self.started + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tally = Tally::default();

        loop {
            tokio::select! {
                biased;

                received = completions.recv() => match received {
                    Some(completion) => tally.record(completion),
                    None => break,
                },
                _ = ticker.tick() => {
                    sink.on_snapshot(&self.snapshot(&tally, false));
                }
            }
        }

        let last = self.snapshot(&tally, true);
        sink.on_snapshot(&last);
        last
    }

    fn snapshot(&self, tally: &Tally, is_final: bool) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: tally.total(),
            inserted: tally.inserted,
            already_present: tally.already_present,
            total_estimate: self.total_estimate,
            elapsed: self.started.elapsed(),
            is_final,
        }
    }
}
