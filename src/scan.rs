use std::time::Duration;

use tokio::{
    sync::mpsc,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{config::ScanConfig, domain::Domain, matcher::DomainMirror};

// debounced rescan driven by dom mutations, list updates and a slow poll

const MIN_SAFETY_POLL: Duration = Duration::from_millis(1);

/// Summary of one observed DOM change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomMutation {
    pub added_nodes: usize,
}

/// Idempotent "rescan and hide" operation run by the pipeline.
pub trait Rescan {
    fn rescan(&mut self, blocked: &[Domain]);
}

impl<F> Rescan for F
where
    F: FnMut(&[Domain]),
{
    fn rescan(&mut self, blocked: &[Domain]) {
        self(blocked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub rescans: usize,
    pub mutations: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanPipeline {
    debounce: Duration,
    safety_poll: Duration,
}

impl ScanPipeline {
    /// `safety_poll` is raised to at least one millisecond.
    pub fn new(debounce: Duration, safety_poll: Duration) -> Self {
        Self {
            debounce,
            safety_poll: safety_poll.max(MIN_SAFETY_POLL),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.debounce(), config.safety_poll())
    }

    /// Runs until the mutation stream closes.
    ///
    /// Mutations that add nodes (re)arm the debounce deadline; the target
    /// runs once the stream has been quiet for the debounce period. List
    /// updates rescan immediately. The safety poll fires once at start and
    /// then every `safety_poll`.
    pub async fn run<R: Rescan>(
        self,
        mut mutations: mpsc::Receiver<DomMutation>,
        mut mirror: DomainMirror,
        mut target: R,
    ) -> ScanReport {
        let mut report = ScanReport {
            rescans: 0,
            mutations: 0,
        };
        let mut deadline: Option<Instant> = None;
        let mut mirror_open = true;
        let mut poll = time::interval(self.safety_poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let debounce_at = deadline.unwrap_or_else(Instant::now);
            tokio::select! {
                mutation = mutations.recv() => match mutation {
                    Some(mutation) => {
                        report.mutations += 1;
                        if mutation.added_nodes > 0 {
                            deadline = Some(Instant::now() + self.debounce);
                        }
                    }
                    None => break,
                },
                _ = time::sleep_until(debounce_at), if deadline.is_some() => {
                    deadline = None;
                    rescan(&mut target, &mirror, &mut report, "debounced mutations");
                }
                changed = mirror.changed(), if mirror_open => match changed {
                    Ok(_) => rescan(&mut target, &mirror, &mut report, "block list updated"),
                    Err(_) => mirror_open = false,
                },
                _ = poll.tick() => {
                    rescan(&mut target, &mirror, &mut report, "safety poll");
                }
            }
        }

        tracing::debug!(rescans = report.rescans, mutations = report.mutations, "scan pipeline finished");
        report
    }
}

fn rescan<R: Rescan>(target: &mut R, mirror: &DomainMirror, report: &mut ScanReport, cause: &str) {
    let snapshot = mirror.snapshot();
    tracing::trace!(cause, domains = snapshot.len(), "rescanning page");
    target.rescan(&snapshot);
    report.rescans += 1;
}
