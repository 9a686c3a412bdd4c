//! # Search Statistics
//!
//! [`SearchStats`] is folded from worker events by a single aggregator
//! owned by the orchestrator thread, so no counter is ever shared.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;

use super::events::SearchEvent;
use super::{ProgressConfig, ProgressSnapshot, Strategy};

/// Statistics for one search run
#[derive(Debug, Clone, Serialize)]
pub struct SearchStats {
    pub strategy: Strategy,
    pub candidates: usize,
    /// Probes actually executed, including the match and errored probes
    pub attempts: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Probe errors, worker faults and timeouts in arrival order
    pub errors: Vec<String>,
    pub success: bool,
    /// Empty unless `success`
    pub found_password: String,
    pub chunks_total: usize,
    pub chunks_completed: usize,
    pub chunks_abandoned: usize,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl SearchStats {
    pub fn new(strategy: Strategy, candidates: usize) -> Self {
        Self {
            strategy,
            candidates,
            attempts: 0,
            start_time: Utc::now(),
            end_time: None,
            errors: Vec::new(),
            success: false,
            found_password: String::new(),
            chunks_total: 0,
            chunks_completed: 0,
            chunks_abandoned: 0,
            timed_out: false,
            cancelled: false,
        }
    }

    /// Wall-clock duration between start and end, or up to now while running.
    pub fn elapsed(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn attempts_per_second(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            0.0
        }
    }
}

/// Folds [`SearchEvent`]s into [`SearchStats`] and drives progress callbacks.
pub(crate) struct StatsAggregator {
    stats: SearchStats,
    finished: HashSet<usize>,
    progress: Option<ProgressConfig>,
    started: Instant,
    last_progress: Instant,
}

impl StatsAggregator {
    pub(crate) fn new(
        strategy: Strategy,
        candidates: usize,
        progress: Option<ProgressConfig>,
    ) -> Self {
        let now = Instant::now();
        Self {
            stats: SearchStats::new(strategy, candidates),
            finished: HashSet::new(),
            progress,
            started: now,
            last_progress: now,
        }
    }

    pub(crate) fn add_chunks(&mut self, count: usize) {
        self.stats.chunks_total += count;
    }

    pub(crate) fn is_finished(&self, chunk_id: usize) -> bool {
        self.finished.contains(&chunk_id)
    }

    pub(crate) fn apply(&mut self, event: SearchEvent) {
        match event {
            SearchEvent::Probed { .. } => {
                self.stats.attempts += 1;
            }
            SearchEvent::Matched {
                chunk_id,
                index,
                recorded,
            } => {
                self.stats.attempts += 1;
                if recorded {
                    info!(chunk_id, index, "password match recorded");
                } else {
                    debug!(chunk_id, index, "late match ignored; result already recorded");
                }
            }
            SearchEvent::ProbeFailed {
                chunk_id,
                index,
                message,
            } => {
                self.stats.attempts += 1;
                debug!(chunk_id, index, "probe error: {message}");
                self.stats
                    .errors
                    .push(format!("chunk {chunk_id}, candidate {index}: {message}"));
            }
            SearchEvent::WorkerFault { chunk_id, message } => {
                warn!(chunk_id, "worker fault: {message}");
                self.stats.errors.push(format!("chunk {chunk_id}: {message}"));
            }
            SearchEvent::ChunkFinished { chunk_id } => {
                if self.finished.insert(chunk_id) {
                    self.stats.chunks_completed += 1;
                }
            }
        }
        self.maybe_report_progress();
    }

    /// Give up on a unit that overran its share of the budget.
    pub(crate) fn abandon(&mut self, chunk: &Chunk, share: Duration) {
        warn!(
            chunk_id = chunk.id,
            "chunk did not finish within {:.3}s; abandoning",
            share.as_secs_f64()
        );
        self.finished.insert(chunk.id);
        self.stats.chunks_abandoned += 1;
        self.stats.timed_out = true;
        self.stats.errors.push(format!(
            "chunk {} (candidates {}..{}) timed out after {:.3}s",
            chunk.id,
            chunk.start,
            chunk.end(),
            share.as_secs_f64()
        ));
    }

    /// Record a unit whose workers exited without reporting it.
    pub(crate) fn lost(&mut self, chunk: &Chunk) {
        warn!(chunk_id = chunk.id, "worker pool exited before chunk finished");
        self.finished.insert(chunk.id);
        self.stats.errors.push(format!(
            "chunk {}: worker pool exited before the chunk finished",
            chunk.id
        ));
    }

    /// Next instant a progress callback is due, if progress is enabled.
    pub(crate) fn next_progress_at(&self) -> Option<Instant> {
        self.progress
            .as_ref()
            .filter(|p| !p.interval.is_zero())
            .map(|p| self.last_progress + p.interval)
    }

    pub(crate) fn maybe_report_progress(&mut self) {
        let Some(progress) = &self.progress else {
            return;
        };
        if progress.interval.is_zero() || self.last_progress.elapsed() >= progress.interval {
            progress.reporter.on_progress(&self.snapshot());
            self.last_progress = Instant::now();
        }
    }

    pub(crate) fn snapshot(&self) -> ProgressSnapshot {
        let elapsed_seconds = self.started.elapsed().as_secs_f64();
        let attempts = self.stats.attempts;
        let total = self.stats.candidates as u64;
        let rate = if elapsed_seconds > 0.0 {
            attempts as f64 / elapsed_seconds
        } else {
            0.0
        };
        let completion_pct = if total > 0 {
            (attempts as f64 / total as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        ProgressSnapshot {
            attempts,
            total_candidates: total,
            errors: self.stats.errors.len() as u64,
            chunks_completed: self.stats.chunks_completed,
            chunks_total: self.stats.chunks_total,
            elapsed_seconds,
            rate,
            completion_pct,
        }
    }

    /// Close the run and hand back the final statistics.
    pub(crate) fn finish(mut self, password: Option<&str>, cancelled: bool) -> SearchStats {
        self.stats.end_time = Some(Utc::now());
        self.stats.cancelled = cancelled;
        if let Some(password) = password {
            self.stats.success = true;
            self.stats.found_password = password.to_string();
        }
        if let Some(progress) = &self.progress {
            progress.reporter.on_progress(&self.snapshot());
        }
        self.stats
    }
}
