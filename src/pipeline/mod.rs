//! # Pipeline Module
//!
//! Orchestrates the dictionary search: validates the inputs, partitions the
//! candidates into chunks, runs a bounded worker pool over them and folds
//! worker events into [`SearchStats`] while enforcing the time budget.

pub mod events;
pub mod state;
pub mod stats;
pub mod workers;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::chunk::{Chunk, build_chunks};
use crate::constants::{
    CHANNEL_CAPACITY_MULTIPLIER, MAX_CONCURRENCY, MIN_CHANNEL_CAPACITY, MIN_CONCURRENCY,
    PRIORITY_PREFIX_LEN,
};
use crate::document::Document;
use crate::probe::DecryptionProbe;

use events::SearchEvent;
use state::SharedSearchState;
use stats::StatsAggregator;
use workers::{ChunkJob, WorkerContext};

pub use stats::SearchStats;

/// How candidates are distributed across workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Sequential,
    Parallel,
    Hybrid,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Sequential => "sequential",
            Strategy::Parallel => "parallel",
            Strategy::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Errors raised before a search starts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("no candidate passwords to try")]
    NoCandidates,
    #[error("candidate {index} is empty")]
    EmptyCandidate { index: usize },
    #[error("chunk size must be a positive integer")]
    InvalidChunkSize,
    #[error("timeout must be positive")]
    InvalidTimeout,
}

/// Progress snapshot reported during a run.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub attempts: u64,
    pub total_candidates: u64,
    pub errors: u64,
    pub chunks_completed: usize,
    pub chunks_total: usize,
    pub elapsed_seconds: f64,
    /// Attempts per second since the run started
    pub rate: f64,
    /// Completion percentage (0.0 - 100.0)
    pub completion_pct: f64,
}

/// Progress callback trait for long-running searches.
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

#[derive(Clone)]
pub struct ProgressConfig {
    pub reporter: Arc<dyn ProgressReporter>,
    pub interval: Duration,
}

#[derive(Clone)]
pub struct SearchOptions {
    pub strategy: Strategy,
    pub concurrency: usize,
    pub chunk_size: usize,
    pub timeout: Duration,
    /// Candidates tried sequentially before the parallel phase in hybrid mode
    pub priority_prefix: usize,
    pub progress: Option<ProgressConfig>,
}

impl SearchOptions {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            concurrency: 4,
            chunk_size: 1000,
            timeout: Duration::from_secs(3600),
            priority_prefix: PRIORITY_PREFIX_LEN,
            progress: None,
        }
    }
}

/// Result of a completed search
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub password: Option<String>,
    pub elapsed: Duration,
    pub stats: SearchStats,
}

/// Run a dictionary search against `document`.
///
/// Returns the matching candidate, if any, together with the run
/// statistics. Past input validation this always returns an outcome;
/// probe errors, worker faults and timeouts end up in `stats.errors`.
pub fn crack(
    document: &Document,
    candidates: Vec<String>,
    probe: Arc<dyn DecryptionProbe>,
    options: SearchOptions,
) -> Result<SearchOutcome, SearchError> {
    crack_with_cancel(
        document,
        candidates,
        probe,
        options,
        Arc::new(AtomicBool::new(false)),
    )
}

/// Run the search with an external cancellation flag (e.g., Ctrl+C).
pub fn crack_with_cancel(
    document: &Document,
    candidates: Vec<String>,
    probe: Arc<dyn DecryptionProbe>,
    options: SearchOptions,
    cancel_flag: Arc<AtomicBool>,
) -> Result<SearchOutcome, SearchError> {
    validate(&candidates, &options)?;
    Ok(SearchRunner::new(document, candidates, probe, options, cancel_flag).run())
}

fn validate(candidates: &[String], options: &SearchOptions) -> Result<(), SearchError> {
    if candidates.is_empty() {
        return Err(SearchError::NoCandidates);
    }
    if let Some(index) = candidates.iter().position(|c| c.is_empty()) {
        return Err(SearchError::EmptyCandidate { index });
    }
    if options.chunk_size == 0 {
        return Err(SearchError::InvalidChunkSize);
    }
    if options.timeout.is_zero() {
        return Err(SearchError::InvalidTimeout);
    }
    Ok(())
}

fn clamp_concurrency(requested: usize) -> usize {
    let clamped = requested.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
    if clamped != requested {
        warn!(
            "concurrency {requested} out of range {MIN_CONCURRENCY}..={MAX_CONCURRENCY}; using {clamped}"
        );
    }
    clamped
}

/// `now + budget`, saturating instead of overflowing on absurd budgets.
fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget)
        .unwrap_or_else(|| now + Duration::from_secs(u32::MAX as u64))
}

struct SearchRunner {
    ctx: Arc<WorkerContext>,
    strategy: Strategy,
    concurrency: usize,
    chunk_size: usize,
    timeout: Duration,
    priority_prefix: usize,
    aggregator: StatsAggregator,
    started: Instant,
}

impl SearchRunner {
    fn new(
        document: &Document,
        candidates: Vec<String>,
        probe: Arc<dyn DecryptionProbe>,
        options: SearchOptions,
        cancel_flag: Arc<AtomicBool>,
    ) -> Self {
        let total = candidates.len();
        let ctx = WorkerContext {
            document: document.clone(),
            probe,
            candidates: candidates.into(),
            state: Arc::new(SharedSearchState::with_cancel(cancel_flag)),
        };
        Self {
            ctx: Arc::new(ctx),
            strategy: options.strategy,
            concurrency: clamp_concurrency(options.concurrency),
            chunk_size: options.chunk_size,
            timeout: options.timeout,
            priority_prefix: options.priority_prefix,
            aggregator: StatsAggregator::new(options.strategy, total, options.progress),
            started: Instant::now(),
        }
    }

    fn run(mut self) -> SearchOutcome {
        let total = self.ctx.candidates.len();
        info!(
            "starting {} search: candidates={} concurrency={} chunk_size={} timeout={:?}",
            self.strategy, total, self.concurrency, self.chunk_size, self.timeout
        );

        match self.strategy {
            Strategy::Sequential => {
                let whole = Chunk { id: 0, start: 0, len: total };
                self.run_phase("sequential", vec![whole], 1, self.timeout);
            }
            Strategy::Parallel => {
                let chunks = build_chunks(0, 0, total, self.chunk_size);
                self.run_phase("parallel", chunks, self.concurrency, self.timeout);
            }
            Strategy::Hybrid => self.run_hybrid(total),
        }

        self.finish()
    }

    fn run_hybrid(&mut self, total: usize) {
        let prefix = self.priority_prefix.min(total);
        let deadline = deadline_after(self.timeout);
        let mut next_id = 0;

        if prefix > 0 {
            let priority = Chunk { id: 0, start: 0, len: prefix };
            self.run_phase("priority", vec![priority], 1, self.timeout);
            next_id = 1;
        }
        if prefix == total || self.ctx.state.should_stop() {
            return;
        }

        let chunks = build_chunks(next_id, prefix, total - prefix, self.chunk_size);
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            info!("no time left for the parallel phase");
            self.aggregator.add_chunks(chunks.len());
            for chunk in &chunks {
                self.aggregator.abandon(chunk, Duration::ZERO);
            }
            return;
        }
        self.run_phase("parallel", chunks, self.concurrency, remaining);
    }

    /// Run `chunks` on a fresh pool and wait for them within `budget`.
    fn run_phase(&mut self, label: &str, chunks: Vec<Chunk>, pool_size: usize, budget: Duration) {
        if chunks.is_empty() {
            return;
        }
        let pool = pool_size.min(chunks.len()).max(1);
        info!(
            "{label} phase: chunks={} workers={} budget={:?}",
            chunks.len(),
            pool,
            budget
        );
        self.aggregator.add_chunks(chunks.len());

        let (job_tx, job_rx) = bounded::<ChunkJob>(chunks.len());
        let channel_cap = pool
            .saturating_mul(CHANNEL_CAPACITY_MULTIPLIER)
            .max(MIN_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = bounded::<SearchEvent>(channel_cap);

        for chunk in &chunks {
            if let Err(err) = job_tx.send(ChunkJob { chunk: *chunk }) {
                warn!("job channel closed while queueing chunk {}: {err}", chunk.id);
            }
        }
        drop(job_tx);

        let handles =
            workers::spawn_search_workers(pool, Arc::clone(&self.ctx), job_rx, event_tx);

        let abandoned = self.await_units(&chunks, &event_rx, budget);
        if abandoned == 0 {
            for handle in handles {
                let _ = handle.join();
            }
        } else {
            // Abandoned workers are detached; they stop once the run halts.
            info!("{label} phase left {abandoned} chunk(s) running past the budget");
        }
    }

    /// Wait on each unit in order for at most its share of `budget`.
    ///
    /// Returns the number of units abandoned.
    fn await_units(
        &mut self,
        chunks: &[Chunk],
        events: &Receiver<SearchEvent>,
        budget: Duration,
    ) -> usize {
        let units = u32::try_from(chunks.len().max(1)).unwrap_or(u32::MAX);
        let share = budget / units;
        let mut abandoned = 0;

        for chunk in chunks {
            let unit_deadline = deadline_after(share);
            while !self.aggregator.is_finished(chunk.id) {
                let wake = match self.aggregator.next_progress_at() {
                    Some(at) => at.min(unit_deadline),
                    None => unit_deadline,
                };
                let wait = wake.saturating_duration_since(Instant::now());
                match events.recv_timeout(wait) {
                    Ok(event) => self.aggregator.apply(event),
                    Err(RecvTimeoutError::Timeout) => {
                        self.aggregator.maybe_report_progress();
                        if Instant::now() >= unit_deadline {
                            self.aggregator.abandon(chunk, share);
                            abandoned += 1;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => self.aggregator.lost(chunk),
                }
            }
        }

        // Events already queued by finished workers still count.
        while let Ok(event) = events.try_recv() {
            self.aggregator.apply(event);
        }
        abandoned
    }

    fn finish(self) -> SearchOutcome {
        let state = &self.ctx.state;
        state.halt();

        let password = state.found_password().map(str::to_string);
        let cancelled = state.is_cancelled();
        if cancelled {
            info!("cancellation requested; search stopped early");
        }
        let stats = self.aggregator.finish(password.as_deref(), cancelled);
        let elapsed = self.started.elapsed();

        info!(
            "run_summary strategy={} success={} attempts={} errors={} chunks_completed={}/{} abandoned={} elapsed={:.3}s",
            stats.strategy,
            stats.success,
            stats.attempts,
            stats.errors.len(),
            stats.chunks_completed,
            stats.chunks_total,
            stats.chunks_abandoned,
            elapsed.as_secs_f64()
        );

        SearchOutcome {
            password,
            elapsed,
            stats,
        }
    }
}
