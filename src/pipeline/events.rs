//! # Search Events
//!
//! Messages workers send to the aggregator. Workers never touch the run
//! statistics directly; every counter and error flows through here.

/// Events sent from workers to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    /// A candidate was probed and did not match
    Probed { chunk_id: usize },
    /// A candidate matched; `recorded` is false when another worker won the result cell first
    Matched {
        chunk_id: usize,
        index: usize,
        recorded: bool,
    },
    /// The probe failed for one candidate; the candidate counts as non-matching
    ProbeFailed {
        chunk_id: usize,
        index: usize,
        message: String,
    },
    /// The worker could not process its chunk
    WorkerFault { chunk_id: usize, message: String },
    /// The worker is done with its chunk, for whatever reason
    ChunkFinished { chunk_id: usize },
}
