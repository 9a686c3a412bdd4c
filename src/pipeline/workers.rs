//! # Search Workers
//!
//! Pool threads pull chunk jobs and probe candidates in chunk order. All
//! results leave the worker as [`SearchEvent`]s.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::document::Document;
use crate::probe::{DecryptionProbe, ProbeError, ProbeOutcome};

use super::events::SearchEvent;
use super::state::SharedSearchState;

/// Job containing one chunk to probe
pub struct ChunkJob {
    pub chunk: Chunk,
}

/// Everything a worker reads while probing. Nothing here is mutated.
pub struct WorkerContext {
    pub document: Document,
    pub probe: Arc<dyn DecryptionProbe>,
    pub candidates: Arc<[String]>,
    pub state: Arc<SharedSearchState>,
}

/// Spawn the chunk worker pool
pub fn spawn_search_workers(
    workers: usize,
    ctx: Arc<WorkerContext>,
    rx: Receiver<ChunkJob>,
    events: Sender<SearchEvent>,
) -> Vec<thread::JoinHandle<()>> {
    let mut handles = Vec::new();
    let worker_count = workers.max(1);

    for _ in 0..worker_count {
        let ctx = Arc::clone(&ctx);
        let rx = rx.clone();
        let events = events.clone();

        handles.push(thread::spawn(move || {
            for job in rx {
                run_chunk(&ctx, job.chunk, &events);
            }
        }));
    }

    handles
}

/// Probe one chunk and report it finished exactly once.
///
/// A panic inside one candidate's probe is a `ProbeFailed` for that
/// candidate and probing moves on. Session open failures and panics outside
/// the probe call become a `WorkerFault`. Either way the chunk is reported
/// finished so the orchestrator never waits on it.
pub fn run_chunk(ctx: &WorkerContext, chunk: Chunk, events: &Sender<SearchEvent>) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| probe_chunk(ctx, chunk, events)));
    let fault = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(format!("could not open probe session: {err}")),
        Err(payload) => Some(format!("worker panicked: {}", panic_message(payload.as_ref()))),
    };
    if let Some(message) = fault {
        // Send failures mean the run already returned.
        let _ = events.send(SearchEvent::WorkerFault {
            chunk_id: chunk.id,
            message,
        });
    }
    let _ = events.send(SearchEvent::ChunkFinished { chunk_id: chunk.id });
}

fn probe_chunk(
    ctx: &WorkerContext,
    chunk: Chunk,
    events: &Sender<SearchEvent>,
) -> Result<(), ProbeError> {
    if ctx.state.should_stop() {
        debug!(chunk_id = chunk.id, "search already stopped; skipping chunk");
        return Ok(());
    }
    let mut session = ctx.probe.open_session(&ctx.document)?;

    for index in chunk.range() {
        if ctx.state.should_stop() {
            break;
        }
        let Some(candidate) = ctx.candidates.get(index) else {
            break;
        };
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| session.try_password(candidate)));
        let event = match attempt {
            Ok(Ok(ProbeOutcome::Match)) => {
                let recorded = ctx.state.try_record_match(candidate);
                if recorded {
                    info!(chunk_id = chunk.id, index, "password found");
                }
                let _ = events.send(SearchEvent::Matched {
                    chunk_id: chunk.id,
                    index,
                    recorded,
                });
                break;
            }
            Ok(Ok(ProbeOutcome::NoMatch)) => SearchEvent::Probed { chunk_id: chunk.id },
            Ok(Err(err)) => SearchEvent::ProbeFailed {
                chunk_id: chunk.id,
                index,
                message: err.to_string(),
            },
            Err(payload) => SearchEvent::ProbeFailed {
                chunk_id: chunk.id,
                index,
                message: format!(
                    "panicked while checking candidate: {}",
                    panic_message(payload.as_ref())
                ),
            },
        };
        if events.send(event).is_err() {
            warn!(chunk_id = chunk.id, "event channel closed; stopping chunk");
            break;
        }
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
