use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{info, warn};

use docunlock::candidates::{CandidateSource, WordlistFile};
use docunlock::constants::{HASH_BUFFER_SIZE, MAX_CONCURRENCY, MIN_CONCURRENCY};
use docunlock::document::{self, Document};
use docunlock::pipeline::{
    self, ProgressConfig, ProgressReporter, ProgressSnapshot, SearchOptions,
};
use docunlock::probe::{DecryptionProbe, OfficeProbe};
use docunlock::report::{self, ReportOptions, RunReport};
use docunlock::{cli, config, logging};

/// Logs progress snapshots; rendering is left to log consumers.
struct LogProgress;

impl ProgressReporter for LogProgress {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        info!(
            "progress attempts={}/{} ({:.1}%) errors={} chunks={}/{} rate={:.1}/s elapsed={:.1}s",
            snapshot.attempts,
            snapshot.total_candidates,
            snapshot.completion_pct,
            snapshot.errors,
            snapshot.chunks_completed,
            snapshot.chunks_total,
            snapshot.rate,
            snapshot.elapsed_seconds
        );
    }
}

fn main() -> Result<()> {
    let cli_opts = cli::parse();
    logging::init_logging(cli_opts.log_json);

    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let mut cfg = loaded.config;
    if let Some(mode) = cli_opts.mode {
        cfg.mode = mode.into();
    }
    if let Some(threads) = cli_opts.thread_count() {
        cfg.threads = threads;
    }
    if let Some(chunk_size) = cli_opts.chunk_size {
        cfg.chunk_size = usize::try_from(chunk_size).unwrap_or(usize::MAX);
    }
    if let Some(timeout) = cli_opts.timeout {
        cfg.timeout_secs = timeout;
    }
    if cli_opts.no_verify {
        cfg.verify_output = false;
    }
    cfg.validate()?;

    let tool_version = env!("CARGO_PKG_VERSION");
    info!(
        "starting run_id={} document={} wordlist={} mode={} threads={}",
        cfg.run_id,
        cli_opts.document.display(),
        cli_opts.wordlist.display(),
        cfg.mode,
        cfg.threads
    );

    let document = Document::open(&cli_opts.document)
        .with_context(|| format!("opening document {}", cli_opts.document.display()))?;
    let candidates = WordlistFile::new(&cli_opts.wordlist)
        .load()
        .with_context(|| format!("loading wordlist {}", cli_opts.wordlist.display()))?;
    info!("loaded {} candidate passwords", candidates.len());

    let probe = OfficeProbe::new(cfg.verify_output);
    probe
        .open_session(&document)
        .with_context(|| format!("{} is not a supported encrypted document", document.path().display()))?;
    let probe: Arc<dyn DecryptionProbe> = Arc::new(probe);

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        if let Err(err) = ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed)) {
            warn!("could not install Ctrl+C handler: {err}");
        }
    }

    let options = SearchOptions {
        strategy: cfg.mode,
        concurrency: cfg.threads,
        chunk_size: cfg.chunk_size,
        timeout: cfg.timeout(),
        priority_prefix: cfg.priority_prefix,
        progress: Some(ProgressConfig {
            reporter: Arc::new(LogProgress),
            interval: cfg.progress_interval(),
        }),
    };
    let outcome = pipeline::crack_with_cancel(&document, candidates, probe, options, cancel)?;

    match &outcome.password {
        Some(password) => println!("Password found: {password}"),
        None => println!("Password not found"),
    }
    println!(
        "Attempts: {} in {:.2}s ({:.1}/s)",
        outcome.stats.attempts,
        outcome.elapsed.as_secs_f64(),
        outcome.stats.attempts_per_second()
    );
    if outcome.password.is_none() {
        for err in &outcome.stats.errors {
            println!("  error: {err}");
        }
    }

    if let Some(path) = &cli_opts.report {
        info!("computing document sha256 for report");
        let document_sha256 = document::compute_sha256(&document, HASH_BUFFER_SIZE)?;
        let run_report = RunReport {
            run_id: cfg.run_id.clone(),
            tool_version: tool_version.to_string(),
            config_hash: loaded.config_hash.clone(),
            document_path: document.path().to_string_lossy().to_string(),
            document_sha256,
            wordlist_path: cli_opts.wordlist.to_string_lossy().to_string(),
            options: ReportOptions {
                strategy: cfg.mode,
                concurrency: cfg.threads.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
                chunk_size: cfg.chunk_size,
                timeout_secs: cfg.timeout_secs,
                priority_prefix: cfg.priority_prefix,
                verify_output: cfg.verify_output,
            },
            elapsed_seconds: outcome.elapsed.as_secs_f64(),
            stats: outcome.stats,
        };
        report::write_report(path, &run_report)
            .with_context(|| format!("writing report {}", path.display()))?;
        info!("report written to {}", path.display());
    }

    info!("docunlock run finished");
    Ok(())
}
