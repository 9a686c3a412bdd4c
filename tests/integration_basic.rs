mod common;

use std::fs;
use std::sync::Arc;

use docunlock::candidates::{CandidateSource, WordlistFile};
use docunlock::config;
use docunlock::document::{self, Document};
use docunlock::pipeline::{self, SearchOptions, Strategy};
use docunlock::probe::OfficeProbe;
use docunlock::report::{self, ReportOptions, RunReport};

use common::{ZIP_HEADER, agile_document};

#[test]
fn wordlist_to_report_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc_path = agile_document(dir.path(), "Tr0ub4dor&3", ZIP_HEADER);
    let wordlist_path = dir.path().join("words.txt");
    let mut wordlist = b"password\r\n\nqwerty\n  Tr0ub4dor&3  \n".to_vec();
    wordlist.extend_from_slice(b"caf\xe9\n");
    fs::write(&wordlist_path, wordlist).expect("write wordlist");

    let loaded = config::load_config(None).expect("config");
    let mut cfg = loaded.config;
    cfg.run_id = "integration".to_string();
    cfg.mode = Strategy::Hybrid;
    cfg.priority_prefix = 2;
    cfg.chunk_size = 1;

    let document = Document::open(&doc_path).expect("document");
    let candidates = WordlistFile::new(&wordlist_path).load().expect("wordlist");
    assert_eq!(candidates, vec!["password", "qwerty", "Tr0ub4dor&3", "café"]);

    let mut opts = SearchOptions::new(cfg.mode);
    opts.concurrency = cfg.threads;
    opts.chunk_size = cfg.chunk_size;
    opts.timeout = cfg.timeout();
    opts.priority_prefix = cfg.priority_prefix;

    let outcome = pipeline::crack(
        &document,
        candidates,
        Arc::new(OfficeProbe::new(cfg.verify_output)),
        opts,
    )
    .expect("crack");
    assert_eq!(outcome.password.as_deref(), Some("Tr0ub4dor&3"));
    assert!(outcome.stats.attempts >= 3);

    let report_path = dir.path().join("out").join("report.json");
    let run_report = RunReport {
        run_id: cfg.run_id.clone(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        config_hash: loaded.config_hash.clone(),
        document_path: doc_path.display().to_string(),
        document_sha256: document::compute_sha256(&document, 4096).expect("sha256"),
        wordlist_path: wordlist_path.display().to_string(),
        options: ReportOptions {
            strategy: cfg.mode,
            concurrency: cfg.threads,
            chunk_size: cfg.chunk_size,
            timeout_secs: cfg.timeout_secs,
            priority_prefix: cfg.priority_prefix,
            verify_output: cfg.verify_output,
        },
        elapsed_seconds: outcome.elapsed.as_secs_f64(),
        stats: outcome.stats,
    };
    report::write_report(&report_path, &run_report).expect("report");

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).expect("read report"))
            .expect("json");
    assert_eq!(value["stats"]["found_password"], "Tr0ub4dor&3");
    assert_eq!(value["stats"]["strategy"], "hybrid");
    assert_eq!(value["config_hash"], loaded.config_hash);
    assert_eq!(value["document_sha256"].as_str().map(str::len), Some(64));
}
