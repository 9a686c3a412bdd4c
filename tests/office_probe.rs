mod common;

use std::sync::Arc;
use std::time::Duration;

use docunlock::document::Document;
use docunlock::pipeline::{self, Strategy};
use docunlock::probe::{DecryptionProbe, OfficeProbe, ProbeError, ProbeOutcome};

use common::{ZIP_HEADER, agile_document, options, standard_document, words};

#[test]
fn agile_session_accepts_only_the_right_password() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = agile_document(dir.path(), "Correct Horse", ZIP_HEADER);
    let document = Document::open(&path).expect("document");

    let mut session = OfficeProbe::new(true)
        .open_session(&document)
        .expect("session");
    assert_eq!(
        session.try_password("Correct Horse").expect("probe"),
        ProbeOutcome::Match
    );
    assert_eq!(
        session.try_password("correct horse").expect("probe"),
        ProbeOutcome::NoMatch
    );
    assert_eq!(session.try_password("x").expect("probe"), ProbeOutcome::NoMatch);
}

#[test]
fn standard_session_accepts_only_the_right_password() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = standard_document(dir.path(), "pässwörd", ZIP_HEADER);
    let document = Document::open(&path).expect("document");

    let mut session = OfficeProbe::new(true)
        .open_session(&document)
        .expect("session");
    assert_eq!(session.try_password("pässwörd").expect("probe"), ProbeOutcome::Match);
    assert_eq!(session.try_password("passwort").expect("probe"), ProbeOutcome::NoMatch);
}

#[test]
fn crack_recovers_an_agile_password_in_parallel() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = agile_document(dir.path(), "letmein", ZIP_HEADER);
    let document = Document::open(&path).expect("document");
    let candidates = words(&["123456", "password", "qwerty", "letmein", "dragon", "monkey"]);

    let outcome = pipeline::crack(
        &document,
        candidates,
        Arc::new(OfficeProbe::new(true)),
        options(Strategy::Parallel, 3, 2, Duration::from_secs(60)),
    )
    .expect("crack");

    assert_eq!(outcome.password.as_deref(), Some("letmein"));
    assert!(outcome.stats.errors.is_empty(), "{:?}", outcome.stats.errors);
}

#[test]
fn crack_recovers_a_standard_password_sequentially() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = standard_document(dir.path(), "summer2024", ZIP_HEADER);
    let document = Document::open(&path).expect("document");

    let outcome = pipeline::crack(
        &document,
        words(&["winter2024", "summer2024", "autumn2024"]),
        Arc::new(OfficeProbe::new(true)),
        options(Strategy::Sequential, 1, 10, Duration::from_secs(60)),
    )
    .expect("crack");

    assert_eq!(outcome.password.as_deref(), Some("summer2024"));
    assert_eq!(outcome.stats.attempts, 2);
}

#[test]
fn verifier_match_without_zip_payload_is_a_probe_error_when_verifying() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = agile_document(dir.path(), "letmein", b"not a zip archive at all");
    let document = Document::open(&path).expect("document");

    let mut session = OfficeProbe::new(true)
        .open_session(&document)
        .expect("session");
    assert!(matches!(
        session.try_password("letmein"),
        Err(ProbeError::Verification(_))
    ));

    let outcome = pipeline::crack(
        &document,
        words(&["nope", "letmein"]),
        Arc::new(OfficeProbe::new(true)),
        options(Strategy::Sequential, 1, 10, Duration::from_secs(60)),
    )
    .expect("crack");
    assert_eq!(outcome.password, None);
    assert_eq!(outcome.stats.attempts, 2);
    assert_eq!(outcome.stats.errors.len(), 1);
    assert!(outcome.stats.errors[0].contains("verification failed"));

    let unverified = pipeline::crack(
        &document,
        words(&["nope", "letmein"]),
        Arc::new(OfficeProbe::new(false)),
        options(Strategy::Sequential, 1, 10, Duration::from_secs(60)),
    )
    .expect("crack");
    assert_eq!(unverified.password.as_deref(), Some("letmein"));
}
