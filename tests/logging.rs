//! Logging initialisation tests, kept in their own test binary because they
//! install a process-wide tracing subscriber.

use borealis::logging::init_tracing;
use borealis::BorealisError;

#[test]
fn test_rejects_unknown_level() {
    assert!(matches!(
        init_tracing("verbose", false),
        Err(BorealisError::Configuration(_))
    ));
}

#[test]
fn test_init_is_idempotent() {
    init_tracing("INFO", false).unwrap();
    init_tracing("debug", true).unwrap();
}
