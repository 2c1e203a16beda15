// src/logging.rs

//! Tracing helpers.
//!
//! This crate is a library, not the CLI binary the teacher wraps: it never
//! installs a global subscriber itself. `debug!`/`info!`/`warn!` calls
//! scattered through the scheduler, broker and executor are no-ops unless
//! the embedding application installs one. The only subscriber construction
//! that ships here is the test-only helper below, mirrored by
//! `dagwork_test_utils::init_tracing`.

#[cfg(test)]
pub fn init_tracing_for_tests() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
