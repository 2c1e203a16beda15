//! Entry point pulling in `tests/property/*.rs` as submodules. Integration
//! tests living in a subdirectory of `tests/` are otherwise invisible to
//! `cargo test` unless something under `tests/` itself declares them.

#[path = "property/scheduler.rs"]
mod scheduler;
