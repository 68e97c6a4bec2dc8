//! Crate-level tests: shared mocks and end-to-end scenarios.

pub(crate) mod harness;
