//! End-to-end tests for the question pipeline.

mod retrieval_coverage;
mod support;
