//! Cross-stage tests: end-to-end scenarios and pipeline-wide properties.

pub mod support;

mod properties;
