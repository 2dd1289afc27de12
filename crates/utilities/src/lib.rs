#![deny(
    rust_2018_compatibility,
    rust_2018_idioms,
    nonstandard_style,
    unused,
    future_incompatible
)]
#![warn(clippy::doc_markdown)]

//! Shared helpers for the tests and benches of the workspace.

pub mod data_sets;
pub mod raw;

pub use raw::write_raw_samples;
