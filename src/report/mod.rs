//! Report renderers for extracted source units.
//!
//! - [`terminal`]: colored unit table with a summary line; `--verbose` adds
//!   per-unit dependency tables, `--quiet` prints the summary only.
//!
//! JSON output is written directly by `main` with `serde_json`.

pub mod terminal;
