//! # Persona Dedup
//!
//! Decide, pair by pair, whether two names in a spreadsheet refer to the
//! same real-world person, using a search-grounded language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │   Source    │──▶│ Orchestrator │──▶│  Results    │
//! │ xlsx/xls/csv│   │ row by row   │   │ table / CSV │
//! └─────────────┘   └──────┬───────┘   └─────────────┘
//!                          │
//!                   ┌──────▼───────┐
//!                   │  Processor   │  retry + backoff
//!                   └──────┬───────┘
//!                          │
//!                   ┌──────▼───────┐
//!                   │  Classifier  │  Gemini + google_search
//!                   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! dedup inspect people.xlsx
//! dedup analyze people.xlsx --output results.csv
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`source`] | Read name pairs from `.xlsx` / `.xls` / `.csv` |
//! | [`classifier`] | Gemini and disabled classifier backends |
//! | [`processor`] | Per-row retry loop |
//! | [`orchestrator`] | Sequential, paced batch runs |
//! | [`progress`] | Progress events and reporters |
//! | [`cancel`] | Ctrl+C cancellation |
//! | [`export`] | CSV export |
//! | [`display`] | Terminal results table |
//!
//! Domain types, the retry policy and verdict parsing live in
//! `persona-dedup-core`.

pub mod cancel;
pub mod classifier;
pub mod config;
pub mod display;
pub mod export;
pub mod orchestrator;
pub mod processor;
pub mod progress;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;
