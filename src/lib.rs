//! # StudyBuddy
//!
//! Study-material retrieval and spaced-repetition review for learners.
//!
//! StudyBuddy indexes uploaded notes and textbooks into overlapping chunks
//! with one embedding each, answers "what in my material is relevant to
//! this question" with a similarity search that degrades to keyword
//! matching, and schedules flashcard reviews with SM-2.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  Upload  │──▶│ Chunk → Embed    │──▶│    SQLite     │
//! │ txt/pdf  │   │ (retry, mock fb) │   │ chunks + vecs │
//! └──────────┘   └──────────────────┘   └──────┬───────┘
//!                                              │
//!                      ┌───────────────────────┤
//!                      ▼                       ▼
//!               ┌────────────┐          ┌────────────┐
//!               │  Retrieval │          │  SM-2 cards │
//!               │ vec / kw   │          │   (CAS)     │
//!               └────────────┘          └────────────┘
//! ```
//!
//! The algorithms live in `studybuddy-core`; this crate supplies the
//! configuration, SQLite store, HTTP embedding provider, and the `sb` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core store traits |
//! | [`embedding`] | OpenAI provider, retry, and fallback |
//! | [`extract`] | Text extraction from uploads |
//! | [`ingest`] | Index, list, and delete documents |
//! | [`search`] | Retrieval command |
//! | [`review`] | Flashcard commands |

pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod review;
pub mod search;
pub mod sqlite_store;

pub use studybuddy_core::{models, retrieval, scheduler, store};
