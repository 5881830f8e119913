//! # Mnemora
//!
//! Client core for a local-first "chat with your files" assistant. A local
//! backend indexes folders and answers questions with retrieval-augmented
//! generation; this crate talks to it, folds its streaming responses into
//! application state and keeps track of whether it is reachable.
//!
//! ## Architecture
//!
//! ```text
//!                ┌───────────────┐
//!   HTTP bytes ─▶│ FrameDecoder  │─▶ IndexEvent / QueryEvent / PullEvent
//!                └───────────────┘             │
//!                                              ▼
//! ┌──────────┐   ┌──────────────┐      ┌───────────────┐
//! │ Monitor  │──▶│   AppStore   │◀─────│   Reducers    │
//! │ /health  │   │ (watch chan) │      │ index / chat  │
//! └──────────┘   └──────┬───────┘      └───────────────┘
//!                       │ subscribe
//!                       ▼
//!               ┌────────────────┐
//!               │ CLI / renderer │
//!               └────────────────┘
//! ```
//!
//! The decoder and the reducers are pure and live in `mnemora-core`; this
//! crate adds the HTTP client, the async stream adapter, the store and the
//! drivers that connect them.
//!
//! ## Quick Start
//!
//! ```bash
//! mnemora status                    # backend and model runtime health
//! mnemora setup --pull llama3.2:3b  # download a missing model
//! mnemora index ~/Documents/notes   # index a folder
//! mnemora ask "what did I write about tokio?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`client`] | HTTP client for the backend |
//! | [`stream`] | Byte stream → decoded records, with cancellation |
//! | [`store`] | Application state and subscriptions |
//! | [`persist`] | Saved folders and preferences |
//! | [`indexing`] | Folder indexing and removal |
//! | [`chat`] | Sending a message and streaming the answer |
//! | [`setup`] | Setup status, models and model downloads |
//! | [`monitor`] | Background health polling |
//! | [`progress`] | Progress reporting on stderr |
//! | [`session`] | Client + store wiring for the CLI |

pub mod chat;
pub mod client;
pub mod config;
pub mod indexing;
pub mod monitor;
pub mod persist;
pub mod progress;
pub mod session;
pub mod setup;
pub mod store;
pub mod stream;
