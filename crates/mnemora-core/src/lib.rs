//! # Mnemora Core
//!
//! Pure stream reconciliation logic for the Mnemora client: wire event
//! types, the incremental frame decoder, and the reducers that fold decoded
//! events into client state.
//!
//! This crate performs no I/O and depends on no async runtime. Transport,
//! timers, persistence and the shared state container live in the `mnemora`
//! application crate.
//!
//! ```text
//! bytes ──▶ frame::FrameDecoder<T> ──▶ T ──▶ indexing::IndexingState::apply
//!                                         └─▶ chat::ChatReducer::apply
//!                                         └─▶ pull::PullProgress::apply
//! /health ──▶ connectivity::ConnectivityState
//! ```

pub mod chat;
pub mod connectivity;
pub mod events;
pub mod frame;
pub mod indexing;
pub mod models;
pub mod pull;
