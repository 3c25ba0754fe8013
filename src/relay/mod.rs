//! The Relay engine (spec §4.7, §6.3): cross-network channel linking via
//! puppet clones, gated by CLAIM/LINKACL, persisted in [`db::RelayDb`].
//! Orchestration lives in [`engine::RelayEngine`]; the CLAIM/LINKACL/
//! MODEDELTA/nick-tag/kill-authority decisions it makes are pure functions
//! in [`policy`], kept separate so they're directly testable without any
//! network I/O. [`commands`] wires the bot-facing command table.

mod commands;
mod db;
mod engine;
mod policy;

pub use db::{RelayChannelEntry, RelayDb, RelayDbData};
pub use engine::RelayEngine;
