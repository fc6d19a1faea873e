//! Wire protocol for the streaming transport.
//!
//! Snapshot-then-incremental: a client first receives the full current
//! state, then only revision-tagged mutations. A client that detects a gap
//! asks for a fresh snapshot instead of attempting delta repair.

use runboard_core::store::{Mutation, Snapshot};
use serde::{Deserialize, Serialize};

/// Messages pushed from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full current state; always the first message, and resent on resync
    Snapshot(Snapshot),
    /// One store mutation, in revision order
    Mutation(Mutation),
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request a fresh snapshot (e.g. after detecting a revision gap)
    Resync,
}
