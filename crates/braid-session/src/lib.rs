//! Git-like branching for a prompt/response conversation log.
//!
//! Every turn records the turn it continues from, a single head pointer names
//! the active turn, and conversations are reconstructed by walking parent
//! links from the head back to a root. The SQLite turn store, graph engine,
//! head controller and write path live here; presentation lives in the
//! `braid` binary.

mod error;
mod graph;
mod head;
mod migrations;
mod recorder;
mod sqlite;
mod store;
mod types;

pub use error::{BraidError, BraidResult};
pub use graph::{reconstruct_chain, ConversationGraph};
pub use head::{HeadController, HeadOverride, HeadState};
pub use recorder::TurnRecorder;
pub use sqlite::SqliteTurnStore;
pub use store::TurnStore;
pub use types::{
    BackfillReport, Conversation, ConversationSort, ConversationSummary, LoadedConversation,
    NewTurn, Turn,
};
