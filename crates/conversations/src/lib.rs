//! Durable conversation storage, caller identity, and user preferences.
//!
//! A conversation is one JSON file under the archive directory; writes go
//! through `spawn_blocking` and a `parking_lot` cache keeps hot records in
//! memory. Persistence is idempotent per turn: re-saving a conversation
//! replaces its file in full.

mod archive;
mod identity;
mod preferences;
mod record;

pub use archive::{ConversationSink, FileArchive};
pub use identity::Caller;
pub use preferences::PreferenceStore;
pub use record::{derive_title, ConversationRecord};
