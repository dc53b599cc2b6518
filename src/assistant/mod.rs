//! Remote assistant definition, local cache and versioned sync.

pub mod cache;
pub mod config;
pub mod sync;

pub use cache::{AssistantCache, AssistantRecord, FileAssistantCache};
pub use config::AssistantConfig;
pub use sync::{sync_assistant, SyncOutcome, SyncState};
