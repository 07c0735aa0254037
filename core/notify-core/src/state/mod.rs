//! Per-session notification state.
//!
//! Each session gets one JSON record in the temp directory. Hook processes
//! read it to decide whether a notification would be redundant (cooldowns,
//! repeated messages) and write it back after delivering.
//!
//! ```text
//! hook process → StateManager::load → policy check → send → StateManager::update_*
//! ```
//!
//! Updates are read-modify-write of the whole record and are NOT atomic across
//! processes: two concurrent writers race and the later write wins. Hook
//! invocations for one session are short and mostly sequential, so this is
//! acceptable; [`crate::dedup`] is what serializes actual deliveries.
//!
//! # Module Structure
//!
//! - [`store`]: [`StateManager`], file persistence and suppression policy
//! - [`types`]: the on-disk [`SessionState`] record

mod store;
pub(crate) mod types;

pub use store::{normalize_message, StateManager};
pub use types::SessionState;
