//! # notify-core
//!
//! Delivery pipeline behind the `notify-hook` binary: Claude Code hook events
//! become webhook notifications (Slack, Discord, Telegram, Lark, or a generic
//! JSON/text POST).
//!
//! ## Design Principles
//!
//! - **One process per event**: every hook invocation is short-lived. State
//!   that must survive between invocations lives in small files in the temp
//!   directory; everything else (rate limiter, breaker, metrics) is process-local.
//! - **Files for cross-process exclusion**: [`dedup`] lock files created with
//!   create-exclusive semantics, reclaimed by age when a holder crashes.
//! - **Never fail the editor**: delivery errors come back as a
//!   [`notifier::Outcome`]; only local storage errors are `Err`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use notify_core::{load_config, resolve_config_path, Notifier, NotifyRequest, Sender, Status};
//!
//! let config = load_config(&resolve_config_path(None)?)?;
//! let notifier = Notifier::new(config.clone(), Sender::new(&config)?);
//! let outcome = notifier.notify(&NotifyRequest {
//!     session_id: "abc".into(),
//!     status: Status::TaskComplete,
//!     message: "Refactor finished".into(),
//!     ..Default::default()
//! }).await?;
//! ```

pub mod config;
pub mod dedup;
pub mod error;
mod files;
pub mod notifier;
pub mod state;
pub mod types;
pub mod webhook;

pub use config::{load_config, resolve_config_path, Config, WebhookConfig};
pub use dedup::DedupManager;
pub use error::{NotifyError, Result};
pub use notifier::{Notifier, NotifyRequest, Outcome, SuppressReason};
pub use state::{SessionState, StateManager};
pub use types::{Status, StatusInfo};
pub use webhook::{Sender, WebhookError};
