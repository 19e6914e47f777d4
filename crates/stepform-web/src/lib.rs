//! Server side of stepform: the dispatch table that keeps live steps under
//! tokens, the collaborators steps talk to (record stores, nonces and the
//! notification outbox), and the calendar and election applications.

#[cfg(feature = "axum")]
pub mod adapters;
pub mod apps;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod nonce;
pub mod outbox;
pub mod pages;
pub mod site;
pub mod store;

#[cfg(feature = "axum")]
pub use adapters::axum::{AxumStepformAdapter, USER_COOKIE, USER_HEADER};
pub use config::SiteConfig;
pub use dispatch::{DispatchTable, Dispatched};
pub use error::{ConfigError, DispatchError, NotifyError, StoreError};
pub use nonce::{NonceSource, RandomNonces, SequentialNonces, key_hash};
pub use outbox::{Delivery, FlushReport, LogNotifier, Message, Notifier, Outbox};
pub use site::{Outcome, Site};
pub use store::{MemoryStore, RecordStore};
