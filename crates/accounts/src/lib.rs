//! Account and message persistence.
//!
//! The only code allowed to touch OAuth secrets and connection status.
//! `AccountStore` owns the credential lifecycle and the status state
//! machine; `MessageStore` owns the mirrored inbox with its
//! (account, platform-message-id) dedupe key.

pub mod model;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;

pub use {
    model::{
        Account, AccountStatus, FailureDisposition, NewConnection, NewMessage, StoredMessage,
        SyncOutcome,
    },
    store::{AccountStore, MessageStore},
    store_memory::{MemoryAccountStore, MemoryMessageStore},
    store_sqlite::{SqliteAccountStore, SqliteMessageStore, init_schema},
};

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
