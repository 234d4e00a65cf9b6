//! Message synchronization: the periodic scheduler that fans out per-account
//! fetches, and the webhook ingress that feeds the same upsert path.
//!
//! The central contract is failure isolation: one account's dead token,
//! hung request or platform exception produces one failed `SyncResult` and
//! never aborts the batch, the pass, or the timer loop.

pub mod ingress;
pub mod service;

#[cfg(test)]
mod testing;

pub use {
    ingress::{Ingested, WebhookIngress, WebhookRejection},
    service::{SyncResult, SyncService, SyncStatus},
};
