//! The synchronization scheduler: timer loop, batched fan-out, per-account
//! outcome bookkeeping.

use std::{sync::Arc, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::Serialize,
    tokio::{
        sync::{Mutex, RwLock},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    omnibox_accounts::{
        Account, AccountStore, FailureDisposition, MessageStore, NewMessage, SyncOutcome,
    },
    omnibox_connectors::{ConnectorError, ConnectorRegistry, Platform, SyncTarget},
};

/// Accounts synced concurrently within one batch.
const BATCH_SIZE: usize = 5;

/// Pause between batches, to stay polite with third-party rate limits.
const INTER_BATCH_DELAY: Duration = Duration::from_secs(2);

/// Upper bound on one account's fetch; a hung call fails that account only.
const ACCOUNT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// One account's outcome for one sync attempt. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub account_id: String,
    pub platform: Platform,
    pub success: bool,
    pub new_messages: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Scheduler observability snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    pub connected_accounts: usize,
    pub last_pass_at_ms: Option<i64>,
}

/// Periodic, failure-isolated message sync across all connected accounts.
///
/// Owned by the process entry point: constructed once, started once,
/// stopped during shutdown. No process-global state.
pub struct SyncService {
    accounts: Arc<dyn AccountStore>,
    messages: Arc<dyn MessageStore>,
    registry: Arc<ConnectorRegistry>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: Mutex<Option<CancellationToken>>,
    running: RwLock<bool>,
    last_pass_at_ms: RwLock<Option<i64>>,
}

impl SyncService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        messages: Arc<dyn MessageStore>,
        registry: Arc<ConnectorRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            accounts,
            messages,
            registry,
            timer_handle: Mutex::new(None),
            cancel: Mutex::new(None),
            running: RwLock::new(false),
            last_pass_at_ms: RwLock::new(None),
        })
    }

    /// Start the timer: one immediate pass, then one every `interval`.
    /// Idempotent: a second call while running logs and returns.
    pub async fn start(self: &Arc<Self>, interval: Duration) {
        {
            let mut running = self.running.write().await;
            if *running {
                info!("sync scheduler already running");
                return;
            }
            *running = true;
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock().await = Some(cancel.clone());

        let svc = Arc::clone(self);
        let handle = tokio::spawn(async move {
            svc.timer_loop(interval, cancel).await;
        });
        *self.timer_handle.lock().await = Some(handle);
        info!(interval_secs = interval.as_secs(), "sync scheduler started");
    }

    /// Stop the timer. Idempotent; safe to call while a pass is in flight:
    /// the pass observes cancellation between batches, so per-account
    /// bookkeeping is never interrupted mid-account.
    pub async fn stop(&self) {
        {
            let mut running = self.running.write().await;
            if !*running {
                info!("sync scheduler is not running");
                return;
            }
            *running = false;
        }

        if let Some(cancel) = self.cancel.lock().await.take() {
            cancel.cancel();
        }
        // Detach rather than abort: the in-flight batch finishes cleanly.
        self.timer_handle.lock().await.take();
        info!("sync scheduler stopped");
    }

    pub async fn status(&self) -> anyhow::Result<SyncStatus> {
        let connected = self.accounts.list_connected(None).await?.len();
        Ok(SyncStatus {
            running: *self.running.read().await,
            connected_accounts: connected,
            last_pass_at_ms: *self.last_pass_at_ms.read().await,
        })
    }

    /// One full pass over every connected account, batched and throttled.
    /// A per-account failure becomes a failed `SyncResult`; it never stops
    /// the remaining accounts or batches.
    pub async fn sync_all(&self) -> Vec<SyncResult> {
        let accounts = match self.accounts.list_connected(None).await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(error = %e, "failed to list connected accounts");
                return Vec::new();
            },
        };

        if accounts.is_empty() {
            debug!("no connected accounts to sync");
            *self.last_pass_at_ms.write().await = Some(now_ms());
            return Vec::new();
        }

        info!(count = accounts.len(), "starting sync pass");
        let cancel = self.cancel.lock().await.clone();

        let total_batches = accounts.len().div_ceil(BATCH_SIZE);
        let mut results = Vec::with_capacity(accounts.len());

        for (index, batch) in accounts.chunks(BATCH_SIZE).enumerate() {
            debug!(batch = index + 1, total_batches, "processing sync batch");
            let batch_results =
                futures::future::join_all(batch.iter().map(|a| self.sync_account(a))).await;
            results.extend(batch_results);

            if index + 1 < total_batches {
                match &cancel {
                    Some(token) => {
                        tokio::select! {
                            () = tokio::time::sleep(INTER_BATCH_DELAY) => {},
                            () = token.cancelled() => {
                                info!("sync pass stopping early: shutdown requested");
                                break;
                            },
                        }
                    },
                    None => tokio::time::sleep(INTER_BATCH_DELAY).await,
                }
            }
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let new_total: u32 = results.iter().map(|r| r.new_messages).sum();
        info!(
            succeeded,
            total = results.len(),
            new_messages = new_total,
            "sync pass complete"
        );
        *self.last_pass_at_ms.write().await = Some(now_ms());
        results
    }

    /// Sync every connected account on one platform (manual trigger path).
    pub async fn sync_by_platform(&self, platform: Platform) -> Vec<SyncResult> {
        let accounts = match self.accounts.list_connected_by_platform(platform).await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(%platform, error = %e, "failed to list accounts for platform");
                return Vec::new();
            },
        };

        info!(%platform, count = accounts.len(), "targeted platform sync");
        let mut results = Vec::with_capacity(accounts.len());
        for account in &accounts {
            results.push(self.sync_account(account).await);
        }
        results
    }

    /// Sync one account by id. `None` when the account does not exist.
    pub async fn sync_account_id(&self, account_id: &str) -> anyhow::Result<Option<SyncResult>> {
        let Some(account) = self.accounts.get(account_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.sync_account(&account).await))
    }

    /// Sync one account: refresh if due, fetch, upsert in order, record the
    /// outcome. `mark_sync_outcome` is called exactly once on every path.
    pub async fn sync_account(&self, account: &Account) -> SyncResult {
        debug!(
            account_id = %account.id,
            platform = %account.platform,
            username = %account.username,
            "syncing account"
        );

        let outcome = match self.try_sync(account).await {
            Ok(new_messages) => SyncOutcome::Success { new_messages },
            Err((disposition, error)) => {
                warn!(
                    account_id = %account.id,
                    platform = %account.platform,
                    %error,
                    "account sync failed"
                );
                SyncOutcome::Failure { disposition, error }
            },
        };

        // Message upserts above happen strictly before this status write:
        // last_synced_at is the read-side cursor for some connectors.
        self.accounts.mark_sync_outcome(&account.id, &outcome).await;

        match outcome {
            SyncOutcome::Success { new_messages } => SyncResult {
                account_id: account.id.clone(),
                platform: account.platform,
                success: true,
                new_messages,
                error: None,
            },
            SyncOutcome::Failure { error, .. } => SyncResult {
                account_id: account.id.clone(),
                platform: account.platform,
                success: false,
                new_messages: 0,
                error: Some(error),
            },
        }
    }

    async fn try_sync(
        &self,
        account: &Account,
    ) -> Result<u32, (FailureDisposition, String)> {
        let connector = self
            .registry
            .get(account.platform)
            .map_err(|e| (FailureDisposition::Transient, e.to_string()))?;

        let Some(token) = &account.access_token else {
            return Err((
                FailureDisposition::TokenExpired,
                "account holds no access token".into(),
            ));
        };
        let mut access_token = token.expose_secret().clone();

        if account.needs_refresh() {
            let Some(refresh) = &account.refresh_token else {
                return Err((
                    FailureDisposition::TokenExpired,
                    "token expired and no refresh token stored".into(),
                ));
            };
            let grant = connector
                .refresh_token(refresh.expose_secret())
                .await
                .map_err(|e| (disposition_of(&e), e.to_string()))?;
            access_token = grant.access_token.expose_secret().clone();
            if let Err(e) = self.accounts.update_tokens(&account.id, &grant).await {
                // Keep syncing with the in-memory token; the next pass
                // will retry the refresh.
                warn!(account_id = %account.id, error = %e, "failed to persist refreshed tokens");
            }
        }

        let target = SyncTarget {
            platform_id: account.platform_id.clone(),
            access_token: Secret::new(access_token),
            last_synced_at_ms: account.last_synced_at_ms,
        };

        let messages =
            match tokio::time::timeout(ACCOUNT_SYNC_TIMEOUT, connector.fetch_new_messages(&target))
                .await
            {
                Ok(Ok(messages)) => messages,
                Ok(Err(e)) => return Err((disposition_of(&e), e.to_string())),
                Err(_) => {
                    return Err((
                        FailureDisposition::Transient,
                        format!(
                            "message fetch timed out after {}s",
                            ACCOUNT_SYNC_TIMEOUT.as_secs()
                        ),
                    ));
                },
            };

        // Apply in the order the connector returned them.
        let mut new_messages = 0u32;
        for message in messages {
            let inserted = self
                .messages
                .upsert(NewMessage {
                    account_id: account.id.clone(),
                    platform_message_id: message.platform_message_id,
                    sender_id: message.sender_id,
                    sender_name: message.sender_name,
                    body: message.text,
                    received_at_ms: message.sent_at_ms,
                })
                .await
                .map_err(|e| {
                    (
                        FailureDisposition::Transient,
                        format!("message store write failed: {e}"),
                    )
                })?;
            if inserted {
                new_messages += 1;
            }
        }

        Ok(new_messages)
    }

    async fn timer_loop(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        loop {
            self.sync_all().await;

            tokio::select! {
                () = tokio::time::sleep(interval) => {},
                () = cancel.cancelled() => break,
            }
        }
        debug!("sync timer loop exited");
    }
}

fn disposition_of(error: &ConnectorError) -> FailureDisposition {
    if error.is_credential_failure() {
        FailureDisposition::TokenExpired
    } else {
        FailureDisposition::Transient
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
