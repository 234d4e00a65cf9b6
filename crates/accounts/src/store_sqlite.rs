use {
    anyhow::Result,
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    sqlx::SqlitePool,
    tracing::warn,
};

use {omnibox_connectors::Platform, omnibox_oauth::TokenGrant};

use crate::{
    model::{Account, AccountStatus, NewConnection, NewMessage, StoredMessage, SyncOutcome},
    now_ms,
    store::{AccountStore, MessageStore},
};

/// Create the accounts/messages schema. Called by the daemon at boot and
/// by tests against in-memory databases.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS accounts (
            id               TEXT    PRIMARY KEY,
            user_id          TEXT    NOT NULL,
            platform         TEXT    NOT NULL,
            platform_id      TEXT    NOT NULL,
            username         TEXT    NOT NULL,
            display_name     TEXT,
            avatar_url       TEXT,
            status           TEXT    NOT NULL DEFAULT 'connected',
            access_token     TEXT,
            refresh_token    TEXT,
            token_expires_at INTEGER,
            last_synced_at   INTEGER,
            last_activity_at INTEGER,
            created_at       INTEGER NOT NULL,
            updated_at       INTEGER NOT NULL,
            UNIQUE(user_id, platform, platform_id)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id          TEXT    NOT NULL,
            platform_message_id TEXT    NOT NULL,
            sender_id           TEXT    NOT NULL,
            sender_name         TEXT,
            body                TEXT    NOT NULL,
            received_at         INTEGER NOT NULL,
            created_at          INTEGER NOT NULL,
            UNIQUE(account_id, platform_message_id)
        )"#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    user_id: String,
    platform: String,
    platform_id: String,
    username: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    status: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expires_at: Option<i64>,
    last_synced_at: Option<i64>,
    last_activity_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(r: AccountRow) -> Result<Self> {
        Ok(Self {
            platform: r
                .platform
                .parse::<Platform>()
                .map_err(|e| anyhow::anyhow!("{e}"))?,
            status: AccountStatus::parse(&r.status)?,
            id: r.id,
            user_id: r.user_id,
            platform_id: r.platform_id,
            username: r.username,
            display_name: r.display_name,
            avatar_url: r.avatar_url,
            access_token: r.access_token.map(Secret::new),
            refresh_token: r.refresh_token.map(Secret::new),
            token_expires_at_ms: r.token_expires_at,
            last_synced_at_ms: r.last_synced_at,
            last_activity_at_ms: r.last_activity_at,
            created_at_ms: r.created_at,
            updated_at_ms: r.updated_at,
        })
    }
}

/// SQLite-backed account store.
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

impl SqliteAccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn list_connected(&self, user_id: Option<&str>) -> Result<Vec<Account>> {
        let rows = match user_id {
            Some(uid) => {
                sqlx::query_as::<_, AccountRow>(
                    "SELECT * FROM accounts WHERE status = 'connected' AND user_id = ? ORDER BY created_at",
                )
                .bind(uid)
                .fetch_all(&self.pool)
                .await?
            },
            None => {
                sqlx::query_as::<_, AccountRow>(
                    "SELECT * FROM accounts WHERE status = 'connected' ORDER BY created_at",
                )
                .fetch_all(&self.pool)
                .await?
            },
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_connected_by_platform(&self, platform: Platform) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM accounts WHERE status = 'connected' AND platform = ? ORDER BY created_at",
        )
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_needing_refresh(&self, user_id: &str) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"SELECT * FROM accounts
               WHERE user_id = ? AND status = 'connected'
                 AND token_expires_at IS NOT NULL AND token_expires_at < ?
               ORDER BY created_at"#,
        )
        .bind(user_id)
        .bind(now_ms())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM accounts WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get(&self, account_id: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_by_platform_identity(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM accounts WHERE platform = ? AND platform_id = ?",
        )
        .bind(platform.as_str())
        .bind(platform_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn upsert_from_oauth(&self, connection: NewConnection) -> Result<Account> {
        let now = now_ms();
        let profile = &connection.profile;
        let grant = &connection.grant;

        sqlx::query(
            r#"INSERT INTO accounts (
                 id, user_id, platform, platform_id, username, display_name, avatar_url,
                 status, access_token, refresh_token, token_expires_at,
                 last_activity_at, created_at, updated_at
               ) VALUES (?, ?, ?, ?, ?, ?, ?, 'connected', ?, ?, ?, ?, ?, ?)
               ON CONFLICT(user_id, platform, platform_id) DO UPDATE SET
                 username         = excluded.username,
                 display_name     = excluded.display_name,
                 avatar_url       = excluded.avatar_url,
                 status           = 'connected',
                 access_token     = excluded.access_token,
                 refresh_token    = excluded.refresh_token,
                 token_expires_at = excluded.token_expires_at,
                 last_activity_at = excluded.last_activity_at,
                 updated_at       = excluded.updated_at"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&connection.user_id)
        .bind(connection.platform.as_str())
        .bind(&profile.platform_id)
        .bind(&profile.username)
        .bind(&profile.display_name)
        .bind(&profile.avatar_url)
        .bind(grant.access_token.expose_secret())
        .bind(grant.refresh_token.as_ref().map(|t| t.expose_secret().clone()))
        .bind(grant.expires_at_ms)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM accounts WHERE user_id = ? AND platform = ? AND platform_id = ?",
        )
        .bind(&connection.user_id)
        .bind(connection.platform.as_str())
        .bind(&profile.platform_id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn update_tokens(&self, account_id: &str, grant: &TokenGrant) -> Result<()> {
        sqlx::query(
            r#"UPDATE accounts SET
                 access_token = ?, refresh_token = COALESCE(?, refresh_token),
                 token_expires_at = ?, status = 'connected', updated_at = ?
               WHERE id = ?"#,
        )
        .bind(grant.access_token.expose_secret())
        .bind(grant.refresh_token.as_ref().map(|t| t.expose_secret().clone()))
        .bind(grant.expires_at_ms)
        .bind(now_ms())
        .bind(account_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_sync_outcome(&self, account_id: &str, outcome: &SyncOutcome) {
        let now = now_ms();
        let result = match outcome {
            SyncOutcome::Success { .. } => {
                sqlx::query(
                    r#"UPDATE accounts SET
                         status = 'connected', last_synced_at = ?,
                         last_activity_at = ?, updated_at = ?
                       WHERE id = ?"#,
                )
                .bind(now)
                .bind(now)
                .bind(now)
                .bind(account_id)
                .execute(&self.pool)
                .await
            },
            SyncOutcome::Failure { .. } => {
                sqlx::query("UPDATE accounts SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(outcome.status().as_str())
                    .bind(now)
                    .bind(account_id)
                    .execute(&self.pool)
                    .await
            },
        };
        if let Err(e) = result {
            warn!(account_id, error = %e, "failed to record sync outcome");
        }
    }

    async fn delete(&self, account_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE account_id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    account_id: String,
    platform_message_id: String,
    sender_id: String,
    sender_name: Option<String>,
    body: String,
    received_at: i64,
    created_at: i64,
}

impl From<MessageRow> for StoredMessage {
    fn from(r: MessageRow) -> Self {
        Self {
            id: r.id,
            account_id: r.account_id,
            platform_message_id: r.platform_message_id,
            sender_id: r.sender_id,
            sender_name: r.sender_name,
            body: r.body,
            received_at_ms: r.received_at,
            created_at_ms: r.created_at,
        }
    }
}

/// SQLite-backed message mirror.
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn upsert(&self, message: NewMessage) -> Result<bool> {
        let result = sqlx::query(
            r#"INSERT INTO messages (
                 account_id, platform_message_id, sender_id, sender_name,
                 body, received_at, created_at
               ) VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(account_id, platform_message_id) DO NOTHING"#,
        )
        .bind(&message.account_id)
        .bind(&message.platform_message_id)
        .bind(&message.sender_id)
        .bind(&message.sender_name)
        .bind(&message.body)
        .bind(message.received_at_ms)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_for_account(&self, account_id: &str) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE account_id = ?")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    async fn list_recent(&self, account_id: &str, limit: u32) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE account_id = ? ORDER BY received_at DESC LIMIT ?",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, omnibox_connectors::Profile};

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    fn connection(user_id: &str, platform_id: &str, username: &str) -> NewConnection {
        NewConnection {
            user_id: user_id.into(),
            platform: Platform::Linkedin,
            profile: Profile {
                platform_id: platform_id.into(),
                username: username.into(),
                display_name: Some(username.to_uppercase()),
                avatar_url: None,
                bio: None,
                followers_count: None,
            },
            grant: TokenGrant::new("access".into(), Some("refresh".into()), Some(3600)),
        }
    }

    fn message(account_id: &str, mid: &str) -> NewMessage {
        NewMessage {
            account_id: account_id.into(),
            platform_message_id: mid.into(),
            sender_id: "sender".into(),
            sender_name: Some("Sender".into()),
            body: "hello".into(),
            received_at_ms: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_updates_in_place() {
        let pool = test_pool().await;
        let store = SqliteAccountStore::new(pool);

        let first = store
            .upsert_from_oauth(connection("u1", "pid-1", "old-name"))
            .await
            .unwrap();
        let second = store
            .upsert_from_oauth(connection("u1", "pid-1", "new-name"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id, "reconnecting must not duplicate");
        assert_eq!(second.username, "new-name", "latest profile data wins");

        let all = store.list_for_user("u1").await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn same_identity_different_users_are_distinct_rows() {
        let pool = test_pool().await;
        let store = SqliteAccountStore::new(pool);

        store.upsert_from_oauth(connection("u1", "pid-1", "a")).await.unwrap();
        store.upsert_from_oauth(connection("u2", "pid-1", "b")).await.unwrap();

        assert_eq!(store.list_connected(None).await.unwrap().len(), 2);
        assert_eq!(store.list_connected(Some("u1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_needing_refresh_filters_on_expiry() {
        let pool = test_pool().await;
        let store = SqliteAccountStore::new(pool);

        let fresh = NewConnection {
            grant: TokenGrant::new("a".into(), None, Some(3600)),
            ..connection("u1", "pid-fresh", "fresh")
        };
        let stale = NewConnection {
            grant: TokenGrant::new("a".into(), None, Some(-60)),
            ..connection("u1", "pid-stale", "stale")
        };
        store.upsert_from_oauth(fresh).await.unwrap();
        store.upsert_from_oauth(stale).await.unwrap();

        let needing = store.find_needing_refresh("u1").await.unwrap();
        assert_eq!(needing.len(), 1);
        assert_eq!(needing[0].platform_id, "pid-stale");
    }

    #[tokio::test]
    async fn sync_outcome_transitions_status() {
        let pool = test_pool().await;
        let store = SqliteAccountStore::new(pool);
        let account = store
            .upsert_from_oauth(connection("u1", "pid-1", "x"))
            .await
            .unwrap();

        store
            .mark_sync_outcome(&account.id, &SyncOutcome::Failure {
                disposition: crate::model::FailureDisposition::TokenExpired,
                error: "401".into(),
            })
            .await;
        let reloaded = store.get(&account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, AccountStatus::Expired);
        assert!(reloaded.last_synced_at_ms.is_none());

        store
            .mark_sync_outcome(&account.id, &SyncOutcome::Success { new_messages: 2 })
            .await;
        let reloaded = store.get(&account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, AccountStatus::Connected);
        assert!(reloaded.last_synced_at_ms.is_some());
    }

    #[tokio::test]
    async fn expired_accounts_are_excluded_from_connected_listing() {
        let pool = test_pool().await;
        let store = SqliteAccountStore::new(pool);
        let account = store
            .upsert_from_oauth(connection("u1", "pid-1", "x"))
            .await
            .unwrap();

        store
            .mark_sync_outcome(&account.id, &SyncOutcome::Failure {
                disposition: crate::model::FailureDisposition::Transient,
                error: "boom".into(),
            })
            .await;

        assert!(store.list_connected(None).await.unwrap().is_empty());
        assert_eq!(store.list_for_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_tokens_reconnects_and_keeps_old_refresh_token() {
        let pool = test_pool().await;
        let store = SqliteAccountStore::new(pool);
        let account = store
            .upsert_from_oauth(connection("u1", "pid-1", "x"))
            .await
            .unwrap();

        // Provider rotated only the access token.
        let grant = TokenGrant::new("new-access".into(), None, Some(7200));
        store.update_tokens(&account.id, &grant).await.unwrap();

        let reloaded = store.get(&account.id).await.unwrap().unwrap();
        assert_eq!(
            reloaded.access_token.unwrap().expose_secret(),
            "new-access"
        );
        assert_eq!(
            reloaded.refresh_token.unwrap().expose_secret(),
            "refresh",
            "missing refresh token in grant preserves the stored one"
        );
    }

    #[tokio::test]
    async fn message_upsert_dedupes_on_platform_id() {
        let pool = test_pool().await;
        let accounts = SqliteAccountStore::new(pool.clone());
        let messages = SqliteMessageStore::new(pool);
        let account = accounts
            .upsert_from_oauth(connection("u1", "pid-1", "x"))
            .await
            .unwrap();

        assert!(messages.upsert(message(&account.id, "m-1")).await.unwrap());
        assert!(
            !messages.upsert(message(&account.id, "m-1")).await.unwrap(),
            "second arrival is a no-op"
        );
        assert!(messages.upsert(message(&account.id, "m-2")).await.unwrap());
        assert_eq!(messages.count_for_account(&account.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_removes_account_and_messages() {
        let pool = test_pool().await;
        let accounts = SqliteAccountStore::new(pool.clone());
        let messages = SqliteMessageStore::new(pool);
        let account = accounts
            .upsert_from_oauth(connection("u1", "pid-1", "x"))
            .await
            .unwrap();
        messages.upsert(message(&account.id, "m-1")).await.unwrap();

        accounts.delete(&account.id).await.unwrap();
        assert!(accounts.get(&account.id).await.unwrap().is_none());
        assert_eq!(messages.count_for_account(&account.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_by_platform_identity_resolves_webhook_recipient() {
        let pool = test_pool().await;
        let store = SqliteAccountStore::new(pool);
        store.upsert_from_oauth(connection("u1", "pid-1", "x")).await.unwrap();

        let found = store
            .find_by_platform_identity(Platform::Linkedin, "pid-1")
            .await
            .unwrap();
        assert!(found.is_some());

        let missing = store
            .find_by_platform_identity(Platform::Linkedin, "pid-unknown")
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
