//! Persistent storage of pending PKCE verifiers.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::{parse_db_timestamp, to_db_timestamp, Database};
use crate::error::{OAuthError, Result};

/// A verifier waiting for its callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingChallenge {
    pub tenant_id: String,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
}

/// Stores at most one pending verifier per tenant.
///
/// Nothing is cached in memory: the redirect round-trip can outlive the
/// process, so every call goes to the database.
#[derive(Clone)]
pub struct ChallengeStore {
    db: Database,
}

impl ChallengeStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upserts the tenant's pending verifier.
    ///
    /// Any older unfinished flow for the same tenant is silently replaced.
    pub async fn save(&self, tenant_id: &str, code_verifier: &str) -> Result<()> {
        let tenant_id = tenant_id.to_string();
        let code_verifier = code_verifier.to_string();
        let now = to_db_timestamp(&Utc::now());

        self.db
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO pending_challenges (tenant_id, code_verifier, created_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(tenant_id) DO UPDATE SET
                        code_verifier = excluded.code_verifier,
                        created_at = excluded.created_at
                    "#,
                    params![tenant_id, code_verifier, now],
                )?;
                Ok(())
            })
            .await
    }

    /// Returns the tenant's pending verifier, or `NotFound`.
    pub async fn retrieve(&self, tenant_id: &str) -> Result<String> {
        self.find(tenant_id)
            .await?
            .map(|challenge| challenge.code_verifier)
            .ok_or_else(|| OAuthError::challenge_not_found(tenant_id))
    }

    pub async fn find(&self, tenant_id: &str) -> Result<Option<PendingChallenge>> {
        let tenant_id = tenant_id.to_string();
        self.db
            .call(move |conn| {
                let row: Option<(String, String)> = conn
                    .query_row(
                        "SELECT code_verifier, created_at FROM pending_challenges WHERE tenant_id = ?1",
                        params![tenant_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                match row {
                    Some((code_verifier, created_at)) => Ok(Some(PendingChallenge {
                        tenant_id,
                        code_verifier,
                        created_at: parse_db_timestamp(&created_at)?,
                    })),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Deletes the tenant's pending verifier. Absent rows are not an error.
    pub async fn remove(&self, tenant_id: &str) -> Result<()> {
        let tenant_id = tenant_id.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM pending_challenges WHERE tenant_id = ?1",
                    params![tenant_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Deletes challenges created more than `ttl` ago. Returns how many went.
    pub async fn sweep_expired(&self, ttl: Duration) -> Result<usize> {
        let cutoff = to_db_timestamp(&(Utc::now() - ttl));
        self.db
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM pending_challenges WHERE created_at < ?1",
                    params![cutoff],
                )?)
            })
            .await
    }

    /// Number of flows currently awaiting a callback.
    pub async fn count(&self) -> Result<usize> {
        self.db
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM pending_challenges", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
    }
}

/// Background task reclaiming challenges whose callback never arrived.
///
/// `interval_seconds` must be non-zero; [`ChallengeSettings::validate`]
/// enforces this for configured values.
///
/// [`ChallengeSettings::validate`]: crate::config::ChallengeSettings::validate
pub async fn run_challenge_sweep(store: ChallengeStore, ttl: Duration, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        match store.sweep_expired(ttl).await {
            Ok(0) => tracing::debug!("PKCE challenge sweep complete, nothing expired"),
            Ok(removed) => tracing::info!(removed, "Removed abandoned PKCE challenges"),
            Err(e) => tracing::error!(error = %e, "PKCE challenge sweep failed"),
        }
    }
}
