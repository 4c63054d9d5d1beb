//! Tenant credential storage on top of [`Database`].
//!
//! One row per tenant. Every save replaces the whole row (last write wins);
//! rows are only removed by an explicit [`TokenStore::delete`].

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{encryption, CipherKey, TenantCredential, TokenSet};
use crate::db::{parse_db_timestamp, to_db_timestamp, Database};
use crate::error::{OAuthError, Result};

/// Encrypted token storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE tenant_credentials (
///     tenant_id               TEXT PRIMARY KEY,
///     access_token            TEXT NOT NULL,  -- plaintext, short-lived
///     encrypted_refresh_token TEXT NOT NULL,  -- hex(ciphertext):hex(iv)
///     expires_at              TEXT NOT NULL,
///     created_at              TEXT NOT NULL,
///     updated_at              TEXT NOT NULL
/// );
/// ```
#[derive(Clone)]
pub struct TokenStore {
    db: Database,
    key: CipherKey,
}

impl TokenStore {
    pub fn new(db: Database, key: CipherKey) -> Self {
        Self { db, key }
    }

    /// Encrypts the refresh token and upserts the tenant's credential.
    ///
    /// Replaces any existing row wholesale; no field is merged.
    pub async fn save(&self, tenant_id: &str, tokens: &TokenSet) -> Result<()> {
        let envelope = encryption::encrypt(&tokens.refresh_token, &self.key)?;

        let tenant_id = tenant_id.to_string();
        let access_token = tokens.access_token.clone();
        let expires_at = to_db_timestamp(&tokens.expires_at);
        let now = to_db_timestamp(&Utc::now());

        self.db
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO tenant_credentials (
                        tenant_id, access_token, encrypted_refresh_token,
                        expires_at, created_at, updated_at
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                    ON CONFLICT(tenant_id) DO UPDATE SET
                        access_token = excluded.access_token,
                        encrypted_refresh_token = excluded.encrypted_refresh_token,
                        expires_at = excluded.expires_at,
                        updated_at = excluded.updated_at
                    "#,
                    params![tenant_id, access_token, envelope, expires_at, now],
                )?;
                Ok(())
            })
            .await
    }

    /// Loads and decrypts a tenant's tokens.
    ///
    /// # Errors
    /// * `NotFound` - no credential for `tenant_id`
    /// * `Decryption` - the stored envelope does not open under the current key
    pub async fn retrieve(&self, tenant_id: &str) -> Result<TokenSet> {
        let record = self
            .find(tenant_id)
            .await?
            .ok_or_else(|| OAuthError::credential_not_found(tenant_id))?;

        let refresh_token = encryption::decrypt(&record.encrypted_refresh_token, &self.key)
            .map_err(|e| {
                tracing::error!(tenant_id = %tenant_id, error = %e, "Stored refresh token could not be decrypted");
                e
            })?;

        Ok(TokenSet {
            access_token: record.access_token,
            refresh_token,
            expires_at: record.expires_at,
        })
    }

    /// Returns the raw persisted row without decrypting anything.
    pub async fn find(&self, tenant_id: &str) -> Result<Option<TenantCredential>> {
        let tenant_id = tenant_id.to_string();
        self.db
            .call(move |conn| {
                let row = conn
                    .query_row(
                        r#"
                        SELECT access_token, encrypted_refresh_token, expires_at
                        FROM tenant_credentials
                        WHERE tenant_id = ?1
                        "#,
                        params![tenant_id],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                            ))
                        },
                    )
                    .optional()?;

                row.map(
                    |(access_token, encrypted_refresh_token, expires_at)| -> Result<TenantCredential> {
                        Ok(TenantCredential {
                            tenant_id,
                            access_token,
                            encrypted_refresh_token,
                            expires_at: parse_db_timestamp(&expires_at)?,
                        })
                    },
                )
                .transpose()
            })
            .await
    }

    /// Deletes a tenant's credential.
    ///
    /// Returns `true` if a row was removed.
    pub async fn delete(&self, tenant_id: &str) -> Result<bool> {
        let tenant_id = tenant_id.to_string();
        let rows_affected = self
            .db
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM tenant_credentials WHERE tenant_id = ?1",
                    params![tenant_id],
                )?)
            })
            .await?;

        Ok(rows_affected > 0)
    }

    /// Lists every tenant with stored credentials.
    pub async fn list_tenants(&self) -> Result<Vec<String>> {
        self.db
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT tenant_id FROM tenant_credentials ORDER BY tenant_id")?;
                let tenants = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(tenants)
            })
            .await
    }

    /// Re-encrypts every stored refresh token under `new_key`.
    ///
    /// Runs in a single transaction: if any envelope fails to decrypt under
    /// the current key, nothing is written. This store keeps using the old
    /// key afterwards; build a new one with `new_key` once this returns.
    pub async fn reencrypt_all(&self, new_key: &CipherKey) -> Result<usize> {
        let old_key = self.key.clone();
        let new_key = new_key.clone();

        let migrated = self
            .db
            .call(move |conn| {
                let tx = conn.transaction()?;

                let rows = {
                    let mut stmt = tx.prepare(
                        "SELECT tenant_id, encrypted_refresh_token FROM tenant_credentials",
                    )?;
                    let rows = stmt
                        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                        .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
                    rows
                };

                let now = to_db_timestamp(&Utc::now());
                for (tenant_id, envelope) in &rows {
                    let refresh_token = encryption::decrypt(envelope, &old_key)?;
                    let reencrypted = encryption::encrypt(&refresh_token, &new_key)?;
                    tx.execute(
                        r#"
                        UPDATE tenant_credentials
                        SET encrypted_refresh_token = ?2, updated_at = ?3
                        WHERE tenant_id = ?1
                        "#,
                        params![tenant_id, reencrypted, now],
                    )?;
                }

                tx.commit()?;
                Ok(rows.len())
            })
            .await?;

        tracing::info!(count = migrated, "Re-encrypted stored refresh tokens under new key");
        Ok(migrated)
    }
}
