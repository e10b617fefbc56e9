//! Token persistence keyed by internal user id
//!
//! One `TokenRecord` per user, written through an atomic upsert. The API
//! client reads the record before every call and writes it back after every
//! refresh; the gateway writes it once after the OAuth callback.
//!
//! `FileTokenStore` keeps a JSON file as the single source of truth. Writes
//! use temp-file + rename and a tokio Mutex serializes concurrent upserts, so
//! two refreshes racing for the same user both succeed and the last one wins.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{DEFAULT_LONG_LIVED_SECS, DEFAULT_SHORT_LIVED_SECS, REFRESH_BUFFER_MS};
use crate::error::{Error, Result};
use crate::expiry::now_millis;
use crate::token::{LongLivedToken, TokenResponse};
use crate::user::ThreadsUser;

/// Per-user credential state. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: String,
    pub short_lived_token: String,
    /// The token used for every authenticated call.
    pub long_lived_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub short_lived_expires_at: u64,
    pub long_lived_expires_at: u64,
    pub threads_user_id: String,
    pub threads_username: String,
    pub last_used_at: u64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub created_at: u64,
}

impl TokenRecord {
    /// The long-lived token, if one is stored and non-empty.
    pub fn usable_token(&self) -> Option<&str> {
        self.long_lived_token.as_deref().filter(|t| !t.is_empty())
    }

    /// When proactive refresh becomes due: one hour before long-lived expiry.
    pub fn refresh_due_at(&self) -> u64 {
        self.long_lived_expires_at.saturating_sub(REFRESH_BUFFER_MS)
    }

    /// Inside the one-hour window before expiry (or past it).
    pub fn is_expiring_at(&self, now_ms: u64) -> bool {
        now_ms >= self.refresh_due_at()
    }
}

/// Token material produced by one code-exchange or refresh cycle.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub short_lived_token: String,
    pub short_lived_expires_in: u64,
    pub long_lived_token: String,
    pub long_lived_expires_in: u64,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

impl TokenGrant {
    /// Combine a short-lived grant with the long-lived token exchanged from it.
    pub fn from_responses(short: TokenResponse, long: LongLivedToken) -> Self {
        Self {
            short_lived_token: short.access_token,
            short_lived_expires_in: short.expires_in.unwrap_or(DEFAULT_SHORT_LIVED_SECS),
            long_lived_token: long.access_token,
            long_lived_expires_in: if long.expires_in == 0 {
                DEFAULT_LONG_LIVED_SECS
            } else {
                long.expires_in
            },
            token_type: long.token_type,
            refresh_token: short.refresh_token,
            scope: short.scope,
        }
    }
}

/// Boxed future returned by `TokenStore` methods (keeps the trait dyn-compatible).
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Computes the new record from the current one (if any) inside the upsert.
pub type RecordUpdate = Box<dyn FnOnce(Option<TokenRecord>) -> TokenRecord + Send>;

/// Durable key-value storage of `TokenRecord`s, one per user id.
pub trait TokenStore: Send + Sync {
    fn get<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Option<TokenRecord>>;

    /// Atomically create or update the record for `user_id`.
    fn upsert<'a>(&'a self, user_id: &'a str, update: RecordUpdate)
    -> StoreFuture<'a, TokenRecord>;

    /// Stamp `last_used_at`. No-op when the user has no record.
    fn touch<'a>(&'a self, user_id: &'a str, at_ms: u64) -> StoreFuture<'a, ()>;

    fn user_ids(&self) -> StoreFuture<'_, Vec<String>>;

    /// Replace the record wholesale.
    fn put(&self, record: TokenRecord) -> StoreFuture<'_, TokenRecord> {
        Box::pin(async move {
            let user_id = record.user_id.clone();
            self.upsert(&user_id, Box::new(move |_| record)).await
        })
    }
}

/// Persist a grant for `user_id`, creating the record if absent.
///
/// Expiries are computed from the grant's `expires_in` deltas. A grant
/// without a refresh token keeps the stored one. `user = None` keeps the
/// cached identity (the refresh path has no fresh profile).
pub async fn store_threads_tokens(
    store: &dyn TokenStore,
    user_id: &str,
    grant: TokenGrant,
    user: Option<&ThreadsUser>,
) -> Result<TokenRecord> {
    let now = now_millis();
    let user = user.cloned();
    let owner = user_id.to_string();

    let record = store
        .upsert(
            user_id,
            Box::new(move |existing| {
                let short_lived_expires_at = expires_at(now, grant.short_lived_expires_in);
                let long_lived_expires_at = expires_at(now, grant.long_lived_expires_in);
                match existing {
                    Some(mut record) => {
                        record.short_lived_token = grant.short_lived_token;
                        record.short_lived_expires_at = short_lived_expires_at;
                        record.long_lived_token = Some(grant.long_lived_token);
                        record.long_lived_expires_at = long_lived_expires_at;
                        record.token_type = grant.token_type;
                        if grant.refresh_token.is_some() {
                            record.refresh_token = grant.refresh_token;
                        }
                        if grant.scope.is_some() {
                            record.scope = grant.scope;
                        }
                        if let Some(user) = user {
                            record.threads_user_id = user.id;
                            record.threads_username = user.username;
                        }
                        record.last_used_at = now;
                        record
                    }
                    None => {
                        let (threads_user_id, threads_username) = user
                            .map(|u| (u.id, u.username))
                            .unwrap_or_default();
                        TokenRecord {
                            user_id: owner,
                            short_lived_token: grant.short_lived_token,
                            long_lived_token: Some(grant.long_lived_token),
                            refresh_token: grant.refresh_token,
                            token_type: grant.token_type,
                            short_lived_expires_at,
                            long_lived_expires_at,
                            threads_user_id,
                            threads_username,
                            last_used_at: now,
                            scope: grant.scope,
                            created_at: now,
                        }
                    }
                }
            }),
        )
        .await?;

    debug!(user_id, "stored Threads tokens");
    Ok(record)
}

/// `expires_in` comes from the provider; saturate instead of overflowing.
fn expires_at(now_ms: u64, expires_in_secs: u64) -> u64 {
    now_ms.saturating_add(expires_in_secs.saturating_mul(1000))
}

/// The user's record, or `None` if they never connected.
pub async fn get_threads_tokens(
    store: &dyn TokenStore,
    user_id: &str,
) -> Result<Option<TokenRecord>> {
    store.get(user_id).await
}

pub async fn update_token_last_used(store: &dyn TokenStore, user_id: &str) -> Result<()> {
    store.touch(user_id, now_millis()).await
}

/// True when there is no record, or the long-lived token is within one hour
/// of expiry. A missing record counts as expired so callers go down the
/// refresh/re-auth path.
pub async fn is_access_token_expired(store: &dyn TokenStore, user_id: &str) -> Result<bool> {
    let record = store.get(user_id).await?;
    Ok(is_access_token_expired_at(record.as_ref(), now_millis()))
}

pub fn is_access_token_expired_at(record: Option<&TokenRecord>, now_ms: u64) -> bool {
    match record {
        Some(record) => record.is_expiring_at(now_ms),
        None => true,
    }
}

/// In-process store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    records: Mutex<HashMap<String, TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Option<TokenRecord>> {
        Box::pin(async move { Ok(self.records.lock().await.get(user_id).cloned()) })
    }

    fn upsert<'a>(
        &'a self,
        user_id: &'a str,
        update: RecordUpdate,
    ) -> StoreFuture<'a, TokenRecord> {
        Box::pin(async move {
            let mut records = self.records.lock().await;
            let record = update(records.get(user_id).cloned());
            records.insert(user_id.to_string(), record.clone());
            Ok(record)
        })
    }

    fn touch<'a>(&'a self, user_id: &'a str, at_ms: u64) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if let Some(record) = self.records.lock().await.get_mut(user_id) {
                record.last_used_at = at_ms;
            }
            Ok(())
        })
    }

    fn user_ids(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.records.lock().await.keys().cloned().collect()) })
    }
}

/// JSON-file-backed store mapping user ids to records.
pub struct FileTokenStore {
    path: PathBuf,
    state: Mutex<HashMap<String, TokenRecord>>,
}

impl FileTokenStore {
    /// Load records from `path`, creating the file as `{}` when it does not
    /// exist yet (no users connected).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token store: {e}")))?;
            let records: HashMap<String, TokenRecord> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing token store: {e}")))?;
            info!(path = %path.display(), users = records.len(), "loaded token store");
            records
        } else {
            info!(path = %path.display(), "token store not found, starting empty");
            let records = HashMap::new();
            write_atomic(&path, &records).await?;
            records
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub async fn user_count(&self) -> usize {
        self.state.lock().await.len()
    }
}

impl TokenStore for FileTokenStore {
    fn get<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Option<TokenRecord>> {
        Box::pin(async move { Ok(self.state.lock().await.get(user_id).cloned()) })
    }

    fn upsert<'a>(
        &'a self,
        user_id: &'a str,
        update: RecordUpdate,
    ) -> StoreFuture<'a, TokenRecord> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let previous = state.get(user_id).cloned();
            let record = update(previous.clone());
            state.insert(user_id.to_string(), record.clone());
            if let Err(e) = write_atomic(&self.path, &state).await {
                // keep memory and disk in agreement
                match previous {
                    Some(previous) => state.insert(user_id.to_string(), previous),
                    None => state.remove(user_id),
                };
                return Err(e);
            }
            debug!(user_id, "upserted token record");
            Ok(record)
        })
    }

    fn touch<'a>(&'a self, user_id: &'a str, at_ms: u64) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            match state.get_mut(user_id) {
                Some(record) => record.last_used_at = at_ms,
                None => return Ok(()),
            }
            write_atomic(&self.path, &state).await
        })
    }

    fn user_ids(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.state.lock().await.keys().cloned().collect()) })
    }
}

/// Write records atomically: temp file in the same directory, then rename.
/// The file holds OAuth tokens, so it is created 0600 on unix.
async fn write_atomic(path: &Path, data: &HashMap<String, TokenRecord>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Store(format!("serializing token store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token store path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".threads-tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token store: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token store permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token store: {e}")))?;

    Ok(())
}
