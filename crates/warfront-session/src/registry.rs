//! The server-side identity registry.
//!
//! Issues anonymous identities and maps their tokens back to them. A client
//! that reconnects with its token gets the very same identity, which is what
//! lets the game layer rebind it to its existing seat.
//!
//! A registry opened on a ledger file survives restarts. The ledger is JSON
//! lines, one record per issue or revocation:
//!
//! ```text
//! {"op":"issued","identity":{"id":17,"token":"9f3c...","created_at":1700000000000,"is_anonymous":true}}
//! {"op":"revoked","token":"9f3c..."}
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use warfront_protocol::{Identity, IdentityId};

use crate::{Authenticator, SessionError, SessionService};

/// In-process identity service.
///
/// Built with [`IdentityRegistry::new`], identities live as long as the
/// registry. Built with [`IdentityRegistry::open`], every change is written
/// to a ledger before it takes effect, and reopening the ledger brings
/// every live identity back.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    inner: Mutex<Identities>,
}

#[derive(Debug, Default)]
struct Identities {
    /// token → identity.
    by_token: HashMap<String, Identity>,
    /// id → token, to keep ids unique and support revocation by id.
    by_id: HashMap<IdentityId, String>,
    ledger: Option<Ledger>,
}

impl Identities {
    fn insert(&mut self, identity: Identity) {
        self.by_id.insert(identity.id, identity.token.clone());
        self.by_token.insert(identity.token.clone(), identity);
    }

    fn remove(&mut self, token: &str) -> Option<Identity> {
        let identity = self.by_token.remove(token)?;
        self.by_id.remove(&identity.id);
        Some(identity)
    }
}

/// One ledger line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Record {
    Issued { identity: Identity },
    Revoked { token: String },
}

/// Append-only ledger file.
#[derive(Debug)]
struct Ledger {
    path: PathBuf,
    file: File,
    /// Length up to the end of the last complete line.
    committed: u64,
}

impl Ledger {
    async fn append(&mut self, record: &Record) -> Result<(), SessionError> {
        let mut line = serde_json::to_vec(record).map_err(SessionError::CorruptStore)?;
        line.push(b'\n');
        let written = async {
            self.file.write_all(&line).await?;
            self.file.flush().await?;
            self.file.sync_data().await
        }
        .await;
        match written {
            Ok(()) => {
                self.committed += line.len() as u64;
                Ok(())
            }
            Err(e) => {
                // Keep the ledger ending on a complete line.
                if let Err(trunc) = self.file.set_len(self.committed).await {
                    tracing::error!(
                        path = %self.path.display(),
                        error = %trunc,
                        "could not truncate partial ledger line"
                    );
                }
                Err(SessionError::Storage(e))
            }
        }
    }
}

impl IdentityRegistry {
    /// A registry that forgets everything when dropped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or creates) a registry backed by the ledger at `path`.
    ///
    /// A final line without its newline is a write torn by a crash and is
    /// cut off; nothing was acknowledged for it.
    ///
    /// # Errors
    /// [`SessionError::Storage`] when the file can't be read or opened,
    /// [`SessionError::CorruptStore`] when a complete line isn't a record.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(SessionError::Storage)?;
            }
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(SessionError::Storage(e)),
        };
        let committed = bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |last| last + 1);

        let mut identities = Identities::default();
        for line in bytes[..committed].split(|b| *b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice(line).map_err(SessionError::CorruptStore)? {
                Record::Issued { identity } => identities.insert(identity),
                Record::Revoked { token } => {
                    identities.remove(&token);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(SessionError::Storage)?;
        if committed < bytes.len() {
            tracing::warn!(path = %path.display(), "dropping torn ledger tail");
            file.set_len(committed as u64)
                .await
                .map_err(SessionError::Storage)?;
        }

        tracing::info!(
            path = %path.display(),
            identities = identities.by_token.len(),
            "identity ledger loaded"
        );
        identities.ledger = Some(Ledger {
            path,
            file,
            committed: committed as u64,
        });
        Ok(Self {
            inner: Mutex::new(identities),
        })
    }

    /// The ledger file, if this registry persists.
    pub async fn ledger_path(&self) -> Option<PathBuf> {
        self.inner.lock().await.ledger.as_ref().map(|l| l.path.clone())
    }

    /// Issues a new anonymous identity with a fresh id and token.
    ///
    /// # Errors
    /// [`SessionError::Storage`] when the ledger write fails; no identity
    /// is issued then.
    pub async fn issue(&self) -> Result<Identity, SessionError> {
        let mut inner = self.inner.lock().await;
        // Zero is reserved so a default-initialized id never matches.
        let id = {
            let mut rng = rand::rng();
            loop {
                let candidate = IdentityId(rng.random_range(1..=u64::MAX));
                if !inner.by_id.contains_key(&candidate) {
                    break candidate;
                }
            }
        };
        let token = loop {
            let candidate = generate_token();
            if !inner.by_token.contains_key(&candidate) {
                break candidate;
            }
        };

        let identity = Identity {
            id,
            token,
            created_at: unix_millis(),
            is_anonymous: true,
        };
        if let Some(ledger) = inner.ledger.as_mut() {
            ledger
                .append(&Record::Issued {
                    identity: identity.clone(),
                })
                .await?;
        }
        inner.insert(identity.clone());

        tracing::info!(identity_id = %id, "anonymous identity issued");
        Ok(identity)
    }

    /// Revokes an identity (logout or expiry). Returns `false` if the
    /// token was unknown.
    ///
    /// # Errors
    /// [`SessionError::Storage`] when the ledger write fails; the identity
    /// stays valid then.
    pub async fn revoke(&self, token: &str) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock().await;
        if !inner.by_token.contains_key(token) {
            return Ok(false);
        }
        if let Some(ledger) = inner.ledger.as_mut() {
            ledger
                .append(&Record::Revoked {
                    token: token.to_string(),
                })
                .await?;
        }
        if let Some(identity) = inner.remove(token) {
            tracing::info!(identity_id = %identity.id, "identity revoked");
        }
        Ok(true)
    }

    /// Number of live identities.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_token.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl SessionService for IdentityRegistry {
    async fn create_anonymous_session(&self) -> Result<Identity, SessionError> {
        self.issue().await
    }
}

impl Authenticator for IdentityRegistry {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        self.inner
            .lock()
            .await
            .by_token
            .get(token)
            .cloned()
            .ok_or(SessionError::InvalidToken)
    }
}

/// 32 lowercase hex characters (128 bits of entropy).
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
