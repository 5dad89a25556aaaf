use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// The persisted session. Each field is stored independently, so any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// The user profile returned at login. Opaque to this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>, profile: Option<Value>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            profile,
        }
    }

    /// A session is complete when the access token, refresh token and profile are all present.
    pub fn is_complete(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some() && self.profile.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.profile.is_none()
    }
}

/// Holds the current session's tokens and profile.
pub trait CredentialStore: Send + Sync + Debug {
    fn load(&self) -> Credential;
    fn save(&self, credential: Credential) -> io::Result<()>;
    /// Replace only the access token, keeping the refresh token and profile.
    fn set_access_token(&self, token: &str) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;

    fn access_token(&self) -> Option<String> {
        self.load().access_token
    }

    fn refresh_token(&self) -> Option<String> {
        self.load().refresh_token
    }

    fn profile(&self) -> Option<Value> {
        self.load().profile
    }
}

fn read(lock: &RwLock<Credential>) -> RwLockReadGuard<'_, Credential> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(lock: &RwLock<Credential>) -> RwLockWriteGuard<'_, Credential> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps the session in process memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    credential: RwLock<Credential>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(credential),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Credential {
        read(&self.credential).clone()
    }

    fn save(&self, credential: Credential) -> io::Result<()> {
        *write(&self.credential) = credential;
        Ok(())
    }

    fn set_access_token(&self, token: &str) -> io::Result<()> {
        write(&self.credential).access_token = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *write(&self.credential) = Credential::default();
        Ok(())
    }
}

/// Keeps the session in a JSON file, so it survives restarts.
///
/// The file is rewritten on every change and removed by `clear`. Reads are served from memory.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    credential: RwLock<Credential>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty session. A file that can't be parsed is
    /// treated as an empty session as well, and is replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let credential = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "discarding unreadable credential file");
                Credential::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Credential::default(),
            Err(e) => return Err(e),
        };
        debug!(path = %path.display(), "credential store opened");
        Ok(Self {
            path,
            credential: RwLock::new(credential),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, credential: &Credential) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        let data = serde_json::to_vec_pretty(credential)?;
        write_private(&tmp, &data)?;
        fs::rename(&tmp, &self.path)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    f.write_all(data)
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    fs::write(path, data)
}

impl CredentialStore for FileStore {
    fn load(&self) -> Credential {
        read(&self.credential).clone()
    }

    fn save(&self, credential: Credential) -> io::Result<()> {
        let mut current = write(&self.credential);
        self.persist(&credential)?;
        *current = credential;
        Ok(())
    }

    fn set_access_token(&self, token: &str) -> io::Result<()> {
        let mut current = write(&self.credential);
        let mut updated = current.clone();
        updated.access_token = Some(token.to_string());
        self.persist(&updated)?;
        *current = updated;
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        let mut current = write(&self.credential);
        *current = Credential::default();
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
