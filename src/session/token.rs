//! Token store boundary: persistence for the bearer credential.
//!
//! The credential is a single opaque string. It must survive process
//! restarts (file-backed by default) and is only ever accessed from one
//! logical thread, so last-write-wins is the whole concurrency contract.
//!
//! ## Security
//!
//! The token file is created with 0600 permissions (owner read/write only)
//! since it holds a live bearer credential.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::Result;

/// Required permissions for the token file (Unix: 0600, owner read/write only).
#[cfg(unix)]
pub const TOKEN_FILE_MODE: u32 = 0o600;

/// Persists, retrieves, and clears the single bearer credential.
pub trait TokenStore: Send + Sync {
    /// Read the stored credential, if any.
    fn get(&self) -> Result<Option<String>>;

    /// Store a credential, replacing any previous one.
    fn set(&self, token: &str) -> Result<()>;

    /// Remove the stored credential. No-op when nothing is stored.
    fn clear(&self) -> Result<()>;
}

/// File-backed token store under the platform data directory.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store at the default location (see [`crate::config::default_token_path`]).
    pub fn new() -> Self {
        Self::at(crate::config::default_token_path())
    }

    /// Create a store at an explicit path.
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Default for FileTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(TOKEN_FILE_MODE))?;
        }

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory token store for tests and embedders that manage persistence
/// themselves.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a credential, as if a previous process had stored one.
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<String>> {
        Ok(self.token.lock().unwrap().clone())
    }

    fn set(&self, token: &str) -> Result<()> {
        *self.token.lock().unwrap() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}
