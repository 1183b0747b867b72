//! Authority option storage
//!
//! Newly created ACME accounts are persisted by appending the serialized key
//! and registration to the authority's option list. The store behind that is
//! pluggable; an in-memory and a filesystem implementation are provided.
//!
//! # Directory Structure
//!
//! ```text
//! storage/
//! └── authorities/
//!     └── <authority-id>.json   # {"name": "...", "options": [{name, value}, ...]}
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace};

use zonecert_common::AuthorityId;
use zonecert_config::{Authority, AuthorityOptions};

/// Errors raised by authority stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authority '{0}' not found")]
    NotFound(String),
}

/// Persistence for authority option lists
#[async_trait]
pub trait AuthorityStore: Send + Sync {
    /// Replace the stored option list of an authority
    async fn update_options(
        &self,
        authority_id: &AuthorityId,
        options: &AuthorityOptions,
    ) -> Result<(), StoreError>;
}

/// Authorities held in process memory
#[derive(Debug, Default)]
pub struct MemoryAuthorityStore {
    authorities: RwLock<HashMap<AuthorityId, Authority>>,
}

impl MemoryAuthorityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, authority: Authority) {
        self.authorities.write().insert(authority.id.clone(), authority);
    }

    pub fn get(&self, authority_id: &AuthorityId) -> Option<Authority> {
        self.authorities.read().get(authority_id).cloned()
    }
}

#[async_trait]
impl AuthorityStore for MemoryAuthorityStore {
    async fn update_options(
        &self,
        authority_id: &AuthorityId,
        options: &AuthorityOptions,
    ) -> Result<(), StoreError> {
        let mut authorities = self.authorities.write();
        let authority = authorities
            .get_mut(authority_id)
            .ok_or_else(|| StoreError::NotFound(authority_id.to_string()))?;
        authority.options = Some(options.clone());
        debug!(authority_id = %authority_id, options = options.len(), "Updated authority options");
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredAuthority {
    name: String,
    #[serde(default)]
    options: Option<AuthorityOptions>,
}

/// Authorities stored as JSON files
#[derive(Debug)]
pub struct FileAuthorityStore {
    /// Base storage directory
    base_path: PathBuf,
}

impl FileAuthorityStore {
    /// Create a store at the given path
    ///
    /// Creates the directory structure if it doesn't exist and sets
    /// restrictive permissions (0700 on Unix), since stored options may
    /// carry account keys.
    pub fn new(base_path: &Path) -> Result<Self, StoreError> {
        let authorities_path = base_path.join("authorities");
        fs::create_dir_all(&authorities_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o700);
            fs::set_permissions(base_path, perms.clone())?;
            fs::set_permissions(&authorities_path, perms)?;
        }

        info!(
            storage_path = %base_path.display(),
            "Initialized authority storage"
        );

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    /// Get the storage base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn authority_path(&self, authority_id: &AuthorityId) -> PathBuf {
        self.base_path
            .join("authorities")
            .join(format!("{}.json", authority_id))
    }

    /// Load a stored authority
    pub fn load_authority(&self, authority_id: &AuthorityId) -> Result<Option<Authority>, StoreError> {
        let path = self.authority_path(authority_id);
        if !path.exists() {
            trace!(authority_id = %authority_id, "No stored authority found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let stored: StoredAuthority = serde_json::from_str(&content)?;
        debug!(authority_id = %authority_id, "Loaded authority");

        Ok(Some(Authority {
            id: authority_id.clone(),
            name: stored.name,
            options: stored.options,
        }))
    }

    /// Save an authority, replacing any stored copy
    pub fn save_authority(&self, authority: &Authority) -> Result<(), StoreError> {
        let stored = StoredAuthority {
            name: authority.name.clone(),
            options: authority.options.clone(),
        };
        self.write(&authority.id, &stored)
    }

    fn write(&self, authority_id: &AuthorityId, stored: &StoredAuthority) -> Result<(), StoreError> {
        let path = self.authority_path(authority_id);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(stored)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, &path)?;
        debug!(authority_id = %authority_id, "Saved authority");
        Ok(())
    }
}

#[async_trait]
impl AuthorityStore for FileAuthorityStore {
    async fn update_options(
        &self,
        authority_id: &AuthorityId,
        options: &AuthorityOptions,
    ) -> Result<(), StoreError> {
        let mut authority = self
            .load_authority(authority_id)?
            .ok_or_else(|| StoreError::NotFound(authority_id.to_string()))?;
        authority.options = Some(options.clone());
        self.save_authority(&authority)?;
        info!(authority_id = %authority_id, "Persisted authority options");
        Ok(())
    }
}
