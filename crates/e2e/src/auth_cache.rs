//! Filesystem authentication cache
//!
//! Written once by the setup routines, read by authenticated fixtures:
//! `api-user.json` holds a bearer token and the credentials behind it,
//! `user.json` a browser storage state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use appcheck_common::{Credentials, HarnessConfig, SessionToken, UserId};

use crate::error::{E2eError, E2eResult};

/// Contents of `api-user.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiAuthState {
    pub access_token: SessionToken,
    #[serde(rename = "userEmail")]
    pub user_email: String,
    #[serde(rename = "userPassword")]
    pub user_password: String,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl ApiAuthState {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.user_email.clone(),
            password: self.user_password.clone(),
        }
    }
}

/// Location of the cache files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCache {
    api_file: PathBuf,
    ui_file: PathBuf,
}

impl AuthCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            api_file: dir.join("api-user.json"),
            ui_file: dir.join("user.json"),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            api_file: config.api_auth_file(),
            ui_file: config.ui_auth_file(),
        }
    }

    pub fn api_file(&self) -> &Path {
        &self.api_file
    }

    pub fn ui_file(&self) -> &Path {
        &self.ui_file
    }

    pub fn read_api_state(&self) -> E2eResult<ApiAuthState> {
        let content = read(&self.api_file)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write_api_state(&self, state: &ApiAuthState) -> E2eResult<()> {
        write(&self.api_file, &serde_json::to_string_pretty(state)?)?;
        info!("Saved API auth state for {} to {}", state.user_email, self.api_file.display());
        Ok(())
    }

    pub fn read_storage_state(&self) -> E2eResult<Value> {
        let content = read(&self.ui_file)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write_storage_state(&self, state: &Value) -> E2eResult<()> {
        write(&self.ui_file, &serde_json::to_string_pretty(state)?)?;
        info!("Saved browser storage state to {}", self.ui_file.display());
        Ok(())
    }

    /// Delete whichever cache files exist; returns the removed paths
    pub fn clear(&self) -> E2eResult<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for path in [&self.api_file, &self.ui_file] {
            if path.exists() {
                fs::remove_file(path)?;
                debug!("Removed {}", path.display());
                removed.push(path.clone());
            }
        }
        Ok(removed)
    }
}

fn read(path: &Path) -> E2eResult<String> {
    if !path.exists() {
        return Err(E2eError::AuthCacheMissing(path.to_path_buf()));
    }
    Ok(fs::read_to_string(path)?)
}

fn write(path: &Path, content: &str) -> E2eResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}
