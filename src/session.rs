//! Process-wide application state: the bearer token and the signed-in viewer.
//!
//! The token lives in a small JSON file so a later run can restore the
//! session. It is written only by [`Session::login`] and [`Session::logout`]
//! and read by every request the [`ApiClient`] sends.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{api::ApiClient, errors::ClientError, orders::UserId};

/// Errors from the persisted token file.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("token file I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("token file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct Persisted {
    token: String,
}

/// Holds the bearer token, optionally mirrored to a file.
#[derive(Debug, Default)]
pub struct TokenStore {
    path: Option<PathBuf>,
    token: RwLock<Option<String>>,
}

impl TokenStore {
    /// A store that forgets the token when the process exits.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the token file at `path`; a missing file means "signed out".
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let token = match fs::read(&path) {
            Ok(bytes) => Some(serde_json::from_slice::<Persisted>(&bytes)?.token),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(TokenStore {
            path: Some(path),
            token: RwLock::new(token),
        })
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the token; `None` signs out and removes the file.
    pub fn set(&self, token: Option<String>) -> Result<(), SessionError> {
        if let Some(path) = &self.path {
            match &token {
                Some(t) => fs::write(path, serde_json::to_vec(&Persisted { token: t.clone() })?)?,
                None => match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                },
            }
        }
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
        Ok(())
    }
}

/// The signed-in user, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// The explicit application-state object handed to every view.
///
/// Populated by [`Session::restore`] or [`Session::login`], cleared by
/// [`Session::logout`], never changed anywhere else.
pub struct Session {
    tokens: Arc<TokenStore>,
    viewer: RwLock<Option<Viewer>>,
}

impl Session {
    pub fn new(tokens: Arc<TokenStore>) -> Self {
        Session {
            tokens,
            viewer: RwLock::new(None),
        }
    }

    pub fn tokens(&self) -> Arc<TokenStore> {
        Arc::clone(&self.tokens)
    }

    pub fn viewer(&self) -> Option<Viewer> {
        self.viewer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn viewer_id(&self) -> Option<UserId> {
        self.viewer().map(|v| v.user_id)
    }

    fn set_viewer(&self, viewer: Option<Viewer>) {
        *self.viewer.write().unwrap_or_else(PoisonError::into_inner) = viewer;
    }

    /// Loads the current user for a persisted token.
    ///
    /// A token the server no longer accepts is dropped; other failures keep it
    /// so the next run can try again.
    pub async fn restore(&self, api: &ApiClient) -> Option<Viewer> {
        self.tokens.token()?;
        match api.current_user().await {
            Ok(viewer) => {
                info!("restored session for {}", viewer.username);
                self.set_viewer(Some(viewer.clone()));
                Some(viewer)
            }
            Err(ClientError::Unauthorized) => {
                warn!("stored token rejected, signing out");
                if let Err(e) = self.tokens.set(None) {
                    warn!("could not clear stored token: {}", e);
                }
                self.set_viewer(None);
                None
            }
            Err(e) => {
                warn!("could not restore session: {}", e);
                None
            }
        }
    }

    pub async fn login(
        &self,
        api: &ApiClient,
        email: &str,
        password: &str,
    ) -> Result<Viewer, ClientError> {
        let grant = api.login(email, password).await?;
        self.tokens.set(Some(grant.token))?;
        let viewer = match grant.user_info {
            Some(viewer) => viewer,
            None => api.current_user().await?,
        };
        info!("logged in as {}", viewer.username);
        self.set_viewer(Some(viewer.clone()));
        Ok(viewer)
    }

    /// Signs out locally even when the server call fails.
    pub async fn logout(&self, api: &ApiClient) -> Result<(), ClientError> {
        if let Err(e) = api.logout().await {
            warn!("logout request failed, clearing local session anyway: {}", e);
        }
        self.tokens.set(None)?;
        self.set_viewer(None);
        Ok(())
    }
}
