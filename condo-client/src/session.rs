//! Client session credentials

use std::fmt;

use base64::prelude::*;
use chrono::Utc;
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use tracing::debug;

use crate::identity::Identity;

mod store;

pub use store::{Error, FileStore, MemoryStore, SessionStore};

/// Store key of the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Store key of the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Short, non-reversible token representation safe to put in logs
pub fn fingerprint(token: &str) -> String {
    let digest = Sha3_256::digest(token.as_bytes());
    BASE64_URL_SAFE_NO_PAD.encode(&digest[..6])
}

fn redacted(token: &String, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<{}>", fingerprint(token))
}

/// Access and refresh token pair
#[derive(Clone, PartialEq, Eq, Derivative, Serialize, Deserialize)]
#[derivative(Debug)]
pub struct Credentials {
    /// Short-living bearer token authorizing API calls
    #[derivative(Debug(format_with = "redacted"))]
    pub access: String,
    /// Long-living token used to obtain new access tokens
    #[derivative(Debug(format_with = "redacted"))]
    pub refresh: String,
}

impl Credentials {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

/// Session state of the client
///
/// Both tokens are kept together: if only one of them can be found in the store, the session is
/// considered unauthenticated.
#[derive(Debug)]
pub struct Session<S> {
    store: S,
}

impl<S: SessionStore> Session<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stored credentials, if the full pair is present
    pub async fn credentials(&self) -> Result<Option<Credentials>, Error> {
        let access = self.store.get(ACCESS_TOKEN_KEY).await?;
        let refresh = self.store.get(REFRESH_TOKEN_KEY).await?;

        match (access, refresh) {
            (Some(access), Some(refresh)) => Ok(Some(Credentials { access, refresh })),
            (None, None) => Ok(None),
            (access, refresh) => {
                debug!(
                    access = access.is_some(),
                    refresh = refresh.is_some(),
                    "Partial credentials stored, session unauthenticated"
                );
                Ok(None)
            }
        }
    }

    /// Persists the credentials pair
    pub async fn save(&self, credentials: &Credentials) -> Result<(), Error> {
        self.store.set(ACCESS_TOKEN_KEY, &credentials.access).await?;
        self.store
            .set(REFRESH_TOKEN_KEY, &credentials.refresh)
            .await?;
        debug!(access = %fingerprint(&credentials.access), "Credentials stored");
        Ok(())
    }

    /// Replaces the stored access token, leaving the refresh token as is
    pub async fn update_access(&self, access: &str) -> Result<(), Error> {
        self.store.set(ACCESS_TOKEN_KEY, access).await
    }

    /// Removes both tokens
    pub async fn clear(&self) -> Result<(), Error> {
        self.store.remove(ACCESS_TOKEN_KEY).await?;
        self.store.remove(REFRESH_TOKEN_KEY).await?;
        debug!("Credentials cleared");
        Ok(())
    }

    /// Identity decoded from the current access token
    ///
    /// Unauthenticated sessions and undecodable tokens have no identity.
    pub async fn identity(&self) -> Result<Option<Identity>, Error> {
        let Some(credentials) = self.credentials().await? else {
            return Ok(None);
        };

        match Identity::from_token(&credentials.access) {
            Ok(identity) => Ok(Some(identity)),
            Err(err) => {
                debug!(error = %err, "Cannot decode access token");
                Ok(None)
            }
        }
    }

    /// Checks if there is a session with a not yet expired access token
    pub async fn is_authenticated(&self) -> Result<bool, Error> {
        let now = Utc::now();
        Ok(self
            .identity()
            .await?
            .is_some_and(|identity| !identity.is_expired_at(now)))
    }

    /// Access to the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }
}
