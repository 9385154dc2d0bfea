//! Authenticated request gateway
//!
//! Every request is sent with the stored access token attached. When the backend rejects the
//! token with `401 Unauthorized`, the gateway exchanges the refresh token for a new access token
//! and sends the request once again. There is exactly one such recovery per request: if the
//! refresh is rejected, or the retried request is still unauthorized, the session is cleared and
//! the caller is told the session expired.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config;
use crate::session::{self, Credentials, Session, SessionStore, fingerprint};

mod request;

pub use request::{ApiRequest, DEFAULT_PAGE, DEFAULT_PAGE_SIZE, Multipart};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot connect to the API")]
    Connection(#[source] reqwest::Error),
    #[error("Session expired, login required")]
    SessionExpired,
    #[error("Session storage failure")]
    Storage(#[from] session::Error),
    #[error("Invalid request url: {0}")]
    InvalidUrl(String),
    #[error("Cannot create HTTP client")]
    Client(#[source] reqwest::Error),
}

/// Which attempt of sending a request is performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// Request sent with the token found in the session
    First,
    /// Request sent again after refreshing the access token
    Retried,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Successful refresh endpoint response
#[derive(Debug, Deserialize)]
struct Refreshed {
    access: String,
    /// Present when the backend rotates refresh tokens
    refresh: Option<String>,
}

struct GatewayInner<S> {
    client: Client,
    base_url: Url,
    refresh_url: Url,
    session: Session<S>,
}

/// Gateway to the condominium API
///
/// Cheap to clone, all clones share the HTTP client and the session.
pub struct Gateway<S>(Arc<GatewayInner<S>>);

impl<S> Clone for Gateway<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: SessionStore> Gateway<S> {
    /// Creates gateway for the configured API, owning the session
    pub fn new(config: &config::Api, session: Session<S>) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::Client)?;

        let base_url = request::base_url(&config.base_url)?;
        let refresh_url = request::resolve(&base_url, &config.refresh_path)?;

        Ok(Self(Arc::new(GatewayInner {
            client,
            base_url,
            refresh_url,
            session,
        })))
    }

    /// Access to the session
    pub fn session(&self) -> &Session<S> {
        &self.0.session
    }

    /// Base url requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.0.base_url
    }

    /// Sends an authenticated request
    ///
    /// Any response other than `401 Unauthorized` is returned as it is, including error statuses.
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, Error> {
        let session = &self.0.session;
        let mut credentials = session.credentials().await?;
        let mut attempt = Attempt::First;

        loop {
            let access = credentials.as_ref().map(|credentials| credentials.access.as_str());
            let response = self.dispatch(request, access, attempt).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            match (attempt, credentials.take()) {
                (Attempt::First, Some(current)) => {
                    credentials = Some(self.refresh_with(&current).await?);
                    attempt = Attempt::Retried;
                }
                (Attempt::First, None) => {
                    warn!(path = request.path(), "Unauthorized without session");
                    session.clear().await?;
                    return Err(Error::SessionExpired);
                }
                (Attempt::Retried, _) => {
                    warn!(
                        path = request.path(),
                        "Refreshed token rejected, clearing session"
                    );
                    session.clear().await?;
                    return Err(Error::SessionExpired);
                }
            }
        }
    }

    /// Sends a request without credentials and without refresh handling
    ///
    /// Meant for endpoints establishing the session, like login.
    pub async fn send_anonymous(&self, request: &ApiRequest) -> Result<Response, Error> {
        self.dispatch(request, None, Attempt::First).await
    }

    pub async fn get(&self, path: impl Into<String>) -> Result<Response, Error> {
        self.send(&ApiRequest::get(path)).await
    }

    pub async fn post(
        &self,
        path: impl Into<String>,
        body: serde_json::Value,
    ) -> Result<Response, Error> {
        self.send(&ApiRequest::post(path).body(body)).await
    }

    pub async fn put(
        &self,
        path: impl Into<String>,
        body: serde_json::Value,
    ) -> Result<Response, Error> {
        self.send(&ApiRequest::put(path).body(body)).await
    }

    pub async fn patch(
        &self,
        path: impl Into<String>,
        body: serde_json::Value,
    ) -> Result<Response, Error> {
        self.send(&ApiRequest::patch(path).body(body)).await
    }

    pub async fn delete(&self, path: impl Into<String>) -> Result<Response, Error> {
        self.send(&ApiRequest::delete(path)).await
    }

    /// Fetches a single page of a paginated collection
    ///
    /// `page` defaults to [`DEFAULT_PAGE`], `page_size` to [`DEFAULT_PAGE_SIZE`]. `filters` are
    /// passed as additional query parameters, a filter named `page` or `page_size` takes
    /// precedence over the pagination arguments.
    pub async fn get_paginated(
        &self,
        path: impl Into<String>,
        page: Option<u32>,
        page_size: Option<u32>,
        filters: &[(&str, &str)],
    ) -> Result<Response, Error> {
        let filtered = |key: &str| filters.iter().any(|(name, _)| *name == key);

        let mut request = ApiRequest::get(path);
        if !filtered("page") {
            request = request.query("page", page.unwrap_or(DEFAULT_PAGE));
        }
        if !filtered("page_size") {
            request = request.query("page_size", page_size.unwrap_or(DEFAULT_PAGE_SIZE));
        }
        let request = filters
            .iter()
            .fold(request, |request, (key, value)| request.query(*key, value));

        self.send(&request).await
    }

    /// Uploads a file as the `file` field of a multipart form
    pub async fn upload(
        &self,
        path: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Result<Response, Error> {
        let form = Multipart::new().file("file", file_name, content);
        self.send(&ApiRequest::post(path).multipart(form)).await
    }

    /// Exchanges the stored refresh token for a new access token
    pub async fn refresh(&self) -> Result<Credentials, Error> {
        let session = &self.0.session;
        match session.credentials().await? {
            Some(current) => self.refresh_with(&current).await,
            None => {
                session.clear().await?;
                Err(Error::SessionExpired)
            }
        }
    }

    async fn refresh_with(&self, current: &Credentials) -> Result<Credentials, Error> {
        let session = &self.0.session;
        info!(
            refresh = %fingerprint(&current.refresh),
            "Refreshing access token"
        );

        let response = self
            .0
            .client
            .post(self.0.refresh_url.clone())
            .json(&RefreshRequest {
                refresh: &current.refresh,
            })
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "Cannot reach refresh endpoint, clearing session");
                session.clear().await?;
                return Err(Error::Connection(err));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Refresh token rejected, clearing session");
            session.clear().await?;
            return Err(Error::SessionExpired);
        }

        let refreshed: Refreshed = match response.json().await {
            Ok(refreshed) => refreshed,
            Err(err) if err.is_decode() => {
                warn!(error = %err, "Malformed refresh response, clearing session");
                session.clear().await?;
                return Err(Error::SessionExpired);
            }
            Err(err) => {
                warn!(error = %err, "Refresh response interrupted, clearing session");
                session.clear().await?;
                return Err(Error::Connection(err));
            }
        };

        let credentials = match refreshed.refresh {
            Some(refresh) => {
                let credentials = Credentials::new(refreshed.access, refresh);
                session.save(&credentials).await?;
                credentials
            }
            None => {
                session.update_access(&refreshed.access).await?;
                Credentials::new(refreshed.access, current.refresh.clone())
            }
        };

        info!(access = %fingerprint(&credentials.access), "Access token refreshed");
        Ok(credentials)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        access: Option<&str>,
        attempt: Attempt,
    ) -> Result<Response, Error> {
        let builder = request.build(&self.0.client, &self.0.base_url, access)?;

        debug!(
            method = %request.method(),
            path = request.path(),
            ?attempt,
            authenticated = access.is_some(),
            "Sending request"
        );

        let response = builder.send().await.map_err(|err| {
            debug!(error = %err, "Request failed");
            Error::Connection(err)
        })?;

        debug!(status = %response.status(), ?attempt, "Response received");
        Ok(response)
    }
}
