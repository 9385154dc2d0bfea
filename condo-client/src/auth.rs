//! Authentication endpoints of the condominium API

use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::api_error;
use crate::config::AuthEndpoints;
use crate::gateway::{self, ApiRequest, Gateway};
use crate::identity::{Role, UserId};
use crate::session::{Credentials, SessionStore};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Gateway(#[from] gateway::Error),
    #[error("{0}")]
    Rejected(String),
    #[error("Unexpected API response")]
    UnexpectedResponse(#[source] reqwest::Error),
    #[error("Cannot encode request body")]
    Encode(#[from] serde_json::Error),
}

/// User data returned on login and registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(rename = "nombre_usuario")]
    pub username: String,
    #[serde(rename = "nombre_completo", default)]
    pub full_name: String,
    #[serde(rename = "rol", default)]
    pub role: Option<Role>,
}

/// Login and registration response envelope
#[derive(Debug, Deserialize)]
struct Authenticated {
    #[serde(rename = "mensaje", default)]
    message: Option<String>,
    #[serde(rename = "usuario")]
    user: User,
    tokens: Credentials,
}

#[derive(Debug, Serialize)]
struct Login<'a> {
    email: &'a str,
    password: &'a str,
}

/// Registration form
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmar_password")]
    pub password_confirmation: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "telefono", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Profile of the authenticated user
///
/// Only the commonly used fields are typed, everything else the backend sends is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "rol", default)]
    pub role: Option<Role>,
    #[serde(rename = "email_usuario", default)]
    pub email: Option<String>,
    #[serde(rename = "nombre_usuario", default)]
    pub full_name: Option<String>,
    #[serde(rename = "numero_unidad", default)]
    pub unit: Option<String>,
    #[serde(rename = "edificio", default)]
    pub building: Option<String>,
    #[serde(rename = "es_propietario", default)]
    pub is_owner: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct PasswordChange<'a> {
    old_password: &'a str,
    new_password: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordResetRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordReset<'a> {
    token: &'a str,
    new_password: &'a str,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
    message: Option<String>,
}

/// Message reported when password change is confirmed without a message
pub const PASSWORD_CHANGED: &str = "Contraseña actualizada exitosamente";

/// Message reported when password reset request is confirmed without a message
pub const PASSWORD_RESET_REQUESTED: &str =
    "Se ha enviado un enlace de restablecimiento a su email";

/// Message reported when password reset is confirmed without a message
pub const PASSWORD_RESET: &str = "Contraseña restablecida exitosamente";

/// Authentication operations
pub struct AuthService<S> {
    gateway: Gateway<S>,
    endpoints: AuthEndpoints,
}

impl<S: SessionStore> AuthService<S> {
    pub fn new(gateway: Gateway<S>, endpoints: AuthEndpoints) -> Self {
        Self { gateway, endpoints }
    }

    /// Gateway the service sends requests through
    pub fn gateway(&self) -> &Gateway<S> {
        &self.gateway
    }

    /// Logs in with email and password, storing the issued credentials
    ///
    /// On rejection the previously stored credentials are left untouched.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, Error> {
        let request = ApiRequest::post(&self.endpoints.login).json(&Login { email, password })?;
        let response = self.gateway.send_anonymous(&request).await?;
        let authenticated: Authenticated = parse(response).await?;

        self.establish(authenticated).await
    }

    /// Registers a new user, storing the issued credentials
    pub async fn register(&self, new_user: &NewUser) -> Result<User, Error> {
        let request = ApiRequest::post(&self.endpoints.register).json(new_user)?;
        let response = self.gateway.send_anonymous(&request).await?;
        let authenticated: Authenticated = parse(response).await?;

        self.establish(authenticated).await
    }

    /// Notifies the backend and clears the session
    ///
    /// The session is cleared even if the backend call fails.
    pub async fn logout(&self) -> Result<(), Error> {
        match self
            .gateway
            .send(&ApiRequest::post(&self.endpoints.logout))
            .await
        {
            Ok(response) if !response.status().is_success() => {
                debug!(status = %response.status(), "Logout not acknowledged");
            }
            Ok(_) => {}
            Err(err) => debug!(error = %err, "Logout call failed"),
        }

        self.gateway
            .session()
            .clear()
            .await
            .map_err(gateway::Error::from)?;
        info!("Logged out");
        Ok(())
    }

    /// Fetches the profile of the authenticated user
    pub async fn profile(&self) -> Result<Profile, Error> {
        let response = self.gateway.get(&self.endpoints.profile).await?;
        parse(response).await
    }

    /// Partially updates the profile of the authenticated user
    pub async fn update_profile(&self, changes: Value) -> Result<Profile, Error> {
        let response = self
            .gateway
            .patch(&self.endpoints.profile, changes)
            .await?;
        parse(response).await
    }

    /// Changes the password of the authenticated user, returning the confirmation message
    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<String, Error> {
        let request = ApiRequest::post(&self.endpoints.change_password).json(&PasswordChange {
            old_password,
            new_password,
        })?;
        let response = self.gateway.send(&request).await?;
        confirm(response, PASSWORD_CHANGED).await
    }

    /// Asks the backend to send a password reset link to `email`
    ///
    /// Sent without credentials, the user is not expected to be logged in.
    pub async fn request_password_reset(&self, email: &str) -> Result<String, Error> {
        let request = ApiRequest::post(&self.endpoints.password_reset)
            .json(&PasswordResetRequest { email })?;
        let response = self.gateway.send_anonymous(&request).await?;
        confirm(response, PASSWORD_RESET_REQUESTED).await
    }

    /// Sets a new password using the token from the reset link
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<String, Error> {
        let request = ApiRequest::post(&self.endpoints.password_reset_confirm).json(
            &PasswordReset {
                token,
                new_password,
            },
        )?;
        let response = self.gateway.send_anonymous(&request).await?;
        confirm(response, PASSWORD_RESET).await
    }

    /// Lists users, administrators only
    ///
    /// The response is returned as sent by the backend, which decides on pagination.
    pub async fn users(&self, filters: &[(&str, &str)]) -> Result<Value, Error> {
        let request = filters.iter().fold(
            ApiRequest::get(&self.endpoints.users),
            |request, (key, value)| request.query(*key, value),
        );
        let response = self.gateway.send(&request).await?;
        parse(response).await
    }

    /// Creates a user, administrators only
    pub async fn create_user(&self, user: Value) -> Result<Value, Error> {
        let response = self.gateway.post(&self.endpoints.users, user).await?;
        parse(response).await
    }

    /// Partially updates a user, administrators only
    pub async fn update_user(&self, id: &UserId, changes: Value) -> Result<Value, Error> {
        let response = self.gateway.patch(self.user_path(id), changes).await?;
        parse(response).await
    }

    /// Deletes a user, administrators only
    pub async fn delete_user(&self, id: &UserId) -> Result<(), Error> {
        let response = self.gateway.delete(self.user_path(id)).await?;
        check(response).await?;
        info!(user = %id, "User deleted");
        Ok(())
    }

    fn user_path(&self, id: &UserId) -> String {
        format!("{}/{id}/", self.endpoints.users.trim_end_matches('/'))
    }

    /// Exchanges the refresh token for a new access token
    pub async fn refresh(&self) -> Result<Credentials, Error> {
        Ok(self.gateway.refresh().await?)
    }

    async fn establish(&self, authenticated: Authenticated) -> Result<User, Error> {
        self.gateway
            .session()
            .save(&authenticated.tokens)
            .await
            .map_err(gateway::Error::from)?;

        info!(
            user = %authenticated.user.id,
            message = authenticated.message.as_deref().unwrap_or_default(),
            "Session established"
        );
        Ok(authenticated.user)
    }
}

/// Turns error statuses into `Error::Rejected`
async fn check(response: Response) -> Result<Response, Error> {
    if !response.status().is_success() {
        return Err(Error::Rejected(api_error::message(response).await));
    }

    Ok(response)
}

/// Parses successful response body
async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    check(response)
        .await?
        .json()
        .await
        .map_err(Error::UnexpectedResponse)
}

/// Confirmation message of a successful call, `default` if the backend sent none
async fn confirm(response: Response, default: &str) -> Result<String, Error> {
    let confirmation: Confirmation = parse(response).await?;
    Ok(confirmation.message.unwrap_or_else(|| default.to_owned()))
}
