//! User identity carried by access tokens
//!
//! Access tokens are JWTs issued by the backend. The client never verifies their signature - it
//! only reads the payload to know who is logged in and until when. Authorization decisions are
//! always made by the backend.

use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid token format")]
    InvalidTokenFormat,
    #[error("Invalid token payload encoding")]
    InvalidEncoding(#[from] base64::DecodeError),
    #[error("Invalid token claims")]
    InvalidClaims(#[from] serde_json::Error),
    #[error("Invalid expiration claim {0}")]
    InvalidExpiration(i64),
}

/// Backend user identifier
///
/// The backend emits numeric ids, but they are only ever passed back, so textual ids are accepted
/// as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Numeric(i64),
    Text(String),
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Text(id) => write!(f, "{id}"),
        }
    }
}

/// Condominium user role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrador,
    Seguridad,
    Mantenimiento,
    Residente,
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Position in the role hierarchy, higher is more privileged
    pub fn level(self) -> u8 {
        match self {
            Self::Administrador => 4,
            Self::Seguridad => 3,
            Self::Mantenimiento => 2,
            Self::Residente => 1,
            Self::Unknown => 0,
        }
    }

    /// Checks if this role grants at least the privileges of `required`
    pub fn has_permission(self, required: Role) -> bool {
        self.level() >= required.level()
    }
}

/// Claims read from the access token payload
#[derive(Debug, Deserialize)]
struct Claims {
    user_id: Option<UserId>,
    username: Option<String>,
    email: Option<String>,
    rol: Option<Role>,
    exp: Option<i64>,
}

/// Identity of the authenticated user
///
/// Never stored on its own, always decoded from the current access token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    /// Decodes the identity from the access token payload
    pub fn from_token(token: &str) -> Result<Self, Error> {
        let mut segments = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(Error::InvalidTokenFormat);
        };

        let payload = BASE64_URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        let claims: Claims = serde_json::from_slice(&payload)?;

        let expires_at = claims
            .exp
            .map(|exp| DateTime::from_timestamp(exp, 0).ok_or(Error::InvalidExpiration(exp)))
            .transpose()?;

        Ok(Self {
            user_id: claims.user_id,
            username: claims.username,
            email: claims.email,
            role: claims.rol,
            expires_at,
        })
    }

    /// Checks if the token was expired at `now`. Tokens without expiration are considered expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at <= now)
    }

    /// Checks if the user role grants at least the privileges of `required`
    pub fn has_permission(&self, required: Role) -> bool {
        self.role.is_some_and(|role| role.has_permission(required))
    }

    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Administrador)
    }

    pub fn is_resident(&self) -> bool {
        self.role == Some(Role::Residente)
    }

    pub fn is_security(&self) -> bool {
        self.role == Some(Role::Seguridad)
    }

    pub fn is_maintenance(&self) -> bool {
        self.role == Some(Role::Mantenimiento)
    }
}

/// Builds an unsigned token with the given claims, good enough for payload decoding
#[cfg(test)]
pub(crate) fn unsigned_token(claims: &serde_json::Value) -> String {
    let header = BASE64_URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = BASE64_URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_full_claims() {
        let token = unsigned_token(&json!({
            "token_type": "access",
            "user_id": 7,
            "username": "ana",
            "email": "ana@condominio.com",
            "rol": "seguridad",
            "exp": 1_900_000_000,
        }));

        let identity = Identity::from_token(&token).unwrap();
        assert_eq!(
            identity,
            Identity {
                user_id: Some(UserId::Numeric(7)),
                username: Some("ana".to_owned()),
                email: Some("ana@condominio.com".to_owned()),
                role: Some(Role::Seguridad),
                expires_at: DateTime::from_timestamp(1_900_000_000, 0),
            }
        );
        assert!(identity.has_permission(Role::Mantenimiento));
        assert!(identity.has_permission(Role::Seguridad));
        assert!(!identity.has_permission(Role::Administrador));
        assert!(!identity.is_admin());
    }

    #[test]
    fn decode_minimal_claims() {
        let token = unsigned_token(&json!({ "user_id": "abc" }));

        let identity = Identity::from_token(&token).unwrap();
        assert_eq!(identity.user_id, Some(UserId::Text("abc".to_owned())));
        assert_eq!(identity.role, None);
        assert!(!identity.has_permission(Role::Residente));
        // No expiration means the token can't be trusted to be alive
        assert!(identity.is_expired_at(Utc::now()));
    }

    #[test]
    fn unknown_role() {
        let token = unsigned_token(&json!({ "rol": "conserje" }));

        let identity = Identity::from_token(&token).unwrap();
        assert_eq!(identity.role, Some(Role::Unknown));
        assert!(!identity.has_permission(Role::Residente));
    }

    #[test]
    fn expiration() {
        let now = Utc::now();
        let exp = now.timestamp() + 60;
        let token = unsigned_token(&json!({ "exp": exp }));

        let identity = Identity::from_token(&token).unwrap();
        assert!(!identity.is_expired_at(now));
        assert!(identity.is_expired_at(now + TimeDelta::seconds(61)));
    }

    #[test]
    fn malformed_tokens() {
        assert!(matches!(
            Identity::from_token("not-a-token"),
            Err(Error::InvalidTokenFormat)
        ));
        assert!(matches!(
            Identity::from_token("a.b.c.d"),
            Err(Error::InvalidTokenFormat)
        ));
        assert!(matches!(
            Identity::from_token("header.!!!.signature"),
            Err(Error::InvalidEncoding(_))
        ));

        let payload = BASE64_URL_SAFE_NO_PAD.encode("not json");
        assert!(matches!(
            Identity::from_token(&format!("header.{payload}.signature")),
            Err(Error::InvalidClaims(_))
        ));
    }

    #[test]
    fn role_checks() {
        let identity = |rol: &str| Identity::from_token(&unsigned_token(&json!({ "rol": rol }))).unwrap();

        let resident = identity("residente");
        assert!(resident.is_resident());
        assert!(!resident.is_security() && !resident.is_maintenance() && !resident.is_admin());

        assert!(identity("seguridad").is_security());
        assert!(identity("mantenimiento").is_maintenance());
        assert!(identity("administrador").is_admin());
        assert!(!identity("administrador").is_resident());
    }

    #[test]
    fn role_hierarchy() {
        assert!(Role::Administrador.has_permission(Role::Residente));
        assert!(Role::Residente.has_permission(Role::Residente));
        assert!(!Role::Residente.has_permission(Role::Mantenimiento));
        assert!(!Role::Unknown.has_permission(Role::Residente));
    }
}
