//! Authentication service tests

use serde_json::json;

use crate::auth::{
    AuthService, Error, NewUser, PASSWORD_CHANGED, PASSWORD_RESET_REQUESTED,
};
use crate::gateway::Error as GatewayError;
use crate::identity::{Role, UserId};
use crate::session::{ACCESS_TOKEN_KEY, Credentials, MemoryStore, SessionStore};
use crate::tests::{
    Backend, EMAIL, PASSWORD, RESET_TOKEN, api_config, closed_addr, file_gateway, memory_gateway,
};

fn service(backend: &Backend) -> AuthService<MemoryStore> {
    let api = api_config(backend.start());
    AuthService::new(memory_gateway(&api), api.auth)
}

fn new_user(password_confirmation: &str) -> NewUser {
    NewUser {
        username: "luis".to_owned(),
        email: "luis@condominio.com".to_owned(),
        password: "clave-segura".to_owned(),
        password_confirmation: password_confirmation.to_owned(),
        first_name: "Luis".to_owned(),
        last_name: "Rojas".to_owned(),
        phone: None,
    }
}

#[tokio::test]
async fn login_stores_credentials() {
    let backend = Backend::new();
    let service = service(&backend);

    let user = service.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(user.id, UserId::Numeric(1));
    assert_eq!(user.email, EMAIL);
    assert_eq!(user.username, "ana");
    assert_eq!(user.full_name, "Ana Pérez");
    assert_eq!(user.role, Some(Role::Residente));

    let session = service.gateway().session();
    assert!(session.credentials().await.unwrap().is_some());
    assert!(session.is_authenticated().await.unwrap());
    let identity = session.identity().await.unwrap().unwrap();
    assert_eq!(identity.email.as_deref(), Some(EMAIL));

    // Login is never authenticated
    assert_eq!(backend.login_calls(), vec![None]);
}

#[tokio::test]
async fn login_ignores_stale_credentials() {
    let backend = Backend::new();
    let service = service(&backend);
    let stale = backend.credentials(false, false);
    service.gateway().session().save(&stale).await.unwrap();

    service.login(EMAIL, PASSWORD).await.unwrap();

    assert_eq!(backend.login_calls(), vec![None]);
    assert!(backend.refresh_calls().is_empty());
    let credentials = service.gateway().session().credentials().await.unwrap();
    assert_ne!(credentials, Some(stale));
}

#[tokio::test]
async fn rejected_login_keeps_session() {
    let backend = Backend::new();
    let service = service(&backend);
    let current = Credentials::new("access", "refresh");
    service.gateway().session().save(&current).await.unwrap();

    let err = service.login(EMAIL, "incorrecta").await.unwrap_err();
    match err {
        Error::Rejected(message) => assert_eq!(message, "Credenciales inválidas"),
        err => panic!("Unexpected error: {err:?}"),
    }

    assert_eq!(
        service.gateway().session().credentials().await.unwrap(),
        Some(current)
    );
}

#[tokio::test]
async fn register() {
    let backend = Backend::new();
    let service = service(&backend);

    let user = service.register(&new_user("clave-segura")).await.unwrap();
    assert_eq!(user.id, UserId::Numeric(2));
    assert_eq!(user.username, "luis");
    assert_eq!(user.full_name, "Luis Rojas");
    assert_eq!(user.role, None);
    assert!(
        service
            .gateway()
            .session()
            .credentials()
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn register_with_mismatched_passwords() {
    let backend = Backend::new();
    let service = service(&backend);

    let err = service.register(&new_user("otra")).await.unwrap_err();
    assert!(matches!(err, Error::Rejected(message) if message == "Las contraseñas no coinciden"));
    assert_eq!(service.gateway().session().credentials().await.unwrap(), None);
}

#[tokio::test]
async fn logout_clears_session() {
    let backend = Backend::new();
    let service = service(&backend);
    service.login(EMAIL, PASSWORD).await.unwrap();

    service.logout().await.unwrap();

    assert_eq!(backend.logout_calls(), 1);
    assert_eq!(service.gateway().session().credentials().await.unwrap(), None);
}

#[tokio::test]
async fn logout_clears_session_when_backend_unreachable() {
    let api = api_config(closed_addr());
    let service = AuthService::new(memory_gateway(&api), api.auth);
    service
        .gateway()
        .session()
        .save(&Credentials::new("access", "refresh"))
        .await
        .unwrap();

    service.logout().await.unwrap();
    assert_eq!(service.gateway().session().credentials().await.unwrap(), None);
}

#[tokio::test]
async fn profile() {
    let backend = Backend::new();
    let service = service(&backend);
    service.login(EMAIL, PASSWORD).await.unwrap();

    let profile = service.profile().await.unwrap();
    assert_eq!(profile.role, Some(Role::Residente));
    assert_eq!(profile.unit.as_deref(), Some("4B"));
    assert_eq!(profile.building.as_deref(), Some("Torre Norte"));
    assert_eq!(profile.is_owner, Some(true));
    assert_eq!(profile.extra["contacto_emergencia"], json!(""));

    let profile = service
        .update_profile(json!({ "numero_unidad": "5A", "contacto_emergencia": "555-0101" }))
        .await
        .unwrap();
    assert_eq!(profile.unit.as_deref(), Some("5A"));
    assert_eq!(profile.extra["contacto_emergencia"], json!("555-0101"));
}

#[tokio::test]
async fn profile_recovers_from_expired_access_token() {
    let backend = Backend::new();
    let service = service(&backend);
    service
        .gateway()
        .session()
        .save(&backend.credentials(false, true))
        .await
        .unwrap();

    let profile = service.profile().await.unwrap();
    assert_eq!(profile.email.as_deref(), Some(EMAIL));
    assert_eq!(backend.refresh_calls().len(), 1);
}

#[tokio::test]
async fn profile_without_session() {
    let backend = Backend::new();
    let service = service(&backend);

    let err = service.profile().await.unwrap_err();
    assert!(matches!(err, Error::Gateway(GatewayError::SessionExpired)));
}

#[tokio::test]
async fn change_password() {
    let backend = Backend::new();
    let service = service(&backend);
    service.login(EMAIL, PASSWORD).await.unwrap();

    let message = service.change_password(PASSWORD, "nueva").await.unwrap();
    assert_eq!(message, PASSWORD_CHANGED);

    let err = service
        .change_password("incorrecta", "nueva")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected(message) if message == "Contraseña actual incorrecta"));
}

#[tokio::test]
async fn refresh_through_service() {
    let backend = Backend::new();
    let service = service(&backend);
    service.login(EMAIL, PASSWORD).await.unwrap();
    let before = service.gateway().session().credentials().await.unwrap().unwrap();

    let after = service.refresh().await.unwrap();
    assert_ne!(before.access, after.access);
    assert_eq!(before.refresh, after.refresh);
}

#[tokio::test]
async fn malformed_session_file_replaced_on_login_and_logout() {
    let backend = Backend::new();
    let api = api_config(backend.start());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.toml");
    tokio::fs::write(&path, "accessToken = \"abc").await.unwrap();
    let service = AuthService::new(file_gateway(&api, &path), api.auth);

    let user = service.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(user.email, EMAIL);
    assert_eq!(backend.login_calls().len(), 1);
    assert!(service.gateway().session().is_authenticated().await.unwrap());

    tokio::fs::write(&path, "accessToken = \"abc").await.unwrap();
    service.logout().await.unwrap();
    assert_eq!(
        service
            .gateway()
            .session()
            .store()
            .get(ACCESS_TOKEN_KEY)
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn password_reset() {
    let backend = Backend::new();
    let service = service(&backend);
    let stale = backend.credentials(false, false);
    service.gateway().session().save(&stale).await.unwrap();

    let message = service.request_password_reset(EMAIL).await.unwrap();
    assert_eq!(message, PASSWORD_RESET_REQUESTED);

    let message = service
        .confirm_password_reset(RESET_TOKEN, "nueva")
        .await
        .unwrap();
    assert_eq!(message, "Contraseña restablecida");

    let err = service
        .confirm_password_reset("caducado", "nueva")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected(message) if message == "Token inválido o expirado"));

    // Reset never goes through the session
    assert_eq!(backend.reset_calls(), vec![None, None, None]);
    assert!(backend.refresh_calls().is_empty());
}

#[tokio::test]
async fn user_administration() {
    let backend = Backend::new();
    let service = service(&backend);
    service.login(EMAIL, PASSWORD).await.unwrap();

    let created = service
        .create_user(json!({ "email": "guardia@condominio.com", "rol": "seguridad" }))
        .await
        .unwrap();
    let id = UserId::Numeric(created["id"].as_i64().unwrap());
    service
        .create_user(json!({ "email": "luis@condominio.com", "rol": "residente" }))
        .await
        .unwrap();

    let listed = service.users(&[("rol", "seguridad")]).await.unwrap();
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["results"][0]["email"], "guardia@condominio.com");

    let updated = service
        .update_user(&id, json!({ "rol": "mantenimiento" }))
        .await
        .unwrap();
    assert_eq!(updated["rol"], "mantenimiento");

    service.delete_user(&id).await.unwrap();
    assert_eq!(backend.users().len(), 1);

    let err = service.delete_user(&id).await.unwrap_err();
    assert!(matches!(err, Error::Rejected(message) if message == "No encontrado."));

    let err = service.create_user(json!({ "rol": "residente" })).await.unwrap_err();
    assert!(matches!(err, Error::Rejected(message) if message == "Este campo es requerido."));
}

#[tokio::test]
async fn user_administration_requires_session() {
    let backend = Backend::new();
    let service = service(&backend);

    let err = service.users(&[]).await.unwrap_err();
    assert!(matches!(err, Error::Gateway(GatewayError::SessionExpired)));
}
