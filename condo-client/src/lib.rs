//! Client for the smart condominium REST API
//!
//! The [`gateway::Gateway`] attaches session credentials to every request and transparently
//! recovers from an expired access token once. [`auth::AuthService`] establishes and tears down
//! the session.

pub mod api_error;
pub mod auth;
pub mod config;
pub mod gateway;
pub mod identity;
pub mod session;
