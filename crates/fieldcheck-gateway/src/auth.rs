//! Session-token authentication and collection access rules.
//!
//! Sessions are opaque bearer tokens (UUID v7) persisted in the
//! `sessions` collection; passwords are stored as argon2 hashes on the
//! `users` collection. Tokens stay valid until signout.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;

use crate::error::AppError;
use crate::registry::{self, CollectionSpec};
use crate::routes::AppState;

/// The resolved caller, attached as a request extension by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub session_token: String,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// How a handler intends to touch a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| AppError::internal(format!("Password hashing failed: {error}")))
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

/// Resolve the bearer token to a user before any storage access.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?.to_string();

    let sessions = registry::lookup("sessions")
        .ok_or_else(|| AppError::internal("sessions collection missing from registry"))?;
    let session = state
        .store
        .get_by_id(sessions, &token)?
        .ok_or_else(|| AppError::unauthorized("Unknown or expired session token"))?;
    let user_id = session
        .get("user_id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::internal("session record has no user_id"))?
        .to_string();

    let users = registry::lookup("users")
        .ok_or_else(|| AppError::internal("users collection missing from registry"))?;
    let user = state
        .store
        .get_by_id(users, &user_id)?
        .ok_or_else(|| AppError::unauthorized("Session user no longer exists"))?;

    let authenticated = AuthenticatedUser {
        user_id,
        email: user
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        role: user
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or("inspector")
            .to_string(),
        session_token: token,
    };
    request.extensions_mut().insert(authenticated);
    Ok(next.run(request).await)
}

/// Enforce per-collection access rules.
///
/// Open collections are available to every authenticated session.
/// Restricted collections (`users`, `sessions`) require the admin role,
/// except that a caller may read their own records by filtering on their
/// own id, email, or user id.
pub fn authorize(
    user: &AuthenticatedUser,
    spec: &CollectionSpec,
    access: Access,
    filters: &[(String, String)],
) -> Result<(), AppError> {
    if !spec.restricted || user.is_admin() {
        return Ok(());
    }
    if access == Access::Write {
        return Err(AppError::forbidden(format!(
            "collection `{}` is writable by admins only",
            spec.name
        )));
    }

    let own_record = match spec.name {
        "users" => filters.iter().any(|(field, value)| {
            (field == "id" && value == &user.user_id)
                || (field == "email" && value == &user.email)
        }),
        "sessions" => filters
            .iter()
            .any(|(field, value)| field == "user_id" && value == &user.user_id),
        _ => false,
    };
    if own_record {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "collection `{}` is readable by admins or with an own-record filter",
            spec.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn inspector() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: "u1".to_string(),
            email: "tech@example.com".to_string(),
            role: "inspector".to_string(),
            session_token: "t".to_string(),
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password(&hash, "hunter2"));
        assert!(!verify_password(&hash, "hunter3"));
        assert!(!verify_password("not-a-hash", "hunter2"));
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc123");

        headers.insert("authorization", HeaderValue::from_static("Basic abc123"));
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn test_open_collections_allow_any_session() {
        let spec = registry::lookup("submissions").unwrap();
        assert!(authorize(&inspector(), spec, Access::Write, &[]).is_ok());
    }

    #[test]
    fn test_restricted_collection_requires_own_filter() {
        let spec = registry::lookup("users").unwrap();
        let user = inspector();

        let err = authorize(&user, spec, Access::Read, &[]).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let own = vec![("id".to_string(), "u1".to_string())];
        assert!(authorize(&user, spec, Access::Read, &own).is_ok());

        let someone_else = vec![("id".to_string(), "u2".to_string())];
        assert!(authorize(&user, spec, Access::Read, &someone_else).is_err());
    }

    #[test]
    fn test_admin_bypasses_restrictions() {
        let spec = registry::lookup("users").unwrap();
        let mut admin = inspector();
        admin.role = "admin".to_string();
        assert!(authorize(&admin, spec, Access::Write, &[]).is_ok());
    }
}
