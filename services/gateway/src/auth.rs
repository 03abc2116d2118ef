use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use types::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Bearer token claims. Tokens are issued by the registration service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub user_id: UserId,
    #[serde(default)]
    pub role: Role,
}

/// HS256 keys shared with the token issuer
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn issue(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::InternalError(e.into()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!(error = %e, "Rejected bearer token");
                AppError::Unauthorized(format!("Invalid token: {}", e))
            })
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Token from `Authorization: Bearer ...`, or from `?token=` for clients
/// that cannot set headers (browser WebSockets).
fn extract_token(parts: &Parts) -> Result<String, AppError> {
    if let Some(header) = parts.headers.get(AUTHORIZATION) {
        let value = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid header string".into()))?;
        return value
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .ok_or_else(|| AppError::Unauthorized("Expected a bearer token".into()));
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .ok_or_else(|| AppError::Unauthorized("Missing authentication credentials".into()))
}

pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub role: Role,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;
        let claims = state.jwt.verify(&token)?;
        Ok(AuthenticatedUser {
            user_id: claims.user_id,
            role: claims.role,
        })
    }
}

/// An authenticated user with the `admin` role
pub struct AdminUser {
    pub user_id: UserId,
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            tracing::warn!(user_id = %user.user_id, "Non-admin attempted admin access");
            return Err(AppError::Forbidden("Admin access required".into()));
        }
        Ok(AdminUser { user_id: user.user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn claims(role: Role, exp: usize) -> Claims {
        Claims {
            sub: "ana".into(),
            exp,
            user_id: UserId::new(3),
            role,
        }
    }

    fn far_future() -> usize {
        4_102_444_800 // 2100-01-01
    }

    fn parts(uri: &str, auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let keys = JwtKeys::new("secret");
        let token = keys.issue(&claims(Role::Admin, far_future())).unwrap();
        let verified = keys.verify(&token).unwrap();
        assert_eq!(verified.user_id, UserId::new(3));
        assert_eq!(verified.role, Role::Admin);
    }

    #[test]
    fn test_wrong_secret_and_expired_rejected() {
        let token = JwtKeys::new("other").issue(&claims(Role::User, far_future())).unwrap();
        assert!(matches!(JwtKeys::new("secret").verify(&token), Err(AppError::Unauthorized(_))));

        let keys = JwtKeys::new("secret");
        let expired = keys.issue(&claims(Role::User, 1_000)).unwrap();
        assert!(keys.verify(&expired).is_err());
    }

    #[test]
    fn test_token_sources() {
        assert_eq!(extract_token(&parts("/x", Some("Bearer abc"))).unwrap(), "abc");
        assert_eq!(extract_token(&parts("/ws/admin/tracking/?token=xyz", None)).unwrap(), "xyz");
        assert!(extract_token(&parts("/x", Some("Basic abc"))).is_err());
        assert!(extract_token(&parts("/x", None)).is_err());
    }

    #[test]
    fn test_role_defaults_to_user() {
        let claims: Claims =
            serde_json::from_str(r#"{"sub":"a","exp":1,"user_id":9}"#).unwrap();
        assert_eq!(claims.role, Role::User);
    }
}
