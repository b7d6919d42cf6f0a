//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with account scoping.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {secret}                       : operator (back office, payment gateway)
//! Bearer customer:{user_id}:{secret}    : customer, scoped to one account
//! Bearer operator::{secret}             : operator, explicit form
//! ```
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fulfil_core::UserId;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Role ────────────────────────────────────────────────────────────────────

/// Roles, ordered by privilege level (`Customer < Operator`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Account holder. Reads and writes only their own orders and balance.
    Customer,
    /// Full access, including deposits.
    Operator,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Operator => "operator",
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// The caller's role.
    pub role: Role,
    /// The account a customer is bound to. `None` for operators.
    pub user_id: Option<UserId>,
}

impl CallerIdentity {
    /// Operator identity, used when auth is disabled.
    pub fn operator() -> Self {
        Self {
            role: Role::Operator,
            user_id: None,
        }
    }

    /// Check if the caller has at least the given minimum role.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// Whether the caller may act on `user`'s account.
    pub fn can_act_for(&self, user: UserId) -> bool {
        match self.role {
            Role::Operator => true,
            Role::Customer => self.user_id == Some(user),
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Check that the caller may act on `user`'s account.
pub fn require_account_access(caller: &CallerIdentity, user: UserId) -> Result<(), AppError> {
    if caller.can_act_for(user) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "caller is not permitted to act on account {user}"
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token in the form `{role}:{user_id}:{secret}` or `{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity::operator())
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role, user, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }
            match *role {
                "operator" => Ok(CallerIdentity::operator()),
                "customer" => {
                    let id = user
                        .parse::<Uuid>()
                        .map_err(|e| format!("invalid user_id: {e}"))?;
                    Ok(CallerIdentity {
                        role: Role::Customer,
                        user_id: Some(UserId::from_uuid(id)),
                    })
                }
                other => Err(format!("unknown role: {other}")),
            }
        }
        _ => Err("invalid token format, expected {role}:{user_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the Bearer token and inject the [`CallerIdentity`].
///
/// When `AuthConfig.token` is `None`, every request runs as an operator.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
                Some(provided) => match parse_bearer_token(provided, expected) {
                    Ok(identity) => {
                        request.extensions_mut().insert(identity);
                        next.run(request).await
                    }
                    Err(msg) => {
                        tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                        unauthorized_response(&msg)
                    }
                },
                None if auth_header.is_some() => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            request.extensions_mut().insert(CallerIdentity::operator());
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Router echoing the caller's role.
    fn test_app(token: Option<&str>) -> Router {
        let auth_config = AuthConfig {
            token: token.map(|t| Zeroizing::new(t.to_string())),
        };
        Router::new()
            .route(
                "/whoami",
                get(|caller: CallerIdentity| async move { caller.role.as_str() }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(auth_config))
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn plain_secret_is_operator() {
        let (status, body) = call(test_app(Some("s3cret")), Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "operator");
    }

    #[tokio::test]
    async fn customer_token_is_scoped() {
        let user = Uuid::new_v4();
        let header = format!("Bearer customer:{user}:s3cret");
        let (status, body) = call(test_app(Some("s3cret")), Some(&header)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "customer");
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let (status, body) = call(test_app(Some("s3cret")), Some("Bearer nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("UNAUTHORIZED"));
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let (status, _) = call(test_app(Some("s3cret")), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn basic_scheme_rejected() {
        let (status, body) = call(test_app(Some("s3cret")), Some("Basic s3cret")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer"));
    }

    #[tokio::test]
    async fn auth_disabled_runs_as_operator() {
        let (status, body) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "operator");
    }

    #[test]
    fn customer_token_with_bad_uuid_rejected() {
        let err = parse_bearer_token("customer:not-a-uuid:s3cret", "s3cret").unwrap_err();
        assert!(err.contains("user_id"));
    }

    #[test]
    fn unknown_role_rejected() {
        assert!(parse_bearer_token("admin::s3cret", "s3cret").is_err());
    }

    #[test]
    fn customer_cannot_act_for_someone_else() {
        let me = UserId::new();
        let caller = CallerIdentity {
            role: Role::Customer,
            user_id: Some(me),
        };
        assert!(caller.can_act_for(me));
        assert!(!caller.can_act_for(UserId::new()));
        assert!(require_role(&caller, Role::Operator).is_err());
        assert!(CallerIdentity::operator().can_act_for(UserId::new()));
    }

    #[test]
    fn auth_config_debug_redacts_token() {
        let config = AuthConfig {
            token: Some(Zeroizing::new("super-secret".into())),
        };
        let out = format!("{config:?}");
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("super-secret"));
    }
}
