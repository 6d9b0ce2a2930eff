use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tower_sessions::Session;

use super::{error_response, see_other, PortalState};
use crate::identity::{
    require_staff, AccessDenied, ApplicantAccount, IdentityToken, Principal, StaffAccount,
    SESSION_IDENTITY_KEY,
};
use crate::payments::PaymentProcessor;
use crate::store::Store;

/// The session and whoever it belongs to, if anyone.
pub struct Visitor {
    pub session: Session,
    pub principal: Option<Principal>,
}

/// A signed-in guardian. Anyone else is sent to `/login`.
pub struct SignedInApplicant {
    pub session: Session,
    pub account: ApplicantAccount,
}

/// A signed-in staff member. Anyone else is sent to `/admin/login`.
pub struct SignedInStaff {
    pub session: Session,
    pub account: StaffAccount,
}

/// Rejection for the session extractors.
#[derive(Debug)]
pub enum AuthRejection {
    SignIn { login: &'static str, next: String },
    Unavailable,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::SignIn { login, next } => see_other(
                &format!("{login}?next={next}"),
                json!({ "error": "please log in to access this page" }),
            ),
            AuthRejection::Unavailable => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error",
            ),
        }
    }
}

fn sign_in(login: &'static str, parts: &Parts) -> AuthRejection {
    AuthRejection::SignIn {
        login,
        next: parts.uri.path().to_string(),
    }
}

#[async_trait]
impl<S, P> FromRequestParts<PortalState<S, P>> for Visitor
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PortalState<S, P>,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(status, message)| {
                tracing::error!(%status, message, "session layer missing");
                AuthRejection::Unavailable
            })?;

        let raw = session
            .get::<String>(SESSION_IDENTITY_KEY)
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "session read failed");
                AuthRejection::Unavailable
            })?;
        let Some(raw) = raw else {
            return Ok(Self {
                session,
                principal: None,
            });
        };

        let token = match raw.parse::<IdentityToken>() {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed session identity");
                return Ok(Self {
                    session,
                    principal: None,
                });
            }
        };

        let principal = state.identity.resolve(token).map_err(|err| {
            tracing::error!(error = %err, "failed to resolve session identity");
            AuthRejection::Unavailable
        })?;
        Ok(Self { session, principal })
    }
}

#[async_trait]
impl<S, P> FromRequestParts<PortalState<S, P>> for SignedInApplicant
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PortalState<S, P>,
    ) -> Result<Self, Self::Rejection> {
        let visitor = Visitor::from_request_parts(parts, state).await?;
        match visitor.principal {
            Some(Principal::Applicant(account)) => Ok(Self {
                session: visitor.session,
                account,
            }),
            _ => Err(sign_in("/login", parts)),
        }
    }
}

#[async_trait]
impl<S, P> FromRequestParts<PortalState<S, P>> for SignedInStaff
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PortalState<S, P>,
    ) -> Result<Self, Self::Rejection> {
        let visitor = Visitor::from_request_parts(parts, state).await?;
        match require_staff(visitor.principal.as_ref()) {
            Ok(account) => Ok(Self {
                account: account.clone(),
                session: visitor.session,
            }),
            Err(AccessDenied::NotStaff) => {
                tracing::warn!(path = parts.uri.path(), "applicant tried a staff page");
                Err(sign_in("/admin/login", parts))
            }
            Err(_) => Err(sign_in("/admin/login", parts)),
        }
    }
}
