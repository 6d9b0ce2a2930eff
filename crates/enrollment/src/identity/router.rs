use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;

use super::domain::{Credentials, PrincipalKind, SignupForm};
use super::service::IdentityError;
use super::session::{Principal, SESSION_IDENTITY_KEY};
use crate::payments::PaymentProcessor;
use crate::portal::{
    error_response, internal_error, safe_next, see_other, PortalState, SignedInStaff, Visitor,
};
use crate::store::Store;

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// Signup, login and logout for both principal kinds.
pub fn identity_router<S, P>() -> Router<PortalState<S, P>>
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    Router::new()
        .route("/signup", get(signup_form).post(signup_handler::<S, P>))
        .route(
            "/login",
            get(login_form::<S, P>).post(applicant_login_handler::<S, P>),
        )
        .route("/logout", get(logout_handler::<S, P>))
        .route(
            "/admin/login",
            get(admin_login_form).post(staff_login_handler::<S, P>),
        )
        .route("/admin/logout", get(admin_logout_handler::<S, P>))
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        match self {
            IdentityError::Validation(message) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, message)
            }
            IdentityError::EmailTaken | IdentityError::StaffExists => {
                error_response(StatusCode::CONFLICT, self.to_string())
            }
            IdentityError::InvalidCredentials => {
                error_response(StatusCode::UNAUTHORIZED, self.to_string())
            }
            IdentityError::AccountDisabled => {
                error_response(StatusCode::FORBIDDEN, self.to_string())
            }
            IdentityError::AccessDenied(denied) => {
                tracing::warn!(reason = %denied, "identity operation refused");
                error_response(StatusCode::FORBIDDEN, "access denied")
            }
            IdentityError::Password(_) | IdentityError::Repository(_) => internal_error(&self),
        }
    }
}

async fn signup_form() -> Response {
    Json(json!({
        "form": "signup",
        "fields": [
            "first_name", "middle_name", "last_name", "email", "phone",
            "password", "confirm_password"
        ],
    }))
    .into_response()
}

pub(crate) async fn signup_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    Form(form): Form<SignupForm>,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.identity.signup(form) {
        Ok(account) => see_other(
            "/login",
            json!({
                "message": "account created, please log in",
                "applicant_id": account.id,
            }),
        ),
        Err(err) => err.into_response(),
    }
}

async fn login_form<S, P>(visitor: Visitor, Query(query): Query<NextQuery>) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    if let Some(Principal::Applicant(account)) = &visitor.principal {
        return see_other(
            &safe_next(query.next.as_deref(), "/"),
            json!({ "message": format!("already signed in as {}", account.email) }),
        );
    }
    Json(json!({
        "form": "login",
        "fields": ["email", "password", "place"],
        "next": query.next,
    }))
    .into_response()
}

async fn admin_login_form(Query(query): Query<NextQuery>) -> Response {
    Json(json!({
        "form": "admin_login",
        "fields": ["email", "password"],
        "next": query.next,
    }))
    .into_response()
}

pub(crate) async fn applicant_login_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    visitor: Visitor,
    Query(query): Query<NextQuery>,
    Form(credentials): Form<Credentials>,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    login(
        &state,
        &visitor.session,
        PrincipalKind::Applicant,
        &credentials,
        safe_next(query.next.as_deref(), "/"),
    )
    .await
}

pub(crate) async fn staff_login_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    visitor: Visitor,
    Query(query): Query<NextQuery>,
    Form(credentials): Form<Credentials>,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    login(
        &state,
        &visitor.session,
        PrincipalKind::Staff,
        &credentials,
        safe_next(query.next.as_deref(), "/admin/dashboard"),
    )
    .await
}

async fn login<S, P>(
    state: &PortalState<S, P>,
    session: &Session,
    kind: PrincipalKind,
    credentials: &Credentials,
    destination: String,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    let principal = match state.identity.authenticate(kind, credentials) {
        Ok(principal) => principal,
        Err(err) => {
            if matches!(err, IdentityError::InvalidCredentials) {
                tracing::info!(?kind, "failed login attempt");
            }
            return err.into_response();
        }
    };

    if let Err(err) = session.cycle_id().await {
        return internal_error(&err);
    }
    if let Err(err) = session
        .insert(SESSION_IDENTITY_KEY, principal.token().to_string())
        .await
    {
        return internal_error(&err);
    }

    see_other(
        &destination,
        json!({
            "message": format!("welcome, {}", principal.display_name()),
            "principal": principal,
        }),
    )
}

async fn logout_handler<S, P>(visitor: Visitor) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    if let Err(err) = visitor.session.flush().await {
        return internal_error(&err);
    }
    see_other("/", json!({ "message": "you have been logged out" }))
}

async fn admin_logout_handler<S, P>(staff: SignedInStaff) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    if let Err(err) = staff.session.flush().await {
        return internal_error(&err);
    }
    tracing::info!(staff_id = %staff.account.id, "staff signed out");
    see_other("/admin/login", json!({ "message": "you have been logged out" }))
}
