//! HTTP surface: shared state, session handling and the assembled router.

pub mod console;
pub mod extract;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_sessions::cookie::time::Duration;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore as SessionMemoryStore, SessionManagerLayer};

use crate::applications::{application_router, AdmissionService};
use crate::config::{SessionConfig, StorageConfig};
use crate::identity::{identity_router, IdentityService};
use crate::payments::{payment_router, FeeSchedule, PaymentLedger, PaymentProcessor};
use crate::site::{site_router, ContentStore, FileStore};
use crate::store::Store;

pub use console::console_router;
pub use extract::{AuthRejection, SignedInApplicant, SignedInStaff, Visitor};

pub const SESSION_COOKIE_NAME: &str = "enrollment_session";

/// Services shared by every handler.
pub struct PortalState<S, P> {
    pub identity: Arc<IdentityService<S>>,
    pub admissions: Arc<AdmissionService<S>>,
    pub ledger: Arc<PaymentLedger<S, P>>,
    pub content: Arc<ContentStore>,
    pub files: Arc<FileStore>,
}

impl<S, P> Clone for PortalState<S, P> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            admissions: Arc::clone(&self.admissions),
            ledger: Arc::clone(&self.ledger),
            content: Arc::clone(&self.content),
            files: Arc::clone(&self.files),
        }
    }
}

impl<S, P> PortalState<S, P>
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    pub fn new(
        store: Arc<S>,
        processor: Arc<P>,
        fees: FeeSchedule,
        storage: &StorageConfig,
    ) -> Self {
        let files = Arc::new(FileStore::new(storage));
        let content = Arc::new(ContentStore::new(storage.content_path()));
        Self::from_parts(store, processor, fees, files, content)
    }

    pub fn from_parts(
        store: Arc<S>,
        processor: Arc<P>,
        fees: FeeSchedule,
        files: Arc<FileStore>,
        content: Arc<ContentStore>,
    ) -> Self {
        Self {
            identity: Arc::new(IdentityService::new(store.clone())),
            admissions: Arc::new(AdmissionService::new(store.clone(), files.clone())),
            ledger: Arc::new(PaymentLedger::new(store, processor, fees)),
            content,
            files,
        }
    }
}

/// Every portal route behind the session layer.
pub fn portal_router<S, P>(state: PortalState<S, P>, config: &SessionConfig) -> Router
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    Router::new()
        .merge(site_router::<S, P>())
        .merge(identity_router::<S, P>())
        .merge(application_router::<S, P>())
        .merge(payment_router::<S, P>())
        .merge(console_router::<S, P>())
        .with_state(state)
        .layer(session_layer(config))
}

pub fn session_layer(config: &SessionConfig) -> SessionManagerLayer<SessionMemoryStore> {
    SessionManagerLayer::new(SessionMemoryStore::default())
        .with_name(SESSION_COOKIE_NAME)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(config.cookie_secure)
        .with_expiry(Expiry::OnInactivity(Duration::hours(config.lifetime_hours)))
}

/// `{"error": message}` with the given status.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Logs the failure and answers 500 without detail.
pub(crate) fn internal_error(err: &dyn std::error::Error) -> Response {
    tracing::error!(error = %err, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

/// 303 to `location`, carrying a JSON body for clients that do not follow redirects.
pub(crate) fn see_other(location: &str, body: Value) -> Response {
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, location.to_string())],
        Json(body),
    )
        .into_response()
}

/// Accepts only same-site absolute paths as a post-login destination.
pub(crate) fn safe_next(next: Option<&str>, fallback: &'static str) -> String {
    match next.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => fallback.to_string(),
    }
}

/// Numeric id from a path segment; anything else is an unknown record.
pub(crate) fn path_id(raw: &str, kind: &str) -> Result<i64, Response> {
    raw.parse::<i64>()
        .map_err(|_| error_response(StatusCode::NOT_FOUND, format!("{kind} '{raw}' not found")))
}
