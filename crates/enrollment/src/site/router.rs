use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use serde_json::json;

use super::content::{ContentError, ContentUpdate};
use super::files::{FileStoreError, StoredFile};
use crate::payments::PaymentProcessor;
use crate::portal::{error_response, internal_error, see_other, PortalState, SignedInStaff};
use crate::store::Store;

const RESULT_FIELD: &str = "result_file";
const RESULT_BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Public pages and downloads, plus the staff pages that manage them.
pub fn site_router<S, P>() -> Router<PortalState<S, P>>
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    Router::new()
        .route("/", get(home_handler::<S, P>))
        .route("/announcement", get(announcement_handler::<S, P>))
        .route("/information", get(information_handler::<S, P>))
        .route("/download/:file", get(image_handler::<S, P>))
        .route("/results/:file", get(result_handler::<S, P>))
        .route("/results-list", get(results_list_handler::<S, P>))
        .route(
            "/admin/results",
            get(admin_results_handler::<S, P>)
                .post(upload_result_handler::<S, P>)
                .layer(DefaultBodyLimit::max(RESULT_BODY_LIMIT)),
        )
        .route(
            "/admin/content",
            get(admin_content_handler::<S, P>).post(update_content_handler::<S, P>),
        )
}

impl IntoResponse for FileStoreError {
    fn into_response(self) -> Response {
        match self {
            FileStoreError::InvalidName(_) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            FileStoreError::NotFound(_) => error_response(StatusCode::NOT_FOUND, self.to_string()),
            FileStoreError::Io(_) => internal_error(&self),
        }
    }
}

impl IntoResponse for ContentError {
    fn into_response(self) -> Response {
        internal_error(&self)
    }
}

impl IntoResponse for StoredFile {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, self.content_type)], self.bytes).into_response()
    }
}

async fn home_handler<S, P>(State(state): State<PortalState<S, P>>) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.content.load() {
        Ok(content) => Json(json!({ "site": content })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn announcement_handler<S, P>(State(state): State<PortalState<S, P>>) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.content.load() {
        Ok(content) => Json(json!({
            "title": content.announcement_title,
            "subtitle": content.announcement_subtitle,
            "message": content.announcement_message,
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn information_handler<S, P>(State(state): State<PortalState<S, P>>) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.content.load() {
        Ok(content) => Json(json!({ "information_html": content.information_html })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn image_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    Path(file): Path<String>,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.files.open_image(&file) {
        Ok(stored) => stored.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn result_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    Path(file): Path<String>,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.files.open_result(&file) {
        Ok(stored) => stored.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn results_list_handler<S, P>(State(state): State<PortalState<S, P>>) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.files.list_results() {
        Ok(results) => Json(json!({ "results": results })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn admin_results_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    _staff: SignedInStaff,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    results_list_handler(State(state)).await
}

pub(crate) async fn upload_result_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    staff: SignedInStaff,
    mut multipart: Multipart,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(error = %err, "unreadable result upload");
                return error_response(StatusCode::BAD_REQUEST, "malformed upload");
            }
        };
        if field.name() != Some(RESULT_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.trim().is_empty() {
            break;
        }
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(error = %err, "unreadable result upload");
                return error_response(StatusCode::BAD_REQUEST, "malformed upload");
            }
        };

        return match state.files.save_result(&file_name, &bytes) {
            Ok(name) => {
                tracing::info!(staff_id = %staff.account.id, file = %name, "result uploaded");
                see_other(
                    "/admin/results",
                    json!({ "message": "result uploaded", "file": name }),
                )
            }
            Err(err) => err.into_response(),
        };
    }

    error_response(StatusCode::UNPROCESSABLE_ENTITY, "no file selected")
}

async fn admin_content_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    _staff: SignedInStaff,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.content.load() {
        Ok(content) => Json(content).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn update_content_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    staff: SignedInStaff,
    Form(update): Form<ContentUpdate>,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.content.update(update) {
        Ok(content) => {
            tracing::info!(staff_id = %staff.account.id, "site content updated");
            Json(json!({ "message": "content updated", "site": content })).into_response()
        }
        Err(err) => err.into_response(),
    }
}
