use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use super::domain::{ApplicationId, ApplicationSubmission, Decision, PhotoRole, PhotoUpload};
use super::service::AdmissionError;
use crate::payments::PaymentProcessor;
use crate::portal::{
    error_response, internal_error, path_id, see_other, PortalState, SignedInApplicant,
    SignedInStaff,
};
use crate::site::FileStoreError;
use crate::store::Store;

/// Application form uploads carry up to three photos.
pub const APPLICATION_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Applicant submission plus the staff review routes.
pub fn application_router<S, P>() -> Router<PortalState<S, P>>
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    Router::new()
        .route(
            "/application",
            get(application_form::<S, P>)
                .post(submit_handler::<S, P>)
                .layer(DefaultBodyLimit::max(APPLICATION_BODY_LIMIT)),
        )
        .route("/admin/applications", get(list_handler::<S, P>))
        .route("/admin/application/:id", get(detail_handler::<S, P>))
        .route(
            "/admin/application/:id/:decision",
            get(decision_handler::<S, P>),
        )
}

fn payment_redirect(id: ApplicationId, message: &str) -> Response {
    see_other(
        &format!("/payment/{id}"),
        json!({ "message": message, "application_id": id }),
    )
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        match self {
            AdmissionError::Validation(violation) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, violation.to_string())
            }
            AdmissionError::PaymentOutstanding(id) => payment_redirect(
                id,
                "you already have an application awaiting payment",
            ),
            AdmissionError::NotFound(_) => error_response(StatusCode::NOT_FOUND, self.to_string()),
            AdmissionError::AlreadyDecided(_) => {
                error_response(StatusCode::CONFLICT, self.to_string())
            }
            AdmissionError::AccessDenied(denied) => {
                tracing::warn!(reason = %denied, "application operation refused");
                error_response(StatusCode::FORBIDDEN, "access denied")
            }
            AdmissionError::Files(FileStoreError::InvalidName(name)) => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("invalid photo file name '{name}'"),
            ),
            AdmissionError::Files(_) | AdmissionError::Repository(_) => internal_error(&self),
        }
    }
}

async fn application_form<S, P>(
    State(state): State<PortalState<S, P>>,
    applicant: SignedInApplicant,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.admissions.outstanding_for(&applicant.account) {
        Ok(Some(existing)) => payment_redirect(
            existing.id,
            "please complete payment for your existing application",
        ),
        Ok(None) => Json(json!({
            "form": "application",
            "applicant": applicant.account.full_name(),
            "photo_fields": ["father_photo", "mother_photo", "guardian_photo"],
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Splits the multipart body into text fields and photo files.
async fn read_submission(
    mut multipart: Multipart,
) -> Result<(ApplicationSubmission, Vec<PhotoUpload>), Response> {
    let bad_request = |err: axum::extract::multipart::MultipartError| {
        tracing::debug!(error = %err, "unreadable application form");
        error_response(StatusCode::BAD_REQUEST, "malformed application form")
    };

    let mut fields = Map::new();
    let mut photos = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if let Some(role) = PhotoRole::from_field(&name) {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(bad_request)?;
            photos.push(PhotoUpload {
                role,
                file_name,
                bytes: bytes.to_vec(),
            });
        } else {
            let text = field.text().await.map_err(bad_request)?;
            fields.insert(name, Value::String(text));
        }
    }

    let submission = serde_json::from_value(Value::Object(fields)).map_err(|err| {
        tracing::debug!(error = %err, "application form did not map onto the submission");
        error_response(StatusCode::BAD_REQUEST, "malformed application form")
    })?;
    Ok((submission, photos))
}

pub(crate) async fn submit_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    applicant: SignedInApplicant,
    multipart: Multipart,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    let (submission, photos) = match read_submission(multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    match state
        .admissions
        .submit(&applicant.account, submission, photos)
    {
        Ok(application) => payment_redirect(
            application.id,
            "application submitted, please complete the payment",
        ),
        Err(err) => err.into_response(),
    }
}

async fn list_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    staff: SignedInStaff,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.admissions.list(&staff.account) {
        Ok(applications) => Json(json!({ "applications": applications })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn detail_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    staff: SignedInStaff,
    Path(id): Path<String>,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    let id = match path_id(&id, "application") {
        Ok(id) => ApplicationId(id),
        Err(response) => return response,
    };
    match state.admissions.get(&staff.account, id) {
        Ok(view) => Json(view).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn decision_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    staff: SignedInStaff,
    Path((id, decision)): Path<(String, String)>,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    let id = match path_id(&id, "application") {
        Ok(id) => ApplicationId(id),
        Err(response) => return response,
    };
    let Ok(decision) = decision.parse::<Decision>() else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown action '{decision}'"));
    };

    match state
        .admissions
        .decide(&staff.account, id, decision)
    {
        Ok(application) => Json(json!({
            "message": format!("application {}", application.status.label()),
            "application": application,
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}
