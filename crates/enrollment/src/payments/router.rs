use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::json;

use super::domain::{PaymentAction, PaymentCategory, PaymentId};
use super::ledger::{LedgerError, PaymentRequest};
use super::processor::PaymentProcessor;
use crate::applications::ApplicationId;
use crate::portal::{
    error_response, internal_error, path_id, see_other, PortalState, SignedInApplicant,
    SignedInStaff,
};
use crate::store::Store;

/// Applicant payment pages, fee tills and the staff payment console.
pub fn payment_router<S, P>() -> Router<PortalState<S, P>>
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    Router::new()
        .route("/payment", get(current_payment::<S, P>))
        .route("/payment/:id", get(instructions_handler::<S, P>))
        .route("/payment/:id/process", post(process_handler::<S, P>))
        .route("/payments/:category", get(tills_handler::<S, P>))
        .route("/admin/payments", get(list_handler::<S, P>))
        .route("/admin/payment/:id/:action", get(action_handler::<S, P>))
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        match self {
            LedgerError::Validation(message) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, message)
            }
            LedgerError::NotFound => error_response(StatusCode::NOT_FOUND, self.to_string()),
            LedgerError::Unauthorized => error_response(StatusCode::FORBIDDEN, "unauthorized"),
            LedgerError::AlreadyCompleted | LedgerError::InvalidTransition(_) => {
                error_response(StatusCode::CONFLICT, self.to_string())
            }
            LedgerError::AccessDenied(denied) => {
                tracing::warn!(reason = %denied, "payment operation refused");
                error_response(StatusCode::FORBIDDEN, "access denied")
            }
            LedgerError::Processor(err) => {
                tracing::error!(error = %err, "payment processor unavailable");
                error_response(StatusCode::BAD_GATEWAY, "payment processing failed, please try again")
            }
            LedgerError::Repository(_) => internal_error(&self),
        }
    }
}

/// Sends the applicant to their newest unpaid application, or to the form.
async fn current_payment<S, P>(
    State(state): State<PortalState<S, P>>,
    applicant: SignedInApplicant,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.admissions.outstanding_for(&applicant.account) {
        Ok(Some(application)) => see_other(
            &format!("/payment/{}", application.id),
            json!({ "application_id": application.id }),
        ),
        Ok(None) => see_other(
            "/application",
            json!({ "message": "no application is awaiting payment" }),
        ),
        Err(err) => err.into_response(),
    }
}

async fn instructions_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    applicant: SignedInApplicant,
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
    match state.ledger.instructions(&applicant.account, id) {
        Ok(instructions) => Json(instructions).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn process_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    applicant: SignedInApplicant,
    Path(id): Path<String>,
    Form(request): Form<PaymentRequest>,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    let id = match path_id(&id, "application") {
        Ok(id) => ApplicationId(id),
        Err(response) => return response,
    };
    match state.ledger.process(&applicant.account, id, &request) {
        Ok(processed) if processed.paid => see_other(
            "/",
            json!({
                "message": "payment completed successfully",
                "payment": processed.payment,
            }),
        ),
        Ok(processed) => see_other(
            &format!("/payment/{id}"),
            json!({
                "error": "payment was not completed, please try again",
                "payment": processed.payment,
            }),
        ),
        Err(err) => err.into_response(),
    }
}

async fn tills_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    _applicant: SignedInApplicant,
    Path(category): Path<String>,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    let Ok(category) = category.parse::<PaymentCategory>() else {
        return LedgerError::NotFound.into_response();
    };
    match state.ledger.category_tills(category) {
        Ok(tills) => Json(json!({
            "category": category,
            "tills": tills,
        }))
        .into_response(),
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
    match state.ledger.list(&staff.account) {
        Ok(payments) => Json(json!({ "payments": payments })).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn action_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    staff: SignedInStaff,
    Path((id, action)): Path<(String, String)>,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    let id = match path_id(&id, "payment") {
        Ok(id) => PaymentId(id),
        Err(response) => return response,
    };
    let Ok(action) = action.parse::<PaymentAction>() else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown action '{action}'"));
    };

    match state.ledger.apply(&staff.account, id, action) {
        Ok(payment) => Json(json!({
            "message": format!("payment {}", action.past_tense()),
            "payment": payment,
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}
