//! Staff dashboard and applicant account administration.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use super::{see_other, PortalState, SignedInStaff};
use crate::applications::{ApplicationSummary, StatusCounts};
use crate::payments::{PaymentProcessor, RevenueSummary};
use crate::store::Store;

const RECENT_APPLICATIONS: usize = 5;

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub staff: String,
    pub applications: StatusCounts,
    pub revenue: RevenueSummary,
    pub recent_applications: Vec<ApplicationSummary>,
}

pub fn console_router<S, P>() -> Router<PortalState<S, P>>
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    Router::new()
        .route("/admin/dashboard", get(dashboard_handler::<S, P>))
        .route("/admin/users", get(users_handler::<S, P>))
        .route("/admin/users/purge", post(purge_handler::<S, P>))
}

async fn dashboard_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    staff: SignedInStaff,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    let applications = match state.admissions.status_counts() {
        Ok(counts) => counts,
        Err(err) => return err.into_response(),
    };
    let revenue = match state.ledger.revenue() {
        Ok(revenue) => revenue,
        Err(err) => return err.into_response(),
    };
    let recent_applications = match state.admissions.recent(RECENT_APPLICATIONS) {
        Ok(recent) => recent,
        Err(err) => return err.into_response(),
    };

    Json(DashboardStats {
        staff: staff.account.full_name,
        applications,
        revenue,
        recent_applications,
    })
    .into_response()
}

async fn users_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    staff: SignedInStaff,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.identity.applicants(&staff.account) {
        Ok(applicants) => Json(json!({ "applicants": applicants })).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn purge_handler<S, P>(
    State(state): State<PortalState<S, P>>,
    staff: SignedInStaff,
) -> Response
where
    S: Store,
    P: PaymentProcessor + 'static,
{
    match state.identity.purge_applicants(&staff.account) {
        Ok(report) => see_other(
            "/admin/users",
            json!({ "message": "applicant data purged", "removed": report }),
        ),
        Err(err) => err.into_response(),
    }
}
