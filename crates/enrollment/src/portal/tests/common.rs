use axum::http::StatusCode;

use crate::applications::ApplicationId;
use crate::fixtures::{multipart_post, submission_fields, TestPortal};
use crate::store::ApplicationRepository;

/// Submits the standard form for the signed-in guardian and returns the new id.
pub(super) async fn submit_application(portal: &TestPortal, cookie: &str) -> ApplicationId {
    let response = portal
        .send(multipart_post(
            "/application",
            cookie,
            &submission_fields(),
            &[],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    portal.store.applications(Some(1)).expect("list")[0].id
}
