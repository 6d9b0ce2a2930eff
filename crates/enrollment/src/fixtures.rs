//! Shared builders for unit tests across modules.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::applications::{
    ApplicationId, ApplicationSubmission, GuardianDetails, NewApplication, ParentDetails,
    StudentDetails,
};
use crate::config::SessionConfig;
use crate::identity::{
    ApplicantId, NewApplicant, NewStaff, PermissionSet, StaffAccount, StaffRole,
};
use crate::payments::{
    generate_transaction_id, Amount, FeeSchedule, NewPayment, PaymentCategory,
    SimulatedProcessor,
};
use crate::portal::{portal_router, PortalState};
use crate::site::{ContentStore, FileStore};
use crate::store::MemoryStore;

pub(crate) fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0)
        .single()
        .expect("valid timestamp")
        + Duration::minutes(minutes)
}

pub(crate) fn new_applicant(email: &str) -> NewApplicant {
    NewApplicant {
        first_name: "Asha".to_string(),
        middle_name: None,
        last_name: "Mushi".to_string(),
        email: email.to_string(),
        phone: "0712000000".to_string(),
        password_hash: "not-a-real-hash".to_string(),
        created_at: at(0),
    }
}

pub(crate) fn new_staff(email: &str, role: StaffRole, permissions: PermissionSet) -> NewStaff {
    NewStaff {
        email: email.to_string(),
        password_hash: "not-a-real-hash".to_string(),
        full_name: "Staff Member".to_string(),
        role,
        permissions,
        created_at: at(0),
    }
}

fn parent(first_name: &str, telephone: &str) -> ParentDetails {
    ParentDetails {
        first_name: first_name.to_string(),
        second_name: None,
        last_name: "Mushi".to_string(),
        occupation: "Teacher".to_string(),
        national_id: Some("19800101-12345-00001-01".to_string()),
        telephone: telephone.to_string(),
        address: "P.O. Box 100, Arusha".to_string(),
        street: Some("Njiro".to_string()),
        photo: None,
    }
}

pub(crate) fn new_application(applicant: ApplicantId, minutes: i64) -> NewApplication {
    NewApplication {
        applicant_id: applicant,
        student: StudentDetails {
            first_name: "Neema".to_string(),
            second_name: Some("Grace".to_string()),
            surname: "Mushi".to_string(),
            nationality: "Tanzanian".to_string(),
            gender: "Female".to_string(),
            religion: None,
            date_of_birth: NaiveDate::from_ymd_opt(2015, 3, 1).expect("valid date"),
            place_of_birth: "Arusha".to_string(),
        },
        father: parent("Juma", "0713000000"),
        mother: parent("Rehema", "0714000000"),
        guardian: Some(GuardianDetails {
            first_name: Some("Baraka".to_string()),
            telephone: Some("0715000000".to_string()),
            ..GuardianDetails::default()
        }),
        submitted_at: at(minutes),
    }
}

pub(crate) fn new_payment(
    application: ApplicationId,
    applicant: ApplicantId,
    amount: Amount,
    category: Option<PaymentCategory>,
    minutes: i64,
) -> NewPayment {
    NewPayment {
        application_id: application,
        applicant_id: applicant,
        amount,
        payment_method: "mobile_money".to_string(),
        transaction_id: generate_transaction_id(),
        phone_number: "0712000000".to_string(),
        category,
        created_at: at(minutes),
        notes: None,
    }
}

/// A form as a guardian would post it, with every required field filled.
pub(crate) fn submission() -> ApplicationSubmission {
    ApplicationSubmission {
        first_name: "Neema".to_string(),
        second_name: "Grace".to_string(),
        surname: "Mushi".to_string(),
        nationality: "Tanzanian".to_string(),
        gender: "Female".to_string(),
        religion: String::new(),
        date_of_birth: "2015-03-01".to_string(),
        place_of_birth: "Arusha".to_string(),
        father_first_name: "Juma".to_string(),
        father_last_name: "Mushi".to_string(),
        father_occupation: "Teacher".to_string(),
        father_telephone: "0713000000".to_string(),
        father_address: "P.O. Box 100, Arusha".to_string(),
        mother_first_name: "Rehema".to_string(),
        mother_last_name: "Mushi".to_string(),
        mother_occupation: "Nurse".to_string(),
        mother_telephone: "0714000000".to_string(),
        mother_address: "P.O. Box 100, Arusha".to_string(),
        ..ApplicationSubmission::default()
    }
}

/// Full portal router over a memory store and a scratch static directory.
pub(crate) struct TestPortal {
    pub(crate) router: Router,
    pub(crate) state: PortalState<MemoryStore, SimulatedProcessor>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) dir: TempDir,
}

pub(crate) const TEST_PASSWORD: &str = "secret-pass";

impl TestPortal {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(MemoryStore::new());
        let state = PortalState::from_parts(
            store.clone(),
            Arc::new(SimulatedProcessor),
            FeeSchedule::default(),
            Arc::new(FileStore::under(&dir.path().join("static"))),
            Arc::new(ContentStore::new(dir.path().join("data").join("site_content.json"))),
        );
        let router = portal_router(state.clone(), &SessionConfig::default());
        Self {
            router,
            state,
            store,
            dir,
        }
    }

    pub(crate) fn static_dir(&self) -> PathBuf {
        self.dir.path().join("static")
    }

    pub(crate) async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("route executes")
    }

    /// Signs a new guardian up through `/signup` and returns their session cookie.
    pub(crate) async fn applicant_cookie(&self, email: &str) -> String {
        let signup = self
            .send(form_post(
                "/signup",
                &format!(
                    "first_name=Asha&last_name=Mushi&email={email}&phone=0712000000\
                     &password={TEST_PASSWORD}&confirm_password={TEST_PASSWORD}"
                ),
                None,
            ))
            .await;
        assert_eq!(signup.status(), StatusCode::SEE_OTHER);

        let login = self
            .send(form_post(
                "/login",
                &format!("email={email}&password={TEST_PASSWORD}"),
                None,
            ))
            .await;
        assert_eq!(login.status(), StatusCode::SEE_OTHER);
        session_cookie(&login)
    }

    /// Creates a staff account and signs it in through `/admin/login`.
    pub(crate) async fn staff_cookie(
        &self,
        email: &str,
        role: StaffRole,
        permissions: PermissionSet,
    ) -> (StaffAccount, String) {
        let account = self
            .state
            .identity
            .create_staff(email, TEST_PASSWORD, "Staff Member", role, permissions)
            .expect("staff created");
        let login = self
            .send(form_post(
                "/admin/login",
                &format!("email={email}&password={TEST_PASSWORD}"),
                None,
            ))
            .await;
        assert_eq!(login.status(), StatusCode::SEE_OTHER);
        (account, session_cookie(&login))
    }
}

pub(crate) fn session_cookie(response: &Response) -> String {
    let header = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie set")
        .to_str()
        .expect("ascii cookie");
    header
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string()
}

pub(crate) fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .expect("ascii location")
}

pub(crate) fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request")
}

pub(crate) fn form_post(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

const BOUNDARY: &str = "enrollment-test-boundary";

/// `multipart/form-data` body with text fields followed by `(field, file name, bytes)`
/// file parts.
pub(crate) fn multipart_post(
    uri: &str,
    cookie: &str,
    fields: &[(&str, &str)],
    files: &[(&str, &str, &[u8])],
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, file_name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                 filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .expect("request")
}

/// The application form as multipart text fields.
pub(crate) fn submission_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("first_name", "Neema"),
        ("second_name", "Grace"),
        ("surname", "Mushi"),
        ("nationality", "Tanzanian"),
        ("gender", "Female"),
        ("date_of_birth", "2015-03-01"),
        ("place_of_birth", "Arusha"),
        ("father_first_name", "Juma"),
        ("father_last_name", "Mushi"),
        ("father_occupation", "Teacher"),
        ("father_telephone", "0713000000"),
        ("father_address", "P.O. Box 100, Arusha"),
        ("mother_first_name", "Rehema"),
        ("mother_last_name", "Mushi"),
        ("mother_occupation", "Nurse"),
        ("mother_telephone", "0714000000"),
        ("mother_address", "P.O. Box 100, Arusha"),
    ]
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
