use axum::http::StatusCode;

use super::common::submit_application;
use crate::fixtures::{form_post, get, location, read_json_body, TestPortal};
use crate::identity::{Permission, PermissionSet, StaffRole};
use crate::payments::PaymentStatus;
use crate::store::{ApplicationRepository, PaymentRepository};

const PAYMENT_FORM: &str = "payment_method=M-Pesa&phone_number=0712000000";

#[tokio::test]
async fn payment_entry_point_follows_the_outstanding_application() {
    let portal = TestPortal::new();
    let cookie = portal.applicant_cookie("asha@example.com").await;

    let none = portal.send(get("/payment", Some(&cookie))).await;
    assert_eq!(none.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&none), "/application");

    let id = submit_application(&portal, &cookie).await;
    let some = portal.send(get("/payment", Some(&cookie))).await;
    assert_eq!(location(&some), format!("/payment/{id}"));
}

#[tokio::test]
async fn instructions_show_the_application_till() {
    let portal = TestPortal::new();
    let cookie = portal.applicant_cookie("asha@example.com").await;
    let id = submit_application(&portal, &cookie).await;

    let response = portal
        .send(get(&format!("/payment/{id}"), Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["amount"], "10000.00");
    assert_eq!(payload["till"]["till"], "000000");
    assert_eq!(payload["student_name"], "Neema Grace Mushi");
    assert_eq!(payload["paid"], false);
}

#[tokio::test]
async fn processing_marks_the_fee_paid_without_deciding() {
    let portal = TestPortal::new();
    let cookie = portal.applicant_cookie("asha@example.com").await;
    let id = submit_application(&portal, &cookie).await;

    let response = portal
        .send(form_post(
            &format!("/payment/{id}/process"),
            PAYMENT_FORM,
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let application = portal
        .store
        .application(id)
        .expect("fetch")
        .expect("present");
    assert!(application.payment_completed);
    assert_eq!(
        application.status,
        crate::applications::ApplicationStatus::Pending
    );

    let again = portal
        .send(form_post(
            &format!("/payment/{id}/process"),
            PAYMENT_FORM,
            Some(&cookie),
        ))
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(portal.store.payments().expect("list").len(), 1);
}

#[tokio::test]
async fn other_guardians_cannot_pay_or_view() {
    let portal = TestPortal::new();
    let owner = portal.applicant_cookie("asha@example.com").await;
    let id = submit_application(&portal, &owner).await;
    let stranger = portal.applicant_cookie("juma@example.com").await;

    let view = portal
        .send(get(&format!("/payment/{id}"), Some(&stranger)))
        .await;
    assert_eq!(view.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json_body(view).await["error"], "unauthorized");

    let pay = portal
        .send(form_post(
            &format!("/payment/{id}/process"),
            PAYMENT_FORM,
            Some(&stranger),
        ))
        .await;
    assert_eq!(pay.status(), StatusCode::FORBIDDEN);
    assert!(portal.store.payments().expect("list").is_empty());

    let missing = portal.send(get("/payment/404", Some(&owner))).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_method_is_unprocessable() {
    let portal = TestPortal::new();
    let cookie = portal.applicant_cookie("asha@example.com").await;
    let id = submit_application(&portal, &cookie).await;

    let response = portal
        .send(form_post(
            &format!("/payment/{id}/process"),
            "phone_number=0712000000",
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn category_tills_need_a_signed_in_guardian() {
    let portal = TestPortal::new();

    let anonymous = portal.send(get("/payments/meals", None)).await;
    assert_eq!(anonymous.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&anonymous), "/login?next=/payments/meals");

    let cookie = portal.applicant_cookie("asha@example.com").await;
    let meals = portal.send(get("/payments/meals", Some(&cookie))).await;
    assert_eq!(meals.status(), StatusCode::OK);
    let payload = read_json_body(meals).await;
    assert_eq!(payload["category"], "meals");
    assert_eq!(payload["tills"][0]["amount"], "50000.00");

    for category in ["application", "books"] {
        let response = portal
            .send(get(&format!("/payments/{category}"), Some(&cookie)))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{category}");
    }
}

#[tokio::test]
async fn non_numeric_ids_are_not_found() {
    let portal = TestPortal::new();
    let cookie = portal.applicant_cookie("asha@example.com").await;

    let view = portal.send(get("/payment/abc", Some(&cookie))).await;
    assert_eq!(view.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json_body(view).await["error"], "application 'abc' not found");

    let pay = portal
        .send(form_post("/payment/abc/process", PAYMENT_FORM, Some(&cookie)))
        .await;
    assert_eq!(pay.status(), StatusCode::NOT_FOUND);

    let (_, bursar) = portal
        .staff_cookie(
            "bursar@satellite.ac.tz",
            StaffRole::Admin,
            PermissionSet::granted([Permission::ManagePayments]),
        )
        .await;
    let action = portal
        .send(get("/admin/payment/abc/complete", Some(&bursar)))
        .await;
    assert_eq!(action.status(), StatusCode::NOT_FOUND);
    assert!(portal.store.payments().expect("list").is_empty());
}

#[tokio::test]
async fn staff_payment_actions_need_manage_payments() {
    let portal = TestPortal::new();
    let cookie = portal.applicant_cookie("asha@example.com").await;
    let id = submit_application(&portal, &cookie).await;
    let applicant = portal
        .store
        .application(id)
        .expect("fetch")
        .expect("present")
        .applicant_id;
    let payment = portal
        .store
        .insert_payment(crate::fixtures::new_payment(
            id,
            applicant,
            crate::payments::Amount::from_major(10_000),
            None,
            1,
        ))
        .expect("payment");

    let (_, viewer) = portal
        .staff_cookie(
            "clerk@satellite.ac.tz",
            StaffRole::Admin,
            PermissionSet::granted([Permission::ViewPayments]),
        )
        .await;
    let listing = portal.send(get("/admin/payments", Some(&viewer))).await;
    assert_eq!(listing.status(), StatusCode::OK);
    let payload = read_json_body(listing).await;
    assert_eq!(payload["payments"][0]["category"], "application");

    let denied = portal
        .send(get(
            &format!("/admin/payment/{}/complete", payment.id),
            Some(&viewer),
        ))
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let (_, bursar) = portal
        .staff_cookie(
            "bursar@satellite.ac.tz",
            StaffRole::Admin,
            PermissionSet::granted([Permission::ManagePayments]),
        )
        .await;
    let completed = portal
        .send(get(
            &format!("/admin/payment/{}/complete", payment.id),
            Some(&bursar),
        ))
        .await;
    assert_eq!(completed.status(), StatusCode::OK);
    assert!(
        portal
            .store
            .application(id)
            .expect("fetch")
            .expect("present")
            .payment_completed
    );

    let invalid = portal
        .send(get(
            &format!("/admin/payment/{}/fail", payment.id),
            Some(&bursar),
        ))
        .await;
    assert_eq!(invalid.status(), StatusCode::CONFLICT);

    let unknown = portal
        .send(get(
            &format!("/admin/payment/{}/void", payment.id),
            Some(&bursar),
        ))
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let stored = portal
        .store
        .payment(payment.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, PaymentStatus::Completed);
}
