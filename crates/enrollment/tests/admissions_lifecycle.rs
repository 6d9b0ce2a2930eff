use std::sync::Arc;

use enrollment::applications::{
    AdmissionError, AdmissionService, ApplicationStatus, ApplicationSubmission, Decision,
    PhotoRole, PhotoUpload,
};
use enrollment::identity::{
    ApplicantAccount, Credentials, IdentityError, IdentityService, Permission, PermissionSet,
    Principal, PrincipalKind, SignupForm, StaffAccount, StaffRole,
};
use enrollment::payments::{
    Amount, FeeSchedule, LedgerError, PaymentAction, PaymentCategory, PaymentLedger,
    PaymentRequest, PaymentStatus, SimulatedProcessor,
};
use enrollment::site::FileStore;
use enrollment::store::SqliteStore;
use tempfile::TempDir;

struct School {
    dir: TempDir,
    identity: IdentityService<SqliteStore>,
    admissions: AdmissionService<SqliteStore>,
    ledger: PaymentLedger<SqliteStore, SimulatedProcessor>,
}

impl School {
    fn open(dir: TempDir) -> Self {
        let store = Arc::new(
            SqliteStore::open(&dir.path().join("enrollment.db")).expect("database opens"),
        );
        let files = Arc::new(FileStore::under(&dir.path().join("static")));
        Self {
            identity: IdentityService::new(store.clone()),
            admissions: AdmissionService::new(store.clone(), files),
            ledger: PaymentLedger::new(store, Arc::new(SimulatedProcessor), FeeSchedule::default()),
            dir,
        }
    }

    fn register(&self, email: &str) -> ApplicantAccount {
        self.identity
            .signup(SignupForm {
                first_name: "Asha".to_string(),
                last_name: "Mushi".to_string(),
                email: email.to_string(),
                phone: "0712000000".to_string(),
                password: "guardian-pass".to_string(),
                confirm_password: "guardian-pass".to_string(),
                ..SignupForm::default()
            })
            .expect("signup succeeds");

        match self
            .identity
            .authenticate(
                PrincipalKind::Applicant,
                &Credentials {
                    email: email.to_string(),
                    password: "guardian-pass".to_string(),
                    place: Some("Arusha".to_string()),
                },
            )
            .expect("login succeeds")
        {
            Principal::Applicant(account) => account,
            Principal::Staff(_) => panic!("applicant login produced a staff principal"),
        }
    }

    fn staff(&self, email: &str, permissions: &[Permission]) -> StaffAccount {
        self.identity
            .create_staff(
                email,
                "staff-password",
                "Admissions Officer",
                StaffRole::Admin,
                PermissionSet::granted(permissions.iter().copied()),
            )
            .expect("staff created")
    }
}

fn submission() -> ApplicationSubmission {
    ApplicationSubmission {
        first_name: "Neema".to_string(),
        surname: "Mushi".to_string(),
        nationality: "Tanzanian".to_string(),
        gender: "Female".to_string(),
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

fn mpesa() -> PaymentRequest {
    PaymentRequest {
        payment_method: "M-Pesa".to_string(),
        phone_number: "0712000000".to_string(),
    }
}

#[test]
fn guardian_applies_pays_and_is_approved() {
    let school = School::open(tempfile::tempdir().expect("temp dir"));
    let guardian = school.register("asha@example.com");

    let photo = PhotoUpload {
        role: PhotoRole::Mother,
        file_name: "rehema.png".to_string(),
        bytes: b"\x89PNG".to_vec(),
    };
    let application = school
        .admissions
        .submit(&guardian, submission(), vec![photo])
        .expect("application stored");
    assert_eq!(application.status, ApplicationStatus::Pending);
    assert!(!application.payment_completed);

    let second = school.admissions.submit(&guardian, submission(), Vec::new());
    assert!(matches!(second, Err(AdmissionError::PaymentOutstanding(id)) if id == application.id));

    let instructions = school
        .ledger
        .instructions(&guardian, application.id)
        .expect("instructions");
    assert_eq!(instructions.amount, Amount::from_major(10_000));
    assert!(!instructions.paid);

    let processed = school
        .ledger
        .process(&guardian, application.id, &mpesa())
        .expect("payment processed");
    assert!(processed.paid);
    assert_eq!(processed.payment.status, PaymentStatus::Completed);
    assert!(matches!(
        school.ledger.process(&guardian, application.id, &mpesa()),
        Err(LedgerError::AlreadyCompleted)
    ));

    let officer = school.staff(
        "officer@satellite.ac.tz",
        &[Permission::ViewApplications, Permission::ApproveApplications],
    );
    let view = school
        .admissions
        .get(&officer, application.id)
        .expect("staff view");
    assert_eq!(view.application.status, ApplicationStatus::Pending);
    assert!(view.application.payment_completed);

    let approved = school
        .admissions
        .decide(&officer, application.id, Decision::Approve)
        .expect("approved");
    assert_eq!(approved.status, ApplicationStatus::Approved);
    assert!(matches!(
        school
            .admissions
            .decide(&officer, application.id, Decision::Reject),
        Err(AdmissionError::AccessDenied(_))
    ));

    let revenue = school.ledger.revenue().expect("revenue");
    assert_eq!(revenue.completed_payments, 1);
    assert_eq!(
        revenue.by_category.get(&PaymentCategory::ApplicationFee),
        Some(&Amount::from_major(10_000))
    );
}

#[test]
fn records_survive_a_restart() {
    let school = School::open(tempfile::tempdir().expect("temp dir"));
    let guardian = school.register("baraka@example.com");
    let application = school
        .admissions
        .submit(&guardian, submission(), Vec::new())
        .expect("application stored");
    school
        .ledger
        .process(&guardian, application.id, &mpesa())
        .expect("payment processed");

    let School { dir, .. } = school;
    let school = School::open(dir);

    let guardian = school.register_again("baraka@example.com");
    assert!(school
        .admissions
        .outstanding_for(&guardian)
        .expect("lookup")
        .is_none());
    let instructions = school
        .ledger
        .instructions(&guardian, application.id)
        .expect("instructions");
    assert!(instructions.paid);
    assert_eq!(instructions.payments.len(), 1);
    assert!(matches!(
        school.identity.signup(SignupForm {
            first_name: "Baraka".to_string(),
            last_name: "Mushi".to_string(),
            email: "baraka@example.com".to_string(),
            phone: "0712000000".to_string(),
            password: "another-pass".to_string(),
            confirm_password: "another-pass".to_string(),
            ..SignupForm::default()
        }),
        Err(IdentityError::EmailTaken)
    ));
}

impl School {
    fn register_again(&self, email: &str) -> ApplicantAccount {
        match self
            .identity
            .authenticate(
                PrincipalKind::Applicant,
                &Credentials {
                    email: email.to_string(),
                    password: "guardian-pass".to_string(),
                    place: None,
                },
            )
            .expect("existing account logs in")
        {
            Principal::Applicant(account) => account,
            Principal::Staff(_) => panic!("applicant login produced a staff principal"),
        }
    }
}

#[test]
fn bursar_refund_keeps_the_application_paid() {
    let school = School::open(tempfile::tempdir().expect("temp dir"));
    let guardian = school.register("zawadi@example.com");
    let application = school
        .admissions
        .submit(&guardian, submission(), Vec::new())
        .expect("application stored");
    let processed = school
        .ledger
        .process(&guardian, application.id, &mpesa())
        .expect("payment processed");

    let bursar = school.staff("bursar@satellite.ac.tz", &[Permission::ManagePayments]);
    let refunded = school
        .ledger
        .apply(&bursar, processed.payment.id, PaymentAction::Refund)
        .expect("refunded");
    assert_eq!(refunded.status, PaymentStatus::Refunded);

    assert!(school
        .ledger
        .instructions(&guardian, application.id)
        .expect("instructions")
        .paid);
    assert_eq!(school.ledger.revenue().expect("revenue").completed_payments, 0);
}

#[test]
fn purge_clears_applicants_and_keeps_staff() {
    let school = School::open(tempfile::tempdir().expect("temp dir"));
    let guardian = school.register("purge@example.com");
    school
        .admissions
        .submit(&guardian, submission(), Vec::new())
        .expect("application stored");

    let admin = school
        .identity
        .seed_admin("root@satellite.ac.tz", "bootstrap-pass", "Head Teacher")
        .expect("admin seeded");
    let report = school
        .identity
        .purge_applicants(&admin)
        .expect("purge allowed");
    assert_eq!(report.applicants, 1);
    assert_eq!(report.applications, 1);
    assert_eq!(report.payments, 0);

    assert!(school.identity.applicants(&admin).expect("listing").is_empty());
    assert!(school
        .identity
        .authenticate(
            PrincipalKind::Staff,
            &Credentials {
                email: "root@satellite.ac.tz".to_string(),
                password: "bootstrap-pass".to_string(),
                place: None,
            },
        )
        .is_ok());
    assert!(school.dir.path().join("enrollment.db").exists());
}
