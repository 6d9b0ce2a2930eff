use std::sync::Arc;

use chrono::Utc;

use super::domain::{
    ApplicantAccount, Credentials, NewApplicant, NewStaff, Permission, PermissionSet,
    PrincipalKind, PurgeReport, SignupForm, StaffAccount, StaffRole,
};
use super::password::{hash_password, verify_against_decoy, verify_password, PasswordError};
use super::session::{authorize, require_super_admin, AccessDenied, IdentityToken, Principal};
use crate::store::{AccountRepository, RepositoryError};

pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Account registration, credential checks and staff administration.
pub struct IdentityService<S> {
    store: Arc<S>,
}

impl<S> IdentityService<S>
where
    S: AccountRepository + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Registers a guardian account from the signup form.
    pub fn signup(&self, form: SignupForm) -> Result<ApplicantAccount, IdentityError> {
        let first_name = form.first_name.trim();
        let middle_name = form.middle_name.trim();
        let last_name = form.last_name.trim();
        let email = form.email.trim();
        let phone = form.phone.trim();

        let missing: Vec<&str> = [
            ("first_name", first_name),
            ("last_name", last_name),
            ("email", email),
            ("phone", phone),
            ("password", form.password.as_str()),
            ("confirm_password", form.confirm_password.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
        .collect();
        if !missing.is_empty() {
            return Err(IdentityError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        validate_email(email)?;
        validate_password(&form.password)?;
        if form.password != form.confirm_password {
            return Err(IdentityError::Validation(
                "passwords do not match".to_string(),
            ));
        }

        if self.store.applicant_by_email(email)?.is_some() {
            return Err(IdentityError::EmailTaken);
        }

        let account = NewApplicant {
            first_name: first_name.to_string(),
            middle_name: (!middle_name.is_empty()).then(|| middle_name.to_string()),
            last_name: last_name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            password_hash: hash_password(&form.password)?,
            created_at: Utc::now(),
        };

        let account = self.store.insert_applicant(account).map_err(|err| match err {
            RepositoryError::Conflict => IdentityError::EmailTaken,
            other => other.into(),
        })?;
        tracing::info!(applicant_id = %account.id, "applicant account registered");
        Ok(account)
    }

    /// Verifies credentials against the account table of `kind`.
    pub fn authenticate(
        &self,
        kind: PrincipalKind,
        credentials: &Credentials,
    ) -> Result<Principal, IdentityError> {
        let email = credentials.email.trim();
        let password = credentials.password.as_str();

        let principal = match kind {
            PrincipalKind::Applicant => {
                let Some(account) = self.store.applicant_by_email(email)? else {
                    verify_against_decoy(password);
                    return Err(IdentityError::InvalidCredentials);
                };
                if !verify_password(password, &account.password_hash) {
                    return Err(IdentityError::InvalidCredentials);
                }
                if !account.is_active {
                    return Err(IdentityError::AccountDisabled);
                }
                Principal::Applicant(account)
            }
            PrincipalKind::Staff => {
                let Some(mut account) = self.store.staff_by_email(email)? else {
                    verify_against_decoy(password);
                    return Err(IdentityError::InvalidCredentials);
                };
                if !verify_password(password, &account.password_hash) {
                    return Err(IdentityError::InvalidCredentials);
                }
                if !account.is_active {
                    return Err(IdentityError::AccountDisabled);
                }
                let now = Utc::now();
                self.store.record_staff_login(account.id, now)?;
                account.last_login = Some(now);
                Principal::Staff(account)
            }
        };

        match credentials.place.as_deref().map(str::trim) {
            Some(place) if !place.is_empty() => {
                tracing::info!(token = %principal.token(), place, "signed in");
            }
            _ => tracing::info!(token = %principal.token(), "signed in"),
        }
        Ok(principal)
    }

    /// Loads the account behind a session token. Missing or inactive accounts are anonymous.
    pub fn resolve(&self, token: IdentityToken) -> Result<Option<Principal>, IdentityError> {
        let principal = match token {
            IdentityToken::Applicant(id) => self
                .store
                .applicant(id)?
                .filter(|account| account.is_active)
                .map(Principal::Applicant),
            IdentityToken::Staff(id) => self
                .store
                .staff(id)?
                .filter(|account| account.is_active)
                .map(Principal::Staff),
        };
        Ok(principal)
    }

    /// Creates the initial `super_admin` account. Refuses when the email is already taken.
    pub fn seed_admin(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<StaffAccount, IdentityError> {
        let account = self.create_staff(
            email,
            password,
            full_name,
            StaffRole::SuperAdmin,
            PermissionSet::Unrestricted,
        )?;
        tracing::info!(staff_id = %account.id, "super admin seeded");
        Ok(account)
    }

    pub fn create_staff(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        role: StaffRole,
        permissions: PermissionSet,
    ) -> Result<StaffAccount, IdentityError> {
        let email = email.trim();
        let full_name = full_name.trim();
        validate_email(email)?;
        validate_password(password)?;
        if full_name.is_empty() {
            return Err(IdentityError::Validation(
                "staff name is required".to_string(),
            ));
        }
        if self.store.staff_by_email(email)?.is_some() {
            return Err(IdentityError::StaffExists);
        }

        let account = NewStaff {
            email: email.to_string(),
            password_hash: hash_password(password)?,
            full_name: full_name.to_string(),
            role,
            permissions,
            created_at: Utc::now(),
        };
        let account = self.store.insert_staff(account).map_err(|err| match err {
            RepositoryError::Conflict => IdentityError::StaffExists,
            other => other.into(),
        })?;
        tracing::info!(staff_id = %account.id, role = account.role.label(), "staff account created");
        Ok(account)
    }

    /// Applicant accounts, newest first.
    pub fn applicants(&self, staff: &StaffAccount) -> Result<Vec<ApplicantAccount>, IdentityError> {
        authorize(staff, Permission::ManageUsers)?;
        Ok(self.store.applicants()?)
    }

    /// Deletes every applicant with their applications and payments. Staff accounts stay.
    pub fn purge_applicants(&self, staff: &StaffAccount) -> Result<PurgeReport, IdentityError> {
        require_super_admin(staff)?;
        let report = self.store.purge_applicants()?;
        tracing::warn!(
            staff_id = %staff.id,
            payments = report.payments,
            applications = report.applications,
            applicants = report.applicants,
            "applicant data purged"
        );
        Ok(report)
    }
}

fn validate_email(email: &str) -> Result<(), IdentityError> {
    let invalid = || IdentityError::Validation("please enter a valid email address".to_string());
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}

fn validate_password(password: &str) -> Result<(), IdentityError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(IdentityError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters long"
        )));
    }
    Ok(())
}

/// Error raised by the identity service.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("{0}")]
    Validation(String),
    #[error("an account with this email already exists")]
    EmailTaken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is disabled")]
    AccountDisabled,
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),
    #[error("a staff account with this email already exists")]
    StaffExists,
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
