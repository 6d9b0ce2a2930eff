//! Out-of-band account administration. These commands always work against the SQLite
//! database, since an in-memory store would vanish with the process.

use std::io::{self, BufRead};
use std::sync::Arc;

use clap::{Args, ValueEnum};
use enrollment::config::{AdminSeedConfig, AppConfig, ConfigError, StoreBackend};
use enrollment::error::AppError;
use enrollment::identity::{IdentityService, Permission, PermissionSet, StaffAccount, StaffRole};
use enrollment::store::{AccountRepository, SqliteStore};
use enrollment::telemetry;
use tracing::{info, warn};

#[derive(Args, Debug, Default)]
pub(crate) struct SeedAdminArgs {
    /// Use this email instead of ADMIN_LOGIN_EMAIL
    #[arg(long)]
    pub(crate) email: Option<String>,
    /// Display name for the account
    #[arg(long)]
    pub(crate) name: Option<String>,
}

/// Permission bundles for the school's usual staff roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum StaffPreset {
    /// Admissions officer: reviews and decides applications
    Admissions,
    /// Finance officer: reconciles payments
    Finance,
    /// Head teacher: decisions plus read access to payments
    Principal,
}

impl StaffPreset {
    pub(crate) fn permissions(self) -> &'static [Permission] {
        match self {
            StaffPreset::Admissions => &[
                Permission::ViewApplications,
                Permission::ApproveApplications,
                Permission::RejectApplications,
                Permission::ViewReports,
            ],
            StaffPreset::Finance => &[
                Permission::ViewPayments,
                Permission::ManagePayments,
                Permission::ViewReports,
                Permission::ExportFinancialData,
            ],
            StaffPreset::Principal => &[
                Permission::ViewApplications,
                Permission::ApproveApplications,
                Permission::RejectApplications,
                Permission::ViewPayments,
                Permission::ViewReports,
                Permission::ExportData,
            ],
        }
    }
}

fn parse_permission(raw: &str) -> Result<Permission, String> {
    raw.trim().parse().map_err(|err| format!("{err}"))
}

#[derive(Args, Debug)]
pub(crate) struct AddStaffArgs {
    #[arg(long)]
    pub(crate) email: String,
    /// Display name shown on the staff console
    #[arg(long)]
    pub(crate) name: String,
    /// Environment variable holding the password; read from stdin when unset
    #[arg(long, default_value = "STAFF_PASSWORD")]
    pub(crate) password_env: String,
    /// Start from a role's permission bundle
    #[arg(long, value_enum)]
    pub(crate) preset: Option<StaffPreset>,
    /// Grant a permission by name; repeatable
    #[arg(long = "permission", value_parser = parse_permission)]
    pub(crate) permissions: Vec<Permission>,
    /// Grant every permission
    #[arg(long, conflicts_with_all = ["preset", "permissions"])]
    pub(crate) unrestricted: bool,
}

impl AddStaffArgs {
    pub(crate) fn permission_set(&self) -> PermissionSet {
        if self.unrestricted {
            return PermissionSet::Unrestricted;
        }
        let preset = self
            .preset
            .map(StaffPreset::permissions)
            .unwrap_or_default();
        PermissionSet::granted(preset.iter().chain(&self.permissions).copied())
    }
}

#[derive(Args, Debug)]
pub(crate) struct PurgeArgs {
    /// Confirm that every applicant, application and payment should be deleted
    #[arg(long)]
    pub(crate) yes: bool,
}

fn open_admin_store(config: &AppConfig) -> Result<Arc<SqliteStore>, AppError> {
    telemetry::init(&config.telemetry)?;
    if config.storage.backend == StoreBackend::Memory {
        warn!("APP_STORE=memory is ignored by administrative commands");
    }
    let store = SqliteStore::open(&config.storage.database_path)?;
    Ok(Arc::new(store))
}

/// Creates the super admin from the bootstrap settings.
pub(crate) fn seed_from_config<S>(
    identity: &IdentityService<S>,
    admin: &AdminSeedConfig,
) -> Result<StaffAccount, AppError>
where
    S: AccountRepository + 'static,
{
    let password = admin
        .password
        .as_deref()
        .ok_or(ConfigError::MissingAdminPassword)?;
    Ok(identity.seed_admin(&admin.email, password, &admin.full_name)?)
}

/// Seeds the super admin unless an account with that email already exists.
pub(crate) fn ensure_admin<S>(store: Arc<S>, admin: &AdminSeedConfig) -> Result<(), AppError>
where
    S: AccountRepository + 'static,
{
    if store.staff_by_email(admin.email.trim())?.is_some() {
        info!(email = %admin.email, "super admin already present");
        return Ok(());
    }
    let identity = IdentityService::new(store);
    seed_from_config(&identity, admin)?;
    Ok(())
}

pub(crate) fn seed_admin(args: SeedAdminArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let store = open_admin_store(&config)?;

    let mut admin = config.admin.clone();
    if let Some(email) = args.email {
        admin.email = email;
    }
    if let Some(name) = args.name {
        admin.full_name = name;
    }

    let account = seed_from_config(&IdentityService::new(store), &admin)?;
    println!("Created super admin {} (id {})", account.email, account.id);
    Ok(())
}

/// Takes the password from `var`, or the first line of `input` when the variable is
/// unset or blank. Never from the command line.
pub(crate) fn read_staff_password(
    var: &str,
    lookup: impl Fn(&str) -> Option<String>,
    mut input: impl BufRead,
) -> Result<String, AppError> {
    if let Some(password) = lookup(var).filter(|value| !value.is_empty()) {
        return Ok(password);
    }
    let mut line = String::new();
    input.read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(AppError::Usage(format!(
            "no staff password given; set {var} or pipe it on stdin"
        )));
    }
    Ok(password)
}

pub(crate) fn add_staff(args: AddStaffArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let password = read_staff_password(
        &args.password_env,
        |name| std::env::var(name).ok(),
        io::stdin().lock(),
    )?;
    let store = open_admin_store(&config)?;

    let permissions = args.permission_set();
    let account = IdentityService::new(store).create_staff(
        &args.email,
        &password,
        &args.name,
        StaffRole::Admin,
        permissions,
    )?;
    println!(
        "Created staff account {} (id {}) with permissions: {}",
        account.email,
        account.id,
        account.permissions
    );
    Ok(())
}

pub(crate) fn purge_applicants(args: PurgeArgs) -> Result<(), AppError> {
    if !args.yes {
        return Err(AppError::Usage(
            "purge-applicants deletes every applicant, application and payment; rerun with --yes"
                .to_string(),
        ));
    }

    let config = AppConfig::load()?;
    let store = open_admin_store(&config)?;
    let report = store.purge_applicants()?;
    warn!(
        payments = report.payments,
        applications = report.applications,
        applicants = report.applicants,
        "applicant data purged from the command line"
    );
    println!(
        "Removed {} payments, {} applications and {} applicant accounts",
        report.payments, report.applications, report.applicants
    );
    Ok(())
}
