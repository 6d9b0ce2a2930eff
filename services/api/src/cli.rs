use crate::admin::{self, AddStaffArgs, PurgeArgs, SeedAdminArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use enrollment::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Enrollment Portal",
    about = "Run and administer the school admissions portal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Create the super admin account from ADMIN_LOGIN_EMAIL and ADMIN_LOGIN_PASSWORD
    SeedAdmin(SeedAdminArgs),
    /// Create a staff account with an explicit permission list
    AddStaff(AddStaffArgs),
    /// Delete every applicant account together with its applications and payments
    PurgeApplicants(PurgeArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Seed the super admin before serving when it does not exist yet
    #[arg(long)]
    pub(crate) seed_admin: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::SeedAdmin(args) => admin::seed_admin(args),
        Command::AddStaff(args) => admin::add_staff(args),
        Command::PurgeApplicants(args) => admin::purge_applicants(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrollment::identity::Permission;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["enrollment-api"]).expect("parses");
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["enrollment-api", "serve", "--port", "8080", "--seed-admin"])
            .expect("parses");
        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(8080));
                assert!(args.seed_admin);
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn add_staff_accepts_presets_and_explicit_permissions() {
        let cli = Cli::try_parse_from([
            "enrollment-api",
            "add-staff",
            "--email",
            "bursar@satellite.ac.tz",
            "--name",
            "School Bursar",
            "--preset",
            "finance",
            "--permission",
            "export_data",
        ])
        .expect("parses");
        let Some(Command::AddStaff(args)) = cli.command else {
            panic!("expected add-staff");
        };
        let permissions = args.permission_set();
        assert!(permissions.contains(Permission::ManagePayments));
        assert!(permissions.contains(Permission::ExportData));
        assert!(!permissions.contains(Permission::ApproveApplications));
    }

    #[test]
    fn add_staff_refuses_a_password_argument() {
        let result = Cli::try_parse_from([
            "enrollment-api",
            "add-staff",
            "--email",
            "x@satellite.ac.tz",
            "--name",
            "X",
            "--password",
            "x-password",
        ]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "enrollment-api",
            "add-staff",
            "--email",
            "x@satellite.ac.tz",
            "--name",
            "X",
            "--password-env",
            "BURSAR_PASSWORD",
        ])
        .expect("parses");
        let Some(Command::AddStaff(args)) = cli.command else {
            panic!("expected add-staff");
        };
        assert_eq!(args.password_env, "BURSAR_PASSWORD");
    }

    #[test]
    fn unknown_permissions_are_rejected_at_parse_time() {
        let result = Cli::try_parse_from([
            "enrollment-api",
            "add-staff",
            "--email",
            "x@satellite.ac.tz",
            "--name",
            "X",
            "--permission",
            "launch_rockets",
        ]);
        assert!(result.is_err());
    }
}
