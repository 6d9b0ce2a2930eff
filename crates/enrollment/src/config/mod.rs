use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::payments::{Amount, FeeSchedule, Till};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the portal.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub admin: AdminSeedConfig,
    pub fees: FeeSchedule,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&var_or("APP_ENV", "development"));

        let host = var_or("APP_HOST", "127.0.0.1");
        let port = var_or("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = var_or("APP_LOG_LEVEL", "info");
        let format = match var_or("APP_LOG_FORMAT", "compact").to_ascii_lowercase().as_str() {
            "full" => LogFormat::Full,
            _ => LogFormat::Compact,
        };

        let backend = match var_or("APP_STORE", "sqlite").to_ascii_lowercase().as_str() {
            "sqlite" => StoreBackend::Sqlite,
            "memory" => StoreBackend::Memory,
            other => return Err(ConfigError::UnknownStore(other.to_string())),
        };
        let data_dir = PathBuf::from(var_or("APP_DATA_DIR", "instance"));
        let database_path = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("app.db"));
        let static_dir = PathBuf::from(var_or("APP_STATIC_DIR", "static"));

        let cookie_secure = flag("SESSION_COOKIE_SECURE", false)?;

        let admin = AdminSeedConfig {
            email: var_or("ADMIN_LOGIN_EMAIL", "satellite@gmail.ac.tz"),
            password: env::var("ADMIN_LOGIN_PASSWORD")
                .ok()
                .filter(|value| !value.is_empty()),
            full_name: var_or("ADMIN_FULL_NAME", "System Administrator"),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, format },
            storage: StorageConfig {
                backend,
                database_path,
                data_dir,
                static_dir,
            },
            session: SessionConfig {
                cookie_secure,
                ..SessionConfig::default()
            },
            admin,
            fees: fee_schedule_from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

/// Where rows, site content and uploaded files live.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StoreBackend,
    pub database_path: PathBuf,
    pub data_dir: PathBuf,
    pub static_dir: PathBuf,
}

impl StorageConfig {
    pub fn content_path(&self) -> PathBuf {
        self.data_dir.join("site_content.json")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.static_dir.join("uploads")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.static_dir.join("results")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.static_dir.join("images")
    }
}

/// Session cookie behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_secure: bool,
    pub lifetime_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_secure: false,
            lifetime_hours: 24,
        }
    }
}

/// Credentials consumed by the out-of-band `seed-admin` command only.
#[derive(Debug, Clone)]
pub struct AdminSeedConfig {
    pub email: String,
    pub password: Option<String>,
    pub full_name: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidAmount { key: &'static str, value: String },
    InvalidFlag { key: &'static str, value: String },
    UnknownStore(String),
    MissingAdminPassword,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidAmount { key, value } => {
                write!(f, "{key} must be an amount with at most two decimals (got '{value}')")
            }
            ConfigError::InvalidFlag { key, value } => {
                write!(f, "{key} must be 0/1 or true/false (got '{value}')")
            }
            ConfigError::UnknownStore(value) => {
                write!(f, "APP_STORE must be 'sqlite' or 'memory' (got '{value}')")
            }
            ConfigError::MissingAdminPassword => {
                write!(f, "ADMIN_LOGIN_PASSWORD must be set to seed the admin account")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { key, value: raw }),
    }
}

fn amount(key: &'static str, default: Amount) -> Result<Amount, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidAmount { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn till(
    till_key: &str,
    name_key: &str,
    defaults: (&str, &str),
    amount: Amount,
) -> Till {
    Till::new(
        var_or(till_key, defaults.0),
        var_or(name_key, defaults.1),
        amount,
    )
}

/// Reads the lipa namba tables; every key falls back to the school's published defaults.
pub fn fee_schedule_from_env() -> Result<FeeSchedule, ConfigError> {
    let defaults = FeeSchedule::default();

    let application_fee = amount("APPLICATION_FEE_AMOUNT", defaults.application_fee)?;
    let fees = amount("FEES_AMOUNT", defaults.fees[0].amount)?;
    let fees_alt = amount("FEES_AMOUNT_ALT", defaults.fees[1].amount)?;
    let meals = amount("MEALS_AMOUNT", defaults.meals[0].amount)?;
    let meals_alt = amount("MEALS_AMOUNT_ALT", defaults.meals[1].amount)?;
    let transport = amount("TRANSPORT_AMOUNT", defaults.transport[0].amount)?;
    let transport_alt = amount("TRANSPORT_AMOUNT_ALT", defaults.transport[1].amount)?;

    Ok(FeeSchedule {
        application_fee,
        application: vec![
            till("APP_TILL_1", "APP_NAME_1", ("000000", "SATELLITE APPLICATIONS"), application_fee),
            till("APP_TILL_2", "APP_NAME_2", ("000001", "SATELLITE APPLICATIONS ALT"), application_fee),
        ],
        fallback_till: till(
            "LIPA_NAMBA_TILL",
            "LIPA_NAMBA_NAME",
            ("000000", "SATELLITE PRE & PRIMARY SCHOOL"),
            application_fee,
        ),
        fees: vec![
            till("FEES_TILL_1", "FEES_NAME_1", ("111111", "SATELLITE FEES"), fees),
            till("FEES_TILL_2", "FEES_NAME_2", ("111112", "SATELLITE FEES ALT"), fees_alt),
        ],
        meals: vec![
            till("MEALS_TILL_1", "MEALS_NAME_1", ("222221", "SATELLITE MEALS"), meals),
            till("MEALS_TILL_2", "MEALS_NAME_2", ("222222", "SATELLITE MEALS ALT"), meals_alt),
        ],
        transport: vec![
            till("TRANSPORT_TILL_1", "TRANSPORT_NAME_1", ("333331", "SATELLITE TRANSPORT"), transport),
            till(
                "TRANSPORT_TILL_2",
                "TRANSPORT_NAME_2",
                ("333332", "SATELLITE TRANSPORT ALT"),
                transport_alt,
            ),
        ],
    })
}
