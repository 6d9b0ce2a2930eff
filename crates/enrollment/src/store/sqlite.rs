use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{AccountRepository, ApplicationRepository, PaymentRepository, RepositoryError};
use crate::applications::{
    Application, ApplicationId, ApplicationStatus, NewApplication, StudentDetails,
};
use crate::identity::{
    ApplicantAccount, ApplicantId, NewApplicant, NewStaff, PermissionSet, PurgeReport,
    StaffAccount, StaffId, StaffRole,
};
use crate::payments::{Amount, NewPayment, Payment, PaymentCategory, PaymentId, PaymentStatus};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS applicants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    middle_name TEXT,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    phone TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS staff (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    full_name TEXT NOT NULL,
    role TEXT NOT NULL,
    permissions TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_login TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS applications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    applicant_id INTEGER NOT NULL REFERENCES applicants(id),
    first_name TEXT NOT NULL,
    second_name TEXT,
    surname TEXT NOT NULL,
    nationality TEXT NOT NULL,
    gender TEXT NOT NULL,
    religion TEXT,
    date_of_birth TEXT NOT NULL,
    place_of_birth TEXT NOT NULL,
    father TEXT NOT NULL,
    mother TEXT NOT NULL,
    guardian TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    payment_required INTEGER NOT NULL DEFAULT 1,
    payment_completed INTEGER NOT NULL DEFAULT 0,
    submitted_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id INTEGER NOT NULL REFERENCES applications(id),
    applicant_id INTEGER NOT NULL REFERENCES applicants(id),
    amount_minor INTEGER NOT NULL,
    payment_method TEXT NOT NULL,
    transaction_id TEXT NOT NULL UNIQUE,
    phone_number TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    category TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_applications_applicant ON applications(applicant_id);
CREATE INDEX IF NOT EXISTS idx_payments_application ON payments(application_id);
";

const APPLICANT_COLUMNS: &str = "id, first_name, middle_name, last_name, email, phone, \
     password_hash, is_active, created_at, updated_at";

const STAFF_COLUMNS: &str = "id, email, password_hash, full_name, role, permissions, \
     is_active, last_login, created_at, updated_at";

const APPLICATION_COLUMNS: &str = "id, applicant_id, first_name, second_name, surname, \
     nationality, gender, religion, date_of_birth, place_of_birth, father, mother, guardian, \
     status, payment_required, payment_completed, submitted_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, application_id, applicant_id, amount_minor, payment_method, \
     transaction_id, phone_number, status, category, created_at, completed_at, notes";

/// SQLite-backed store. A single connection behind a mutex serializes writers; multi-row
/// changes run inside one transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and applies the schema.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(storage_error)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_error)?;
        conn.execute_batch(SCHEMA).map_err(storage_error)?;
        tracing::debug!("sqlite schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Unavailable("sqlite connection mutex poisoned".into()))
    }
}

fn storage_error(err: rusqlite::Error) -> RepositoryError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            RepositoryError::Conflict
        }
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            RepositoryError::NotFound
        }
        rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound,
        _ => RepositoryError::Unavailable(err.to_string()),
    }
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn parse_label<T>(row: &Row<'_>, column: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|err| conversion_error(column, err))
}

fn parse_json<T: DeserializeOwned>(row: &Row<'_>, column: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|err| conversion_error(column, err))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|err| RepositoryError::Unavailable(err.to_string()))
}

fn applicant_from_row(row: &Row<'_>) -> rusqlite::Result<ApplicantAccount> {
    Ok(ApplicantAccount {
        id: ApplicantId(row.get(0)?),
        first_name: row.get(1)?,
        middle_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        password_hash: row.get(6)?,
        is_active: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn staff_from_row(row: &Row<'_>) -> rusqlite::Result<StaffAccount> {
    let permissions: Option<String> = row.get(5)?;
    Ok(StaffAccount {
        id: StaffId(row.get(0)?),
        email: row.get(1)?,
        password_hash: row.get(2)?,
        full_name: row.get(3)?,
        role: parse_label::<StaffRole>(row, 4)?,
        permissions: PermissionSet::from_stored(permissions.as_deref()),
        is_active: row.get(6)?,
        last_login: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<Application> {
    let guardian: Option<String> = row.get(12)?;
    let guardian = guardian
        .map(|raw| serde_json::from_str(&raw).map_err(|err| conversion_error(12, err)))
        .transpose()?;
    let date_of_birth: NaiveDate = row.get(8)?;

    Ok(Application {
        id: ApplicationId(row.get(0)?),
        applicant_id: ApplicantId(row.get(1)?),
        student: StudentDetails {
            first_name: row.get(2)?,
            second_name: row.get(3)?,
            surname: row.get(4)?,
            nationality: row.get(5)?,
            gender: row.get(6)?,
            religion: row.get(7)?,
            date_of_birth,
            place_of_birth: row.get(9)?,
        },
        father: parse_json(row, 10)?,
        mother: parse_json(row, 11)?,
        guardian,
        status: parse_label::<ApplicationStatus>(row, 13)?,
        payment_required: row.get(14)?,
        payment_completed: row.get(15)?,
        submitted_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    let category: Option<String> = row.get(8)?;
    let category = category
        .map(|raw| {
            raw.parse::<PaymentCategory>()
                .map_err(|err| conversion_error(8, err))
        })
        .transpose()?;

    Ok(Payment {
        id: PaymentId(row.get(0)?),
        application_id: ApplicationId(row.get(1)?),
        applicant_id: ApplicantId(row.get(2)?),
        amount: Amount::from_minor(row.get(3)?),
        payment_method: row.get(4)?,
        transaction_id: row.get(5)?,
        phone_number: row.get(6)?,
        status: parse_label::<PaymentStatus>(row, 7)?,
        category,
        created_at: row.get(9)?,
        completed_at: row.get(10)?,
        notes: row.get(11)?,
    })
}

fn select_applicant(conn: &Connection, id: ApplicantId) -> rusqlite::Result<Option<ApplicantAccount>> {
    conn.query_row(
        &format!("SELECT {APPLICANT_COLUMNS} FROM applicants WHERE id = ?1"),
        params![id.0],
        applicant_from_row,
    )
    .optional()
}

fn select_staff(conn: &Connection, id: StaffId) -> rusqlite::Result<Option<StaffAccount>> {
    conn.query_row(
        &format!("SELECT {STAFF_COLUMNS} FROM staff WHERE id = ?1"),
        params![id.0],
        staff_from_row,
    )
    .optional()
}

fn select_application(
    conn: &Connection,
    id: ApplicationId,
) -> rusqlite::Result<Option<Application>> {
    conn.query_row(
        &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"),
        params![id.0],
        application_from_row,
    )
    .optional()
}

fn select_payment(conn: &Connection, id: PaymentId) -> rusqlite::Result<Option<Payment>> {
    conn.query_row(
        &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
        params![id.0],
        payment_from_row,
    )
    .optional()
}

impl AccountRepository for SqliteStore {
    fn insert_applicant(
        &self,
        account: NewApplicant,
    ) -> Result<ApplicantAccount, RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO applicants (first_name, middle_name, last_name, email, phone,
                password_hash, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
            params![
                account.first_name,
                account.middle_name,
                account.last_name,
                account.email,
                account.phone,
                account.password_hash,
                account.created_at,
            ],
        )
        .map_err(storage_error)?;

        let id = ApplicantId(conn.last_insert_rowid());
        select_applicant(&conn, id)
            .map_err(storage_error)?
            .ok_or(RepositoryError::NotFound)
    }

    fn applicant(&self, id: ApplicantId) -> Result<Option<ApplicantAccount>, RepositoryError> {
        let conn = self.conn()?;
        select_applicant(&conn, id).map_err(storage_error)
    }

    fn applicant_by_email(
        &self,
        email: &str,
    ) -> Result<Option<ApplicantAccount>, RepositoryError> {
        self.conn()?
            .query_row(
                &format!("SELECT {APPLICANT_COLUMNS} FROM applicants WHERE email = ?1"),
                params![email],
                applicant_from_row,
            )
            .optional()
            .map_err(storage_error)
    }

    fn applicants(&self) -> Result<Vec<ApplicantAccount>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {APPLICANT_COLUMNS} FROM applicants ORDER BY created_at DESC, id DESC"
            ))
            .map_err(storage_error)?;
        let rows = stmt
            .query_map([], applicant_from_row)
            .map_err(storage_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_error)
    }

    fn insert_staff(&self, account: NewStaff) -> Result<StaffAccount, RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO staff (email, password_hash, full_name, role, permissions, is_active,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![
                account.email,
                account.password_hash,
                account.full_name,
                account.role.label(),
                account.permissions.to_stored(),
                account.created_at,
            ],
        )
        .map_err(storage_error)?;

        let id = StaffId(conn.last_insert_rowid());
        select_staff(&conn, id)
            .map_err(storage_error)?
            .ok_or(RepositoryError::NotFound)
    }

    fn staff(&self, id: StaffId) -> Result<Option<StaffAccount>, RepositoryError> {
        let conn = self.conn()?;
        select_staff(&conn, id).map_err(storage_error)
    }

    fn staff_by_email(&self, email: &str) -> Result<Option<StaffAccount>, RepositoryError> {
        self.conn()?
            .query_row(
                &format!("SELECT {STAFF_COLUMNS} FROM staff WHERE email = ?1"),
                params![email],
                staff_from_row,
            )
            .optional()
            .map_err(storage_error)
    }

    fn record_staff_login(&self, id: StaffId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE staff SET last_login = ?1 WHERE id = ?2",
                params![at, id.0],
            )
            .map_err(storage_error)?;
        if changed == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn purge_applicants(&self) -> Result<PurgeReport, RepositoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage_error)?;
        let payments = tx
            .execute("DELETE FROM payments", [])
            .map_err(storage_error)?;
        let applications = tx
            .execute("DELETE FROM applications", [])
            .map_err(storage_error)?;
        let applicants = tx
            .execute("DELETE FROM applicants", [])
            .map_err(storage_error)?;
        tx.commit().map_err(storage_error)?;

        Ok(PurgeReport {
            payments,
            applications,
            applicants,
        })
    }
}

impl ApplicationRepository for SqliteStore {
    fn insert_application(
        &self,
        application: NewApplication,
    ) -> Result<Application, RepositoryError> {
        let father = to_json(&application.father)?;
        let mother = to_json(&application.mother)?;
        let guardian = application.guardian.as_ref().map(to_json).transpose()?;
        let student = &application.student;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO applications (applicant_id, first_name, second_name, surname,
                nationality, gender, religion, date_of_birth, place_of_birth, father, mother,
                guardian, status, payment_required, payment_completed, submitted_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'pending', 1, 0, ?13, ?13)",
            params![
                application.applicant_id.0,
                student.first_name,
                student.second_name,
                student.surname,
                student.nationality,
                student.gender,
                student.religion,
                student.date_of_birth,
                student.place_of_birth,
                father,
                mother,
                guardian,
                application.submitted_at,
            ],
        )
        .map_err(storage_error)?;

        let id = ApplicationId(conn.last_insert_rowid());
        select_application(&conn, id)
            .map_err(storage_error)?
            .ok_or(RepositoryError::NotFound)
    }

    fn application(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let conn = self.conn()?;
        select_application(&conn, id).map_err(storage_error)
    }

    fn applications(&self, limit: Option<usize>) -> Result<Vec<Application>, RepositoryError> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit
            .and_then(|limit| i64::try_from(limit).ok())
            .unwrap_or(-1);
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {APPLICATION_COLUMNS} FROM applications
                 ORDER BY submitted_at DESC, id DESC LIMIT ?1"
            ))
            .map_err(storage_error)?;
        let rows = stmt
            .query_map(params![limit], application_from_row)
            .map_err(storage_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_error)
    }

    fn outstanding_application(
        &self,
        applicant: ApplicantId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.conn()?
            .query_row(
                &format!(
                    "SELECT {APPLICATION_COLUMNS} FROM applications
                     WHERE applicant_id = ?1 AND status = 'pending' AND payment_completed = 0
                     ORDER BY submitted_at DESC, id DESC LIMIT 1"
                ),
                params![applicant.0],
                application_from_row,
            )
            .optional()
            .map_err(storage_error)
    }

    fn update_application_status(
        &self,
        id: ApplicationId,
        expected: ApplicationStatus,
        next: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> Result<Application, RepositoryError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE applications SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = ?4",
                params![next.label(), at, id.0, expected.label()],
            )
            .map_err(storage_error)?;

        let current = select_application(&conn, id)
            .map_err(storage_error)?
            .ok_or(RepositoryError::NotFound)?;
        if changed == 0 {
            return Err(RepositoryError::Stale);
        }
        Ok(current)
    }
}

impl PaymentRepository for SqliteStore {
    fn insert_payment(&self, payment: NewPayment) -> Result<Payment, RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO payments (application_id, applicant_id, amount_minor, payment_method,
                transaction_id, phone_number, status, category, created_at, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9)",
            params![
                payment.application_id.0,
                payment.applicant_id.0,
                payment.amount.minor(),
                payment.payment_method,
                payment.transaction_id,
                payment.phone_number,
                payment.category.map(|category| category.label()),
                payment.created_at,
                payment.notes,
            ],
        )
        .map_err(storage_error)?;

        let id = PaymentId(conn.last_insert_rowid());
        select_payment(&conn, id)
            .map_err(storage_error)?
            .ok_or(RepositoryError::NotFound)
    }

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        let conn = self.conn()?;
        select_payment(&conn, id).map_err(storage_error)
    }

    fn payments(&self) -> Result<Vec<Payment>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_at DESC, id DESC"
            ))
            .map_err(storage_error)?;
        let rows = stmt.query_map([], payment_from_row).map_err(storage_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_error)
    }

    fn payments_for_application(
        &self,
        id: ApplicationId,
    ) -> Result<Vec<Payment>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PAYMENT_COLUMNS} FROM payments WHERE application_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))
            .map_err(storage_error)?;
        let rows = stmt
            .query_map(params![id.0], payment_from_row)
            .map_err(storage_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_error)
    }

    fn update_payment_status(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        next: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Payment, RepositoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage_error)?;

        let completed_at = (next == PaymentStatus::Completed).then_some(at);
        let changed = tx
            .execute(
                "UPDATE payments SET status = ?1, completed_at = COALESCE(?2, completed_at)
                 WHERE id = ?3 AND status = ?4",
                params![next.label(), completed_at, id.0, expected.label()],
            )
            .map_err(storage_error)?;

        if changed == 0 {
            // Dropping the transaction rolls it back.
            return match select_payment(&tx, id).map_err(storage_error)? {
                Some(_) => Err(RepositoryError::Stale),
                None => Err(RepositoryError::NotFound),
            };
        }

        if next == PaymentStatus::Completed {
            tx.execute(
                "UPDATE applications SET payment_completed = 1, updated_at = ?1
                 WHERE id = (SELECT application_id FROM payments WHERE id = ?2)",
                params![at, id.0],
            )
            .map_err(storage_error)?;
        }

        let payment = select_payment(&tx, id)
            .map_err(storage_error)?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().map_err(storage_error)?;
        Ok(payment)
    }
}
