//! Embedded relational backend on SQLite.
//!
//! Schema is applied on every new pool connection (idempotent `IF NOT
//! EXISTS` statements), with unique indexes on `accounts.username` and
//! `accounts.email` so duplicate registration is rejected by the database
//! itself. Timestamps are stored as RFC 3339 text, which keeps range
//! filters and newest-first ordering correct under string comparison.

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::{
    Account, AccountPatch, Assessment, AssessmentFilter, AssessmentRow, Page, PatientSummary,
    StorageBackend, StorageError,
};
use crate::auth::token::Role;
use crate::risk::{features::FeatureVector, RiskTier};

const SCHEMA: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        email TEXT,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('patient', 'doctor')),
        created_at TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_username ON accounts (username)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_email ON accounts (email)
        WHERE email IS NOT NULL",
    "CREATE TABLE IF NOT EXISTS assessments (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL REFERENCES accounts (id),
        age REAL NOT NULL,
        anaemia REAL NOT NULL,
        creatinine_phosphokinase REAL NOT NULL,
        diabetes REAL NOT NULL,
        ejection_fraction REAL NOT NULL,
        high_blood_pressure REAL NOT NULL,
        platelets REAL NOT NULL,
        serum_creatinine REAL NOT NULL,
        serum_sodium REAL NOT NULL,
        sex REAL NOT NULL,
        smoking REAL NOT NULL,
        time REAL NOT NULL,
        probability REAL NOT NULL,
        risk_tier TEXT NOT NULL CHECK (risk_tier IN ('LOW', 'MEDIUM', 'HIGH')),
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_assessments_account ON assessments (account_id)",
    "CREATE INDEX IF NOT EXISTS idx_assessments_created ON assessments (created_at)",
];

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (or create) the database file and prepare the schema.
    ///
    /// # Errors
    /// Returns [`StorageError`] if the file cannot be opened or the schema
    /// cannot be applied.
    pub async fn connect(dsn: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|err| StorageError::Unavailable(err.to_string()))?
            .create_if_missing(true);

        // In-memory databases are per-connection; keep the pool at one
        // connection so every caller sees the same data.
        let max_connections = if dsn.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    for statement in SCHEMA {
                        sqlx::query(statement).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        info!("connected to SQLite store at {dsn}");

        Ok(Self { pool })
    }
}

fn map_insert_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            let field = if db.message().contains("username") {
                "username"
            } else {
                "email"
            };
            return StorageError::Duplicate(field);
        }
    }

    err.into()
}

fn account_from_row(row: &SqliteRow) -> Result<Account, StorageError> {
    let id: String = row.try_get("id")?;
    let role: String = row.try_get("role")?;

    Ok(Account {
        id: Uuid::parse_str(&id)
            .map_err(|_| StorageError::Corrupt(format!("account id: {id}")))?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role
            .parse::<Role>()
            .map_err(|()| StorageError::Corrupt(format!("account role: {role}")))?,
        created_at: row.try_get("created_at")?,
    })
}

fn assessment_from_row(row: &SqliteRow) -> Result<Assessment, StorageError> {
    let id: String = row.try_get("id")?;
    let account_id: String = row.try_get("account_id")?;
    let tier: String = row.try_get("risk_tier")?;

    Ok(Assessment {
        id: Uuid::parse_str(&id)
            .map_err(|_| StorageError::Corrupt(format!("assessment id: {id}")))?,
        account_id: Uuid::parse_str(&account_id)
            .map_err(|_| StorageError::Corrupt(format!("assessment account id: {account_id}")))?,
        features: FeatureVector {
            age: row.try_get("age")?,
            anaemia: row.try_get("anaemia")?,
            creatinine_phosphokinase: row.try_get("creatinine_phosphokinase")?,
            diabetes: row.try_get("diabetes")?,
            ejection_fraction: row.try_get("ejection_fraction")?,
            high_blood_pressure: row.try_get("high_blood_pressure")?,
            platelets: row.try_get("platelets")?,
            serum_creatinine: row.try_get("serum_creatinine")?,
            serum_sodium: row.try_get("serum_sodium")?,
            sex: row.try_get("sex")?,
            smoking: row.try_get("smoking")?,
            time: row.try_get("time")?,
        },
        probability: row.try_get("probability")?,
        risk_tier: tier
            .parse::<RiskTier>()
            .map_err(|()| StorageError::Corrupt(format!("risk tier: {tier}")))?,
        created_at: row.try_get("created_at")?,
    })
}

/// Filter fragment shared by the assessment queries. Each optional value
/// is bound twice for the `(? IS NULL OR column ...)` pattern.
const FILTER_SQL: &str = "(? IS NULL OR risk_tier = ?)
    AND (? IS NULL OR created_at >= ?)
    AND (? IS NULL OR created_at <= ?)";

type SqliteQuery<'q> =
    sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_filter<'q>(
    query: SqliteQuery<'q>,
    filter: &AssessmentFilter,
) -> SqliteQuery<'q> {
    let risk = filter.risk.map(|tier| tier.as_str().to_string());

    query
        .bind(risk.clone())
        .bind(risk)
        .bind(filter.since)
        .bind(filter.since)
        .bind(filter.until)
        .bind(filter.until)
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn insert_account(&self, account: &Account) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO accounts (id, username, email, password_hash, role, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(account.id.to_string())
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(())
    }

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, StorageError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, StorageError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn update_account(&self, id: Uuid, patch: &AccountPatch) -> Result<(), StorageError> {
        if patch.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            "UPDATE accounts SET
                username = COALESCE(?, username),
                email = COALESCE(?, email),
                password_hash = COALESCE(?, password_hash)
             WHERE id = ?",
        )
        .bind(&patch.username)
        .bind(&patch.email)
        .bind(&patch.password_hash)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<(), StorageError> {
        let f = &assessment.features;
        sqlx::query(
            "INSERT INTO assessments (
                id, account_id, age, anaemia, creatinine_phosphokinase, diabetes,
                ejection_fraction, high_blood_pressure, platelets, serum_creatinine,
                serum_sodium, sex, smoking, time, probability, risk_tier, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(assessment.id.to_string())
        .bind(assessment.account_id.to_string())
        .bind(f.age)
        .bind(f.anaemia)
        .bind(f.creatinine_phosphokinase)
        .bind(f.diabetes)
        .bind(f.ejection_fraction)
        .bind(f.high_blood_pressure)
        .bind(f.platelets)
        .bind(f.serum_creatinine)
        .bind(f.serum_sodium)
        .bind(f.sex)
        .bind(f.smoking)
        .bind(f.time)
        .bind(assessment.probability)
        .bind(assessment.risk_tier.as_str())
        .bind(assessment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_assessments_by_account(
        &self,
        account_id: Uuid,
        page: Page,
        filter: &AssessmentFilter,
    ) -> Result<Vec<Assessment>, StorageError> {
        let sql = format!(
            "SELECT * FROM assessments WHERE account_id = ? AND {FILTER_SQL}
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );

        let query = sqlx::query(&sql).bind(account_id.to_string());
        let rows = bind_filter(query, filter)
            .bind(i64::from(page.size()))
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(assessment_from_row).collect()
    }

    async fn find_all_assessments(
        &self,
        page: Page,
        filter: &AssessmentFilter,
    ) -> Result<Vec<AssessmentRow>, StorageError> {
        // LEFT JOIN with a fallback so an orphaned assessment still shows
        // up, matching the document backend's behavior
        let sql = format!(
            "SELECT a.*, COALESCE(u.username, 'unknown') AS username FROM assessments a
             LEFT JOIN (SELECT id, username FROM accounts) u ON u.id = a.account_id
             WHERE {FILTER_SQL}
             ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?"
        );

        let rows = bind_filter(sqlx::query(&sql), filter)
            .bind(i64::from(page.size()))
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(AssessmentRow {
                    assessment: assessment_from_row(row)?,
                    username: row.try_get("username")?,
                })
            })
            .collect()
    }

    async fn count_assessments(
        &self,
        filter: &AssessmentFilter,
        account_id: Option<Uuid>,
    ) -> Result<u64, StorageError> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM assessments
             WHERE (? IS NULL OR account_id = ?) AND {FILTER_SQL}"
        );

        let account = account_id.map(|id| id.to_string());
        let query = sqlx::query(&sql).bind(account.clone()).bind(account);
        let row = bind_filter(query, filter).fetch_one(&self.pool).await?;

        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }

    async fn list_patients(&self) -> Result<Vec<PatientSummary>, StorageError> {
        let rows = sqlx::query(
            "SELECT u.id, u.username, u.email, u.created_at, COUNT(a.id) AS assessments
             FROM accounts u
             LEFT JOIN assessments a ON a.account_id = u.id
             WHERE u.role = 'patient'
             GROUP BY u.id, u.username, u.email, u.created_at
             ORDER BY u.created_at DESC, u.id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let count: i64 = row.try_get("assessments")?;
                Ok(PatientSummary {
                    id: Uuid::parse_str(&id)
                        .map_err(|_| StorageError::Corrupt(format!("account id: {id}")))?,
                    username: row.try_get("username")?,
                    email: row.try_get("email")?,
                    created_at: row.try_get("created_at")?,
                    assessments: count as u64,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::features::sample_map;
    use crate::storage::new_account_record;
    use crate::storage::NewAccount;
    use chrono::{DateTime, Duration, Utc};

    async fn test_backend() -> SqliteBackend {
        SqliteBackend::connect("sqlite::memory:").await.unwrap()
    }

    fn patient(username: &str) -> Account {
        new_account_record(NewAccount {
            username: username.to_string(),
            email: Some(format!("{username}@example.com")),
            password_hash: "$argon2id$stub".to_string(),
            role: Role::Patient,
        })
    }

    fn assessment_for(account_id: Uuid, probability: f64, at: DateTime<Utc>) -> Assessment {
        let features = FeatureVector::from_map(&sample_map()).unwrap();
        Assessment {
            id: Uuid::new_v4(),
            account_id,
            features,
            probability,
            risk_tier: RiskTier::from_probability(probability),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_account_roundtrip() {
        let backend = test_backend().await;
        let account = patient("alice");
        backend.insert_account(&account).await.unwrap();

        let found = backend
            .find_account_by_username("alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, account.id);
        assert_eq!(found.email.as_deref(), Some("alice@example.com"));
        assert_eq!(found.role, Role::Patient);

        let by_id = backend.find_account_by_id(account.id).await.unwrap();
        assert!(by_id.is_some());

        assert!(backend
            .find_account_by_username("nobody")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected_by_index() {
        let backend = test_backend().await;
        backend.insert_account(&patient("bob")).await.unwrap();

        let mut twin = patient("bob");
        twin.email = Some("other@example.com".to_string());
        let err = backend.insert_account(&twin).await.unwrap_err();

        assert!(matches!(err, StorageError::Duplicate("username")));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_registration() {
        let backend = test_backend().await;

        let mut twin = patient("mona");
        twin.email = None;
        let mut other = patient("mona");
        other.email = None;

        let (first, second) =
            tokio::join!(backend.insert_account(&twin), backend.insert_account(&other));

        // Exactly one of the two wins, the other hits the unique index
        let duplicates = [first, second]
            .into_iter()
            .filter(|r| matches!(r, Err(StorageError::Duplicate("username"))))
            .count();
        assert_eq!(duplicates, 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_by_index() {
        let backend = test_backend().await;
        backend.insert_account(&patient("carol")).await.unwrap();

        let mut other = patient("carla");
        other.email = Some("carol@example.com".to_string());
        let err = backend.insert_account(&other).await.unwrap_err();

        assert!(matches!(err, StorageError::Duplicate("email")));
    }

    #[tokio::test]
    async fn test_missing_email_is_not_unique_checked() {
        let backend = test_backend().await;

        let mut first = patient("dave");
        first.email = None;
        let mut second = patient("dan");
        second.email = None;

        backend.insert_account(&first).await.unwrap();
        backend.insert_account(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_account() {
        let backend = test_backend().await;
        let account = patient("erin");
        backend.insert_account(&account).await.unwrap();

        backend
            .update_account(
                account.id,
                &AccountPatch {
                    username: Some("erin2".to_string()),
                    password_hash: Some("$argon2id$new".to_string()),
                    ..AccountPatch::default()
                },
            )
            .await
            .unwrap();

        let updated = backend
            .find_account_by_id(account.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.username, "erin2");
        assert_eq!(updated.password_hash, "$argon2id$new");
        // Untouched field survives
        assert_eq!(updated.email.as_deref(), Some("erin@example.com"));

        let err = backend
            .update_account(Uuid::new_v4(), &AccountPatch {
                username: Some("ghost".to_string()),
                ..AccountPatch::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn test_update_to_taken_username_is_duplicate() {
        let backend = test_backend().await;
        let frank = patient("frank");
        let grace = patient("grace");
        backend.insert_account(&frank).await.unwrap();
        backend.insert_account(&grace).await.unwrap();

        let err = backend
            .update_account(
                grace.id,
                &AccountPatch {
                    username: Some("frank".to_string()),
                    ..AccountPatch::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Duplicate("username")));
    }

    #[tokio::test]
    async fn test_assessments_newest_first_with_pagination() {
        let backend = test_backend().await;
        let account = patient("heidi");
        backend.insert_account(&account).await.unwrap();

        let base = Utc::now();
        for i in 0..5 {
            let at = base + Duration::seconds(i);
            backend
                .insert_assessment(&assessment_for(account.id, 0.1, at))
                .await
                .unwrap();
        }

        let filter = AssessmentFilter::default();
        let first = backend
            .find_assessments_by_account(account.id, Page::new(Some(1), Some(2)), &filter)
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert!(first[0].created_at > first[1].created_at);

        let third = backend
            .find_assessments_by_account(account.id, Page::new(Some(3), Some(2)), &filter)
            .await
            .unwrap();
        assert_eq!(third.len(), 1);

        let total = backend.count_assessments(&filter, Some(account.id)).await.unwrap();
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn test_filters_by_risk_and_date() {
        let backend = test_backend().await;
        let account = patient("ivan");
        backend.insert_account(&account).await.unwrap();

        let early = Utc::now() - Duration::days(2);
        let late = Utc::now();
        backend
            .insert_assessment(&assessment_for(account.id, 0.1, early))
            .await
            .unwrap();
        backend
            .insert_assessment(&assessment_for(account.id, 0.9, late))
            .await
            .unwrap();

        let high_only = AssessmentFilter {
            risk: Some(RiskTier::High),
            ..AssessmentFilter::default()
        };
        let rows = backend
            .find_assessments_by_account(account.id, Page::default(), &high_only)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].risk_tier, RiskTier::High);

        let recent = AssessmentFilter {
            since: Some(Utc::now() - Duration::days(1)),
            ..AssessmentFilter::default()
        };
        assert_eq!(
            backend.count_assessments(&recent, Some(account.id)).await.unwrap(),
            1
        );

        let old = AssessmentFilter {
            until: Some(Utc::now() - Duration::days(1)),
            ..AssessmentFilter::default()
        };
        assert_eq!(
            backend.count_assessments(&old, Some(account.id)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_doctor_view_joins_usernames() {
        let backend = test_backend().await;
        let a = patient("judy");
        let b = patient("kim");
        backend.insert_account(&a).await.unwrap();
        backend.insert_account(&b).await.unwrap();

        backend
            .insert_assessment(&assessment_for(a.id, 0.5, Utc::now()))
            .await
            .unwrap();
        backend
            .insert_assessment(&assessment_for(b.id, 0.7, Utc::now() + Duration::seconds(1)))
            .await
            .unwrap();

        let rows = backend
            .find_all_assessments(Page::default(), &AssessmentFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].username, "kim");
        assert_eq!(rows[1].username, "judy");

        let total = backend
            .count_assessments(&AssessmentFilter::default(), None)
            .await
            .unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_orphaned_assessment_keeps_placeholder_username() {
        let backend = test_backend().await;
        let account = patient("nils");
        backend.insert_account(&account).await.unwrap();
        backend
            .insert_assessment(&assessment_for(account.id, 0.4, Utc::now()))
            .await
            .unwrap();

        // Orphan the record behind the backend's back
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&backend.pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(account.id.to_string())
            .execute(&backend.pool)
            .await
            .unwrap();

        let rows = backend
            .find_all_assessments(Page::default(), &AssessmentFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].username, "unknown");
    }

    #[tokio::test]
    async fn test_patient_roster_counts() {
        let backend = test_backend().await;
        let patient_account = patient("lena");
        backend.insert_account(&patient_account).await.unwrap();

        let doctor_account = new_account_record(NewAccount {
            username: "drmoss".to_string(),
            email: None,
            password_hash: "$argon2id$stub".to_string(),
            role: Role::Doctor,
        });
        backend.insert_account(&doctor_account).await.unwrap();

        backend
            .insert_assessment(&assessment_for(patient_account.id, 0.2, Utc::now()))
            .await
            .unwrap();

        let roster = backend.list_patients().await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].username, "lena");
        assert_eq!(roster[0].assessments, 1);
    }
}
