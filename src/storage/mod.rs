//! Storage backend adapter.
//!
//! One capability interface, [`StorageBackend`], implemented by the
//! embedded SQLite store and the MongoDB document store. Both enforce
//! account uniqueness with storage-level unique indexes (an application
//! read-then-write check would race between concurrent registrations) and
//! return assessments newest-first, so callers get identical semantic
//! results regardless of backend. The backend is chosen once at startup
//! from the DSN scheme and shared process-wide as an [`Store`].

pub mod mongo;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::token::Role;
use crate::risk::{features::FeatureVector, RiskTier};

pub type Store = Arc<dyn StorageBackend>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Unique constraint violated; carries the offending field name.
    #[error("{0} already exists")]
    Duplicate(&'static str),
    #[error("record not found")]
    NotFound,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("invalid stored record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
}

/// A registered user identity.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new account row; id and created_at are assigned here so
/// both backends generate identical identifier semantics.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

/// Partial account update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl AccountPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.password_hash.is_none()
    }
}

/// One persisted risk-prediction result. Immutable once written;
/// probability and tier always agree with the fixed thresholding rule.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub id: Uuid,
    pub account_id: Uuid,
    pub features: FeatureVector,
    pub probability: f64,
    pub risk_tier: RiskTier,
    pub created_at: DateTime<Utc>,
}

/// Assessment joined with its owner's username, for doctor views.
#[derive(Debug, Clone)]
pub struct AssessmentRow {
    pub assessment: Assessment,
    pub username: String,
}

/// Patient roster entry for the doctor dashboard.
#[derive(Debug, Clone)]
pub struct PatientSummary {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assessments: u64,
}

/// 1-indexed pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    number: u32,
    size: u32,
}

impl Page {
    pub const DEFAULT_SIZE: u32 = 10;
    pub const MAX_SIZE: u32 = 100;

    #[must_use]
    pub fn new(number: Option<u32>, size: Option<u32>) -> Self {
        Self {
            number: number.unwrap_or(1).max(1),
            size: size
                .unwrap_or(Self::DEFAULT_SIZE)
                .clamp(1, Self::MAX_SIZE),
        }
    }

    #[must_use]
    pub const fn number(self) -> u32 {
        self.number
    }

    #[must_use]
    pub const fn size(self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn offset(self) -> u64 {
        (self.number as u64 - 1) * self.size as u64
    }

    #[must_use]
    pub fn total_pages(self, total: u64) -> u64 {
        let size = u64::from(self.size);
        ((total + size - 1) / size).max(1)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Optional assessment filters; all conditions are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct AssessmentFilter {
    pub risk: Option<RiskTier>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Capability interface implemented by both persistence backends.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert a new account. Fails with [`StorageError::Duplicate`] if the
    /// username (or email, when present) is already taken; the check is the
    /// backend's unique index, not a prior read.
    async fn insert_account(&self, account: &Account) -> Result<(), StorageError>;

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, StorageError>;

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, StorageError>;

    /// Apply a partial update, with the same uniqueness guarantees as
    /// insertion.
    async fn update_account(&self, id: Uuid, patch: &AccountPatch) -> Result<(), StorageError>;

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<(), StorageError>;

    /// One account's assessments, newest first.
    async fn find_assessments_by_account(
        &self,
        account_id: Uuid,
        page: Page,
        filter: &AssessmentFilter,
    ) -> Result<Vec<Assessment>, StorageError>;

    /// All assessments with owner usernames, newest first. Doctor-only
    /// callers; the role gate lives in the route guard.
    async fn find_all_assessments(
        &self,
        page: Page,
        filter: &AssessmentFilter,
    ) -> Result<Vec<AssessmentRow>, StorageError>;

    /// Count matching assessments, optionally scoped to one account.
    async fn count_assessments(
        &self,
        filter: &AssessmentFilter,
        account_id: Option<Uuid>,
    ) -> Result<u64, StorageError>;

    /// Patient roster with assessment counts, newest registration first.
    async fn list_patients(&self) -> Result<Vec<PatientSummary>, StorageError>;
}

/// Build an account record from its parts, assigning id and timestamp.
#[must_use]
pub fn new_account_record(new: NewAccount) -> Account {
    Account {
        id: Uuid::new_v4(),
        username: new.username,
        email: new.email,
        password_hash: new.password_hash,
        role: new.role,
        created_at: Utc::now(),
    }
}

/// Connect to the backend named by the DSN: `mongodb://`/`mongodb+srv://`
/// selects the document store, anything else is treated as a SQLite
/// path/URL. Called once at process start; the returned handle is shared
/// for the process lifetime.
///
/// # Errors
/// Returns [`StorageError::Unavailable`] if the backend cannot be reached
/// or its schema/indexes cannot be prepared.
pub async fn connect(dsn: &str) -> Result<Store, StorageError> {
    if dsn.starts_with("mongodb://") || dsn.starts_with("mongodb+srv://") {
        Ok(Arc::new(mongo::MongoBackend::connect(dsn).await?))
    } else {
        Ok(Arc::new(sqlite::SqliteBackend::connect(dsn).await?))
    }
}

/// Bound a storage or prediction call; an elapsed timeout surfaces as
/// [`StorageError::Unavailable`] instead of hanging the request.
pub async fn with_timeout<T, F>(limit: Duration, future: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Unavailable(format!(
            "operation timed out after {}s",
            limit.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_and_clamping() {
        let page = Page::default();
        assert_eq!(page.number(), 1);
        assert_eq!(page.size(), Page::DEFAULT_SIZE);
        assert_eq!(page.offset(), 0);

        let page = Page::new(Some(0), Some(0));
        assert_eq!(page.number(), 1);
        assert_eq!(page.size(), 1);

        let page = Page::new(Some(3), Some(1000));
        assert_eq!(page.size(), Page::MAX_SIZE);
        assert_eq!(page.offset(), 200);
    }

    #[test]
    fn test_total_pages() {
        let page = Page::new(Some(1), Some(10));
        assert_eq!(page.total_pages(0), 1);
        assert_eq!(page.total_pages(10), 1);
        assert_eq!(page.total_pages(11), 2);
        assert_eq!(page.total_pages(95), 10);
    }

    #[tokio::test]
    async fn test_with_timeout_elapsed() {
        let result: Result<(), StorageError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }
}
