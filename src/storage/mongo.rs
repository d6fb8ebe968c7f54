//! Cloud document backend on MongoDB.
//!
//! Two collections, `accounts` and `assessments`, with unique indexes on
//! username and (when present) email created at connect time. Identifiers
//! are the same application-generated UUIDs the SQLite backend uses, stored
//! as `_id` strings, so records are semantically interchangeable between
//! backends. The doctor view resolves owner usernames with one batched
//! `$in` lookup instead of a per-row query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, Bson, Document},
    options::{ClientOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{
    Account, AccountPatch, Assessment, AssessmentFilter, AssessmentRow, Page, PatientSummary,
    StorageBackend, StorageError,
};
use crate::auth::token::Role;
use crate::risk::{features::FeatureVector, RiskTier};

const DEFAULT_DATABASE: &str = "cadrisk";
const ACCOUNTS: &str = "accounts";
const ASSESSMENTS: &str = "assessments";

#[derive(Debug, Serialize, Deserialize)]
struct AccountDoc {
    #[serde(rename = "_id")]
    id: String,
    username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    password_hash: String,
    role: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
}

impl From<&Account> for AccountDoc {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            username: account.username.clone(),
            email: account.email.clone(),
            password_hash: account.password_hash.clone(),
            role: account.role.as_str().to_string(),
            created_at: account.created_at,
        }
    }
}

impl TryFrom<AccountDoc> for Account {
    type Error = StorageError;

    fn try_from(doc: AccountDoc) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&doc.id)
                .map_err(|_| StorageError::Corrupt(format!("account id: {}", doc.id)))?,
            username: doc.username,
            email: doc.email,
            password_hash: doc.password_hash,
            role: doc
                .role
                .parse::<Role>()
                .map_err(|()| StorageError::Corrupt(format!("account role: {}", doc.role)))?,
            created_at: doc.created_at,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssessmentDoc {
    #[serde(rename = "_id")]
    id: String,
    account_id: String,
    features: FeatureVector,
    probability: f64,
    risk_tier: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
}

impl From<&Assessment> for AssessmentDoc {
    fn from(assessment: &Assessment) -> Self {
        Self {
            id: assessment.id.to_string(),
            account_id: assessment.account_id.to_string(),
            features: assessment.features.clone(),
            probability: assessment.probability,
            risk_tier: assessment.risk_tier.as_str().to_string(),
            created_at: assessment.created_at,
        }
    }
}

impl TryFrom<AssessmentDoc> for Assessment {
    type Error = StorageError;

    fn try_from(doc: AssessmentDoc) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&doc.id)
                .map_err(|_| StorageError::Corrupt(format!("assessment id: {}", doc.id)))?,
            account_id: Uuid::parse_str(&doc.account_id).map_err(|_| {
                StorageError::Corrupt(format!("assessment account id: {}", doc.account_id))
            })?,
            features: doc.features,
            probability: doc.probability,
            risk_tier: doc
                .risk_tier
                .parse::<RiskTier>()
                .map_err(|()| StorageError::Corrupt(format!("risk tier: {}", doc.risk_tier)))?,
            created_at: doc.created_at,
        })
    }
}

fn is_duplicate(err: &mongodb::error::Error) -> Option<&'static str> {
    use mongodb::error::{ErrorKind, WriteFailure};

    let (code, message) = match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            (write_error.code, write_error.message.as_str())
        }
        ErrorKind::Command(command_error) => (command_error.code, command_error.message.as_str()),
        _ => return None,
    };

    if code != 11000 {
        return None;
    }

    if message.contains("username") {
        Some("username")
    } else {
        Some("email")
    }
}

fn map_write_error(err: mongodb::error::Error) -> StorageError {
    match is_duplicate(&err) {
        Some(field) => StorageError::Duplicate(field),
        None => err.into(),
    }
}

fn filter_document(filter: &AssessmentFilter, account_id: Option<Uuid>) -> Document {
    let mut document = Document::new();

    if let Some(id) = account_id {
        document.insert("account_id", id.to_string());
    }
    if let Some(tier) = filter.risk {
        document.insert("risk_tier", tier.as_str());
    }

    let mut range = Document::new();
    if let Some(since) = filter.since {
        range.insert("$gte", Bson::DateTime(since.into()));
    }
    if let Some(until) = filter.until {
        range.insert("$lte", Bson::DateTime(until.into()));
    }
    if !range.is_empty() {
        document.insert("created_at", range);
    }

    document
}

pub struct MongoBackend {
    accounts: Collection<AccountDoc>,
    assessments: Collection<AssessmentDoc>,
    database: Database,
}

impl MongoBackend {
    /// Connect, verify reachability with a ping and create the indexes.
    ///
    /// # Errors
    /// Returns [`StorageError::Unavailable`] if the cluster does not answer
    /// within the server-selection timeout.
    pub async fn connect(dsn: &str) -> Result<Self, StorageError> {
        let mut options = ClientOptions::parse(dsn).await?;
        options.server_selection_timeout = Some(Duration::from_secs(5));
        options.app_name = Some(crate::APP_USER_AGENT.to_string());

        let database_name = options
            .default_database
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let client = Client::with_options(options)?;
        let database = client.database(&database_name);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|err| StorageError::Unavailable(err.to_string()))?;

        let backend = Self {
            accounts: database.collection(ACCOUNTS),
            assessments: database.collection(ASSESSMENTS),
            database,
        };
        backend.create_indexes().await?;

        info!("connected to MongoDB database {database_name}");

        Ok(backend)
    }

    async fn create_indexes(&self) -> Result<(), StorageError> {
        self.accounts
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "username": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;

        // Email is optional; enforce uniqueness only where it exists
        self.accounts
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .partial_filter_expression(doc! { "email": { "$exists": true } })
                            .build(),
                    )
                    .build(),
            )
            .await?;

        self.assessments
            .create_index(IndexModel::builder().keys(doc! { "account_id": 1 }).build())
            .await?;
        self.assessments
            .create_index(IndexModel::builder().keys(doc! { "created_at": -1 }).build())
            .await?;

        Ok(())
    }

    async fn usernames_for(
        &self,
        ids: &HashSet<String>,
    ) -> Result<HashMap<String, String>, StorageError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let id_list: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut cursor = self
            .accounts
            .find(doc! { "_id": { "$in": id_list } })
            .await?;

        let mut usernames = HashMap::new();
        while let Some(account) = cursor.try_next().await? {
            usernames.insert(account.id, account.username);
        }

        Ok(usernames)
    }
}

#[async_trait]
impl StorageBackend for MongoBackend {
    async fn insert_account(&self, account: &Account) -> Result<(), StorageError> {
        self.accounts
            .insert_one(AccountDoc::from(account))
            .await
            .map_err(map_write_error)?;

        Ok(())
    }

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, StorageError> {
        self.accounts
            .find_one(doc! { "username": username })
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, StorageError> {
        self.accounts
            .find_one(doc! { "_id": id.to_string() })
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn update_account(&self, id: Uuid, patch: &AccountPatch) -> Result<(), StorageError> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut set = Document::new();
        if let Some(username) = &patch.username {
            set.insert("username", username);
        }
        if let Some(email) = &patch.email {
            set.insert("email", email);
        }
        if let Some(password_hash) = &patch.password_hash {
            set.insert("password_hash", password_hash);
        }

        let result = self
            .accounts
            .update_one(doc! { "_id": id.to_string() }, doc! { "$set": set })
            .await
            .map_err(map_write_error)?;

        if result.matched_count == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<(), StorageError> {
        self.assessments
            .insert_one(AssessmentDoc::from(assessment))
            .await
            .map_err(map_write_error)?;

        Ok(())
    }

    async fn find_assessments_by_account(
        &self,
        account_id: Uuid,
        page: Page,
        filter: &AssessmentFilter,
    ) -> Result<Vec<Assessment>, StorageError> {
        let mut cursor = self
            .assessments
            .find(filter_document(filter, Some(account_id)))
            .sort(doc! { "created_at": -1, "_id": -1 })
            .skip(page.offset())
            .limit(i64::from(page.size()))
            .await?;

        let mut assessments = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            assessments.push(Assessment::try_from(doc)?);
        }

        Ok(assessments)
    }

    async fn find_all_assessments(
        &self,
        page: Page,
        filter: &AssessmentFilter,
    ) -> Result<Vec<AssessmentRow>, StorageError> {
        let mut cursor = self
            .assessments
            .find(filter_document(filter, None))
            .sort(doc! { "created_at": -1, "_id": -1 })
            .skip(page.offset())
            .limit(i64::from(page.size()))
            .await?;

        let mut docs = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            docs.push(doc);
        }

        let owner_ids: HashSet<String> =
            docs.iter().map(|doc| doc.account_id.clone()).collect();
        let usernames = self.usernames_for(&owner_ids).await?;

        docs.into_iter()
            .map(|doc| {
                let username = usernames
                    .get(&doc.account_id)
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string());
                Ok(AssessmentRow {
                    assessment: Assessment::try_from(doc)?,
                    username,
                })
            })
            .collect()
    }

    async fn count_assessments(
        &self,
        filter: &AssessmentFilter,
        account_id: Option<Uuid>,
    ) -> Result<u64, StorageError> {
        Ok(self
            .assessments
            .count_documents(filter_document(filter, account_id))
            .await?)
    }

    async fn list_patients(&self) -> Result<Vec<PatientSummary>, StorageError> {
        let mut cursor = self
            .accounts
            .find(doc! { "role": Role::Patient.as_str() })
            .sort(doc! { "created_at": -1, "_id": -1 })
            .await?;

        let mut roster = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            let assessments = self
                .assessments
                .count_documents(doc! { "account_id": &doc.id })
                .await?;

            let account = Account::try_from(doc)?;
            roster.push(PatientSummary {
                id: account.id,
                username: account.username,
                email: account.email,
                created_at: account.created_at,
                assessments,
            });
        }

        Ok(roster)
    }
}

impl std::fmt::Debug for MongoBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoBackend")
            .field("database", &self.database.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_document_shapes() {
        let empty = filter_document(&AssessmentFilter::default(), None);
        assert!(empty.is_empty());

        let id = Uuid::new_v4();
        let filter = AssessmentFilter {
            risk: Some(RiskTier::High),
            since: Some(Utc::now()),
            until: None,
        };
        let document = filter_document(&filter, Some(id));

        assert_eq!(
            document.get_str("account_id").unwrap(),
            id.to_string().as_str()
        );
        assert_eq!(document.get_str("risk_tier").unwrap(), "HIGH");
        let range = document.get_document("created_at").unwrap();
        assert!(range.contains_key("$gte"));
        assert!(!range.contains_key("$lte"));
    }

    #[test]
    fn test_account_doc_roundtrip() {
        let account = Account {
            id: Uuid::new_v4(),
            username: "mallory".to_string(),
            email: None,
            password_hash: "$argon2id$stub".to_string(),
            role: Role::Doctor,
            created_at: Utc::now(),
        };

        let doc = AccountDoc::from(&account);
        let back = Account::try_from(doc).unwrap();

        assert_eq!(back.id, account.id);
        assert_eq!(back.role, Role::Doctor);
        assert_eq!(back.email, None);
    }

    #[test]
    fn test_corrupt_doc_is_rejected() {
        let doc = AccountDoc {
            id: "not-a-uuid".to_string(),
            username: "x".to_string(),
            email: None,
            password_hash: String::new(),
            role: "patient".to_string(),
            created_at: Utc::now(),
        };

        assert!(matches!(
            Account::try_from(doc),
            Err(StorageError::Corrupt(_))
        ));
    }
}
