use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::AttributeValue,
};
use tracing::{debug, instrument};

use super::{AttendanceStore, ScanCursor, ScanPage, StoreError, StoreResult};
use crate::{
    config::DynamoDbStoreConfig,
    models::{RecordKey, StoredRecord},
};

const ATTR_USER_ID: &str = "user_id";
const ATTR_USERNAME: &str = "username";
const ATTR_STATUS: &str = "status";
const ATTR_TIMESTAMP: &str = "timestamp";

/// Service error codes that mean "try again later".
const TRANSIENT_ERROR_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
    "InternalServerError",
    "ServiceUnavailable",
];

type Item = HashMap<String, AttributeValue>;

/// Amazon DynamoDB record store.
///
/// Expects a table whose partition key is `user_id` and sort key is
/// `timestamp`, both strings. Works against any DynamoDB-compatible
/// endpoint (DynamoDB Local, LocalStack) via `endpoint_url`.
///
/// Requires the `dynamodb` feature.
pub struct DynamoDbStore {
    client: Client,
    table_name: String,
    page_limit: Option<i32>,
}

impl DynamoDbStore {
    pub async fn new(config: &DynamoDbStoreConfig) -> StoreResult<Self> {
        tracing::info!(
            table = %config.table_name,
            region = %config.region,
            "Initializing DynamoDB record store"
        );

        let mut sdk_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        // Set credentials if specified in config
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = aws_credential_types::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None, // session token
                None, // expiry
                "rollcall-config",
            );
            sdk_config_builder = sdk_config_builder.credentials_provider(credentials);
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut dynamo_config_builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            dynamo_config_builder = dynamo_config_builder.endpoint_url(endpoint);
        }

        let page_limit = match config.page_limit {
            Some(limit) => Some(i32::try_from(limit).map_err(|_| {
                StoreError::NotConfigured(format!("page_limit {limit} is too large"))
            })?),
            None => None,
        };

        Ok(Self {
            client: Client::from_conf(dynamo_config_builder.build()),
            table_name: config.table_name.clone(),
            page_limit,
        })
    }
}

/// Map an SDK error onto the store's error taxonomy.
fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{operation}: {}", DisplayErrorContext(&err));
    match &err {
        SdkError::ServiceError(ctx) => {
            let code = ctx.err().code().unwrap_or_default();
            if TRANSIENT_ERROR_CODES.contains(&code) {
                StoreError::Unavailable(message)
            } else {
                StoreError::Backend(message)
            }
        }
        SdkError::ConstructionFailure(_) => StoreError::Backend(message),
        // Timeouts, dispatch failures and unparseable responses
        _ => StoreError::Unavailable(message),
    }
}

fn string_attr(item: &Item, name: &str) -> Option<String> {
    item.get(name).and_then(|v| v.as_s().ok()).cloned()
}

/// Convert a scanned item. Missing or non-string attributes become empty
/// strings so the record still surfaces and fails decoding downstream.
fn record_from_item(item: &Item) -> StoredRecord {
    StoredRecord {
        user_id: string_attr(item, ATTR_USER_ID).unwrap_or_default(),
        username: string_attr(item, ATTR_USERNAME),
        status: string_attr(item, ATTR_STATUS).unwrap_or_default(),
        timestamp: string_attr(item, ATTR_TIMESTAMP).unwrap_or_default(),
    }
}

fn item_from_record(record: &StoredRecord) -> Item {
    let mut item = Item::new();
    item.insert(
        ATTR_USER_ID.to_string(),
        AttributeValue::S(record.user_id.clone()),
    );
    item.insert(
        ATTR_TIMESTAMP.to_string(),
        AttributeValue::S(record.timestamp.clone()),
    );
    item.insert(
        ATTR_STATUS.to_string(),
        AttributeValue::S(record.status.clone()),
    );
    if let Some(username) = &record.username {
        item.insert(
            ATTR_USERNAME.to_string(),
            AttributeValue::S(username.clone()),
        );
    }
    item
}

fn key_item(key: &RecordKey) -> Item {
    let mut item = Item::new();
    item.insert(
        ATTR_USER_ID.to_string(),
        AttributeValue::S(key.user_id.clone()),
    );
    item.insert(
        ATTR_TIMESTAMP.to_string(),
        AttributeValue::S(key.timestamp.clone()),
    );
    item
}

fn cursor_from_last_key(last_key: &Item) -> StoreResult<ScanCursor> {
    match (
        string_attr(last_key, ATTR_USER_ID),
        string_attr(last_key, ATTR_TIMESTAMP),
    ) {
        (Some(user_id), Some(timestamp)) => Ok(ScanCursor::after(RecordKey::new(user_id, timestamp))),
        _ => Err(StoreError::Backend(format!(
            "unexpected LastEvaluatedKey shape: {:?}",
            last_key.keys().collect::<Vec<_>>()
        ))),
    }
}

#[async_trait]
impl AttendanceStore for DynamoDbStore {
    #[instrument(skip(self, record), fields(table = %self.table_name, user_id = %record.user_id))]
    async fn insert(&self, record: &StoredRecord) -> StoreResult<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item_from_record(record)))
            .send()
            .await
            .map_err(|e| classify("PutItem", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(table = %self.table_name))]
    async fn delete(&self, key: &RecordKey) -> StoreResult<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key_item(key)))
            .send()
            .await
            .map_err(|e| classify("DeleteItem", e))?;
        Ok(())
    }

    #[instrument(skip(self, cursor), fields(table = %self.table_name))]
    async fn scan_page(&self, cursor: Option<&ScanCursor>) -> StoreResult<ScanPage> {
        let output = self
            .client
            .scan()
            .table_name(&self.table_name)
            .set_limit(self.page_limit)
            .set_exclusive_start_key(cursor.map(|c| key_item(c.last_key())))
            .send()
            .await
            .map_err(|e| classify("Scan", e))?;

        let records: Vec<StoredRecord> = output.items().iter().map(record_from_item).collect();
        let next = match output.last_evaluated_key() {
            Some(last_key) if !last_key.is_empty() => Some(cursor_from_last_key(last_key)?),
            _ => None,
        };

        debug!(records = records.len(), more = next.is_some(), "Scanned DynamoDB page");
        Ok(ScanPage { records, next })
    }

    fn backend_name(&self) -> &'static str {
        "dynamodb"
    }
}
