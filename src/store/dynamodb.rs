//! DynamoDB storage backend for task persistence.
//!
//! [`DynamoDbBackend`] implements [`StorageBackend`] over a single DynamoDB
//! table. The two trait methods map to `GetItem` and `PutItem`.
//!
//! # Table Layout
//!
//! | Attribute | Type   | Description                          |
//! |-----------|--------|--------------------------------------|
//! | `PK`      | String | Partition key: `SERVICE#<service>`   |
//! | `SK`      | String | Sort key: `TASK#<task_id>`           |
//! | `data`    | String | Serialized task JSON                 |
//!
//! Every service's tasks share one partition, so a service cannot read
//! another service's cache entries even when cache keys collide.
//!
//! # Usage
//!
//! ```rust,no_run
//! use geoprocessing::store::dynamodb::DynamoDbBackend;
//! use geoprocessing::store::generic::GenericTaskStore;
//!
//! # async fn example() {
//! let backend = DynamoDbBackend::from_env_with_table("geoprocessing_tasks").await;
//! let store = GenericTaskStore::new(backend);
//! # }
//! ```

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;

use crate::constants::DEFAULT_TASKS_TABLE;
use crate::store::backend::{parse_key, StorageBackend, StorageError};

/// DynamoDB storage backend.
///
/// A thin adapter with no domain logic: it stores and returns opaque JSON
/// blobs keyed by `PK = SERVICE#<service>`, `SK = TASK#<task_id>`.
#[derive(Debug, Clone)]
pub struct DynamoDbBackend {
    client: Client,
    table_name: String,
}

impl DynamoDbBackend {
    /// Creates a backend with a pre-built DynamoDB client.
    ///
    /// The table must already exist with `PK` (String, partition key) and
    /// `SK` (String, sort key).
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use geoprocessing::store::dynamodb::DynamoDbBackend;
    ///
    /// # async fn example() {
    /// let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    /// let client = aws_sdk_dynamodb::Client::new(&config);
    /// let backend = DynamoDbBackend::new(client, "my_tasks_table");
    /// # }
    /// ```
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Creates a backend using the standard AWS SDK config chain and the
    /// default table name (`geoprocessing_tasks`).
    pub async fn from_env() -> Self {
        Self::from_env_with_table(DEFAULT_TASKS_TABLE).await
    }

    /// Creates a backend from the standard AWS SDK config chain with a
    /// custom table name.
    pub async fn from_env_with_table(table_name: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);
        Self::new(client, table_name)
    }

    /// Returns the table this backend writes to.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

fn make_pk(service: &str) -> String {
    format!("SERVICE#{service}")
}

fn make_sk(task_id: &str) -> String {
    format!("TASK#{task_id}")
}

/// Splits a composite `{service}:{task_id}` key into `(PK, SK)`.
fn split_key(key: &str) -> Result<(String, String), StorageError> {
    let (service, task_id) = parse_key(key).ok_or_else(|| StorageError::InvalidKey {
        key: key.to_string(),
    })?;
    Ok((make_pk(&service), make_sk(task_id)))
}

fn map_sdk_error(err: impl std::error::Error + Send + Sync + 'static, key: &str) -> StorageError {
    StorageError::Backend {
        message: format!("DynamoDB error for key {key}: {err}"),
        source: Some(Box::new(err)),
    }
}

#[async_trait]
impl StorageBackend for DynamoDbBackend {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let (pk, sk) = split_key(key)?;

        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk))
            .key("SK", AttributeValue::S(sk))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key))?;

        let item = result.item().ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })?;

        let data = item
            .get("data")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| StorageError::Backend {
                message: format!("missing or invalid data attribute for key {key}"),
                source: None,
            })?;

        Ok(data.as_bytes().to_vec())
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let (pk, sk) = split_key(key)?;
        let data_str = std::str::from_utf8(data).map_err(|e| StorageError::Backend {
            message: format!("data is not valid UTF-8: {e}"),
            source: Some(Box::new(e)),
        })?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("PK", AttributeValue::S(pk))
            .item("SK", AttributeValue::S(sk))
            .item("data", AttributeValue::S(data_str.to_string()))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_key_builds_service_partition() {
        let (pk, sk) = split_key("area:abc").unwrap();
        assert_eq!(pk, "SERVICE#area");
        assert_eq!(sk, "TASK#abc");
    }

    #[test]
    fn split_key_keeps_colons_in_task_id() {
        let (_, sk) = split_key("area:tile:1:2").unwrap();
        assert_eq!(sk, "TASK#tile:1:2");
    }

    #[test]
    fn split_key_unescapes_service_partition() {
        let key = crate::store::backend::make_key("area:zonal", "k");
        let (pk, sk) = split_key(&key).unwrap();
        assert_eq!(pk, "SERVICE#area:zonal");
        assert_eq!(sk, "TASK#k");

        let (pk, sk) = split_key(&crate::store::backend::make_key("area", "zonal:k")).unwrap();
        assert_eq!(pk, "SERVICE#area");
        assert_eq!(sk, "TASK#zonal:k");
    }

    #[test]
    fn split_key_rejects_bare_key() {
        assert!(matches!(
            split_key("nocolon"),
            Err(StorageError::InvalidKey { .. })
        ));
    }
}
