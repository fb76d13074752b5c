//! Gateway traits
//!
//! These traits describe the hosted backend as the view-models consume it. Implementations
//! talk to the real service (see `barkeep-supabase`) or hold everything in memory.

use async_trait::async_trait;

use barkeep_api::{ApiError, ChangeNotifications, ObjectRef, Query, Row, RowId};

pub type Result<T> = std::result::Result<T, ApiError>;

// Define MaybeSendSync trait alias for WASM compatibility
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSendSync: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync + ?Sized> MaybeSendSync for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSendSync {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSendSync for T {}

/// Row access for the tables of the backend.
///
/// Mutations only report success. The resulting state also reaches subscribers
/// through `ChangeNotifications`.
#[async_trait]
pub trait TableGateway: MaybeSendSync {
    /// Rows of `table` matching `query`, in the query's order
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>>;

    /// Insert a row, returning it as stored (with the server-assigned id)
    async fn insert(&self, table: &str, row: Row) -> Result<Row>;

    /// Overwrite the given columns of one row
    async fn update(&self, table: &str, id: RowId, patch: Row) -> Result<()>;

    async fn delete(&self, table: &str, id: RowId) -> Result<()>;
}

/// Bucketed object storage with public URLs.
#[async_trait]
pub trait ObjectStorage: MaybeSendSync {
    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<ObjectRef>;

    /// Public URL of an uploaded object. Computed locally, no request is made.
    fn public_url(&self, bucket: &str, name: &str) -> Result<String>;
}

/// Everything a view-model needs from the backend.
///
/// Blanket-implemented for any type providing rows, objects and change streams.
pub trait Gateway: TableGateway + ObjectStorage + ChangeNotifications {}

impl<T> Gateway for T where T: TableGateway + ObjectStorage + ChangeNotifications {}

#[cfg(test)]
mod tests {
    use super::*;
    use barkeep_api::{ChangeKind, Subscription};
    use std::sync::Arc;

    struct Offline;

    #[async_trait]
    impl TableGateway for Offline {
        async fn query(&self, _table: &str, _query: &Query) -> Result<Vec<Row>> {
            Ok(vec![])
        }

        async fn insert(&self, table: &str, _row: Row) -> Result<Row> {
            Err(ApiError::NetworkError {
                message: format!("offline, cannot insert into {}", table),
            })
        }

        async fn update(&self, table: &str, id: RowId, _patch: Row) -> Result<()> {
            Err(ApiError::RowNotFound {
                table: table.to_string(),
                id,
            })
        }

        async fn delete(&self, _table: &str, _id: RowId) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ObjectStorage for Offline {
        async fn upload_object(
            &self,
            _bucket: &str,
            _name: &str,
            _bytes: Vec<u8>,
            _content_type: Option<&str>,
        ) -> Result<ObjectRef> {
            Err(ApiError::StorageError {
                message: "offline".into(),
            })
        }

        fn public_url(&self, bucket: &str, name: &str) -> Result<String> {
            Ok(format!("offline://{}/{}", bucket, name))
        }
    }

    #[async_trait]
    impl ChangeNotifications for Offline {
        async fn subscribe(
            &self,
            _table: &str,
            _kinds: &[ChangeKind],
        ) -> std::result::Result<Subscription, ApiError> {
            Err(ApiError::SubscriptionError {
                message: "offline".into(),
            })
        }
    }

    #[tokio::test]
    async fn any_full_backend_is_a_gateway() {
        let gateway: Arc<dyn Gateway> = Arc::new(Offline);

        assert!(gateway.query("drinks", &Query::new()).await.unwrap().is_empty());
        assert!(matches!(
            gateway.insert("drinks", Row::new()).await,
            Err(ApiError::NetworkError { .. })
        ));
        assert_eq!(
            gateway.public_url("images", "a.png").unwrap(),
            "offline://images/a.png"
        );
        assert!(gateway.subscribe("drinks", &ChangeKind::ALL).await.is_err());
    }
}
