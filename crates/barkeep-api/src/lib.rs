use serde::{Deserialize, Serialize};
use std::fmt;

pub mod query;
pub mod streaming;

pub use query::{Filter, Order, Query};

// Re-export streaming types
pub use streaming::{
    Change, ChangeEvent, ChangeKind, ChangeNotifications, ChangeOrigin, Subscription,
    SubscriptionId,
};

/// A row as it travels over the wire: a JSON object keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Column holding the server-assigned identifier in every table.
pub const ID_COLUMN: &str = "id";

/// Server-assigned row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub i64);

impl RowId {
    /// Read the `id` column out of a raw row.
    pub fn from_row(table: &str, row: &Row) -> Result<Self, ApiError> {
        row.get(ID_COLUMN)
            .and_then(serde_json::Value::as_i64)
            .map(RowId)
            .ok_or_else(|| ApiError::MalformedRow {
                table: table.to_string(),
                message: format!("missing or non-integer `{}` column", ID_COLUMN),
            })
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RowId {
    fn from(id: i64) -> Self {
        RowId(id)
    }
}

/// Reference to an object stored in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub name: String,
}

/// Errors surfaced by a gateway (the hosted backend or a stand-in for it).
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
pub enum ApiError {
    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("HTTP {status} from {url}: {body}")]
    HttpError {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Malformed row in {table}: {message}")]
    MalformedRow { table: String, message: String },

    #[error("Malformed change event on {table}: {message}")]
    MalformedEvent { table: String, message: String },

    #[error("Row {id} not found in {table}")]
    RowNotFound { table: String, id: RowId },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Subscription error: {message}")]
    SubscriptionError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_id_is_read_from_id_column() {
        let row = json!({"id": 42, "name": "Gin"});
        let row = row.as_object().unwrap();
        assert_eq!(RowId::from_row("drinks", row).unwrap(), RowId(42));
    }

    #[test]
    fn row_without_integer_id_is_malformed() {
        let row = json!({"id": "abc"});
        let err = RowId::from_row("drinks", row.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, ApiError::MalformedRow { ref table, .. } if table == "drinks"));
    }

    #[test]
    fn row_id_serializes_transparently() {
        assert_eq!(serde_json::to_string(&RowId(7)).unwrap(), "7");
        let id: RowId = serde_json::from_str("7").unwrap();
        assert_eq!(id, RowId(7));
    }
}
