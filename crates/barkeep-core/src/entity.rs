//! What a record type declares about itself so a generic view-model can manage it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use barkeep_api::{ApiError, Row, RowId};

use crate::traits::MaybeSendSync;
use crate::validation::ValidationError;

/// A record mirrored from one backend table.
pub trait Entity: Clone + fmt::Debug + PartialEq + DeserializeOwned + MaybeSendSync + 'static {
    /// Backend table holding the records
    const TABLE: &'static str;
    /// Singular noun used in messages, e.g. "drink"
    const LABEL: &'static str;
    /// Capitalised singular noun, e.g. "Drink"
    const TITLE: &'static str;
    /// Plural noun used in messages, e.g. "drinks"
    const PLURAL: &'static str;

    /// Creation form state for this record
    type Draft: Draft;

    fn id(&self) -> RowId;

    /// Parse a raw row, failing with `MalformedRow` when columns are missing or mistyped.
    fn from_row(row: Row) -> Result<Self, ApiError> {
        serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
            ApiError::MalformedRow {
                table: Self::TABLE.to_string(),
                message: e.to_string(),
            }
        })
    }
}

/// Form state for creating a record.
pub trait Draft: Default + Clone + fmt::Debug + MaybeSendSync {
    /// Build the row to insert. Required text is trimmed and must not be blank.
    ///
    /// `image_url` is the public URL of the uploaded attachment, if there was one.
    fn to_row(&self, image_url: Option<String>) -> Result<Row, ValidationError>;

    fn validate(&self) -> Result<(), ValidationError> {
        self.to_row(None).map(|_| ())
    }

    fn image(&self) -> Option<&ImageAttachment> {
        None
    }
}

/// Records with a status column that can be changed after creation.
pub trait HasStatus: Entity {
    /// New status, including any data that must accompany it
    type Status: Clone + fmt::Debug + MaybeSendSync;

    /// Error message when the status update fails
    const STATUS_FAILURE: &'static str;

    fn validate_status(_status: &Self::Status) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Columns to send to the backend
    fn status_patch(status: &Self::Status) -> Row;

    /// This record with the status applied, other fields unchanged
    fn with_status(&self, status: Self::Status) -> Self;

    /// Success message for a status change
    fn status_message(status: &Self::Status) -> String;
}

/// An image picked for upload together with a draft.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl ImageAttachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Object name under which the image is stored: `<unix millis>-<file name>`.
    pub fn object_name(&self, unix_millis: i64) -> String {
        format!("{}-{}", unix_millis, self.file_name)
    }
}

impl fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::require;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Shelf {
        id: RowId,
        name: String,
    }

    #[derive(Debug, Clone, Default)]
    struct ShelfDraft {
        name: String,
    }

    impl Draft for ShelfDraft {
        fn to_row(&self, _image_url: Option<String>) -> Result<Row, ValidationError> {
            let name = require(&self.name, "Name is required.")?;
            let mut row = Row::new();
            row.insert("name".into(), json!(name));
            Ok(row)
        }
    }

    impl Entity for Shelf {
        const TABLE: &'static str = "shelves";
        const LABEL: &'static str = "shelf";
        const TITLE: &'static str = "Shelf";
        const PLURAL: &'static str = "shelves";
        type Draft = ShelfDraft;

        fn id(&self) -> RowId {
            self.id
        }
    }

    #[test]
    fn rows_parse_into_records() {
        let row = json!({"id": 4, "name": "Top"}).as_object().cloned().unwrap();
        let shelf = Shelf::from_row(row).unwrap();
        assert_eq!(
            shelf,
            Shelf {
                id: RowId(4),
                name: "Top".into()
            }
        );
    }

    #[test]
    fn missing_column_is_a_malformed_row() {
        let row = json!({"id": 4}).as_object().cloned().unwrap();
        let err = Shelf::from_row(row).unwrap_err();
        assert!(matches!(err, ApiError::MalformedRow { ref table, .. } if table == "shelves"));
    }

    #[test]
    fn validate_uses_the_row_builder() {
        assert!(ShelfDraft::default().validate().is_err());
        assert!(ShelfDraft { name: " a ".into() }.validate().is_ok());
    }

    #[test]
    fn image_object_name_is_prefixed_with_millis() {
        let image = ImageAttachment::new("lime.png", vec![1, 2, 3]).with_content_type("image/png");
        assert_eq!(image.object_name(1700000000000), "1700000000000-lime.png");
        assert!(format!("{:?}", image).contains("bytes: 3"));
    }
}
