use serde::{Deserialize, Serialize};
use serde_json::json;

use barkeep_api::{Row, RowId};
use barkeep_core::{Draft, Entity, ValidationError, require};

use crate::core::view::View;

/// Something the bar ran out of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingProduct {
    pub id: RowId,
    pub name: String,
}

impl Entity for MissingProduct {
    const TABLE: &'static str = "missing_products";
    const LABEL: &'static str = "product";
    const TITLE: &'static str = "Product";
    const PLURAL: &'static str = "products";

    type Draft = MissingProductDraft;

    fn id(&self) -> RowId {
        self.id
    }
}

impl View<MissingProduct> {
    pub fn missing_products() -> Self {
        View::all("missing products")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingProductDraft {
    pub name: String,
}

impl MissingProductDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Draft for MissingProductDraft {
    fn to_row(&self, _image_url: Option<String>) -> Result<Row, ValidationError> {
        let mut row = Row::new();
        row.insert(
            "name".into(),
            json!(require(&self.name, "Product name is required.")?),
        );
        Ok(row)
    }
}
