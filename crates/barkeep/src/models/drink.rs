use serde::{Deserialize, Serialize};
use serde_json::json;

use barkeep_api::{Row, RowId};
use barkeep_core::{Draft, Entity, ImageAttachment, ValidationError, require};

use crate::core::view::View;

pub(crate) const RECIPE_REQUIRED: &str = "All fields are required.";

/// A drink on the menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drink {
    pub id: RowId,
    pub name: String,
    pub ingredients: String,
    pub preparation: String,
    /// Public URL of the drink's picture
    #[serde(default)]
    pub image: Option<String>,
}

impl Entity for Drink {
    const TABLE: &'static str = "drinks";
    const LABEL: &'static str = "drink";
    const TITLE: &'static str = "Drink";
    const PLURAL: &'static str = "drinks";

    type Draft = DrinkDraft;

    fn id(&self) -> RowId {
        self.id
    }
}

impl View<Drink> {
    pub fn drinks() -> Self {
        View::all("drinks")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrinkDraft {
    pub name: String,
    pub ingredients: String,
    pub preparation: String,
    pub image: Option<ImageAttachment>,
}

impl Draft for DrinkDraft {
    fn to_row(&self, image_url: Option<String>) -> Result<Row, ValidationError> {
        recipe_row(&self.name, &self.ingredients, &self.preparation, image_url)
    }

    fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }
}

/// Row shared by drinks and premixes.
pub(crate) fn recipe_row(
    name: &str,
    ingredients: &str,
    preparation: &str,
    image_url: Option<String>,
) -> Result<Row, ValidationError> {
    let mut row = Row::new();
    row.insert("name".into(), json!(require(name, RECIPE_REQUIRED)?));
    row.insert(
        "ingredients".into(),
        json!(require(ingredients, RECIPE_REQUIRED)?),
    );
    row.insert(
        "preparation".into(),
        json!(require(preparation, RECIPE_REQUIRED)?),
    );
    row.insert("image".into(), json!(image_url));
    Ok(row)
}
