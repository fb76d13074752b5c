use serde::{Deserialize, Serialize};
use serde_json::json;

use barkeep_api::{Query, Row, RowId};
use barkeep_core::{Draft, Entity, HasStatus, ImageAttachment, ValidationError};

use super::drink::recipe_row;
use crate::core::view::View;

/// A batch preparation made ahead of service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Premix {
    pub id: RowId,
    pub name: String,
    pub ingredients: String,
    pub preparation: String,
    #[serde(default)]
    pub image: Option<String>,
    /// `false` while pending, `true` once ready
    #[serde(rename = "status")]
    pub ready: bool,
}

impl Entity for Premix {
    const TABLE: &'static str = "premixes";
    const LABEL: &'static str = "premix";
    const TITLE: &'static str = "Premix";
    const PLURAL: &'static str = "premixes";

    type Draft = PremixDraft;

    fn id(&self) -> RowId {
        self.id
    }
}

impl HasStatus for Premix {
    type Status = bool;

    const STATUS_FAILURE: &'static str = "Failed to update premix status.";

    fn status_patch(ready: &bool) -> Row {
        let mut row = Row::new();
        row.insert("status".into(), json!(ready));
        row
    }

    fn with_status(&self, ready: bool) -> Self {
        Self {
            ready,
            ..self.clone()
        }
    }

    fn status_message(ready: &bool) -> String {
        format!("Premix marked as {}", if *ready { "Ready" } else { "Pending" })
    }
}

fn is_pending(premix: &Premix) -> bool {
    !premix.ready
}

impl View<Premix> {
    pub fn premixes() -> Self {
        View::all("premixes")
    }

    /// Premixes still to be prepared, as shown on the home screen.
    pub fn pending_premixes() -> Self {
        View::filtered(
            "pending premixes",
            Query::new().eq("status", false).order_by(barkeep_api::ID_COLUMN, true),
            is_pending,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PremixDraft {
    pub name: String,
    pub ingredients: String,
    pub preparation: String,
    pub image: Option<ImageAttachment>,
}

impl Draft for PremixDraft {
    /// New premixes always start pending.
    fn to_row(&self, image_url: Option<String>) -> Result<Row, ValidationError> {
        let mut row = recipe_row(&self.name, &self.ingredients, &self.preparation, image_url)?;
        row.insert("status".into(), json!(false));
        Ok(row)
    }

    fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_column_maps_to_ready() {
        let row = json!({
            "id": 3, "name": "Sour mix", "ingredients": "lemon, sugar",
            "preparation": "shake", "image": null, "status": true
        });
        let premix = Premix::from_row(row.as_object().cloned().unwrap()).unwrap();
        assert!(premix.ready);
        assert_eq!(serde_json::to_value(&premix).unwrap()["status"], json!(true));
    }

    #[test]
    fn new_premix_rows_are_pending() {
        let draft = PremixDraft {
            name: "Orgeat".into(),
            ingredients: "almond".into(),
            preparation: "blend".into(),
            image: None,
        };
        assert_eq!(draft.to_row(None).unwrap()["status"], json!(false));
    }

    #[test]
    fn status_messages() {
        assert_eq!(Premix::status_message(&true), "Premix marked as Ready");
        assert_eq!(Premix::status_message(&false), "Premix marked as Pending");
    }
}
