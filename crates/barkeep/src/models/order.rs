use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use barkeep_api::{ID_COLUMN, Query, Row, RowId};
use barkeep_core::{Draft, Entity, HasStatus, ValidationError, require};

use crate::core::view::View;

const RECEIPT_REQUIRED: &str = "Both fields are required.";
const PRODUCTS_REQUIRED: &str = "Products are required.";

/// Who took delivery of an order, and what they noted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub received_by: String,
    pub comment: String,
}

impl Receipt {
    pub fn new(received_by: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            received_by: received_by.into(),
            comment: comment.into(),
        }
    }

    fn trimmed(&self) -> Self {
        Self::new(self.received_by.trim(), self.comment.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Received(Receipt),
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Received(_) => "received",
        }
    }
}

/// A supplier order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OrderRow", into = "OrderRow")]
pub struct Order {
    pub id: RowId,
    pub name: String,
    pub products: Vec<String>,
    pub status: OrderStatus,
}

/// Flat column layout of the `orders` table.
#[derive(Serialize, Deserialize)]
struct OrderRow {
    id: RowId,
    name: String,
    #[serde(default)]
    products: Option<Vec<String>>,
    status: String,
    #[serde(default)]
    received_by: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

impl TryFrom<OrderRow> for Order {
    type Error = String;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "pending" => OrderStatus::Pending,
            "received" => {
                let received_by = row
                    .received_by
                    .ok_or_else(|| format!("received order {} has no received_by", row.id))?;
                OrderStatus::Received(Receipt {
                    received_by,
                    comment: row.comment.unwrap_or_default(),
                })
            }
            other => return Err(format!("unknown order status `{}`", other)),
        };
        Ok(Order {
            id: row.id,
            name: row.name,
            products: row.products.unwrap_or_default(),
            status,
        })
    }
}

impl From<Order> for OrderRow {
    fn from(order: Order) -> Self {
        let (received_by, comment) = match &order.status {
            OrderStatus::Pending => (None, None),
            OrderStatus::Received(receipt) => (
                Some(receipt.received_by.clone()),
                Some(receipt.comment.clone()),
            ),
        };
        OrderRow {
            id: order.id,
            name: order.name,
            products: Some(order.products),
            status: order.status.as_str().to_string(),
            received_by,
            comment,
        }
    }
}

impl Entity for Order {
    const TABLE: &'static str = "orders";
    const LABEL: &'static str = "order";
    const TITLE: &'static str = "Order";
    const PLURAL: &'static str = "orders";

    type Draft = OrderDraft;

    fn id(&self) -> RowId {
        self.id
    }
}

impl HasStatus for Order {
    type Status = OrderStatus;

    const STATUS_FAILURE: &'static str = "Failed to update order.";

    fn validate_status(status: &OrderStatus) -> Result<(), ValidationError> {
        if let OrderStatus::Received(receipt) = status {
            require(&receipt.received_by, RECEIPT_REQUIRED)?;
            require(&receipt.comment, RECEIPT_REQUIRED)?;
        }
        Ok(())
    }

    fn status_patch(status: &OrderStatus) -> Row {
        let mut row = Row::new();
        row.insert("status".into(), json!(status.as_str()));
        match status {
            OrderStatus::Pending => {
                row.insert("received_by".into(), json!(null));
                row.insert("comment".into(), json!(null));
            }
            OrderStatus::Received(receipt) => {
                let receipt = receipt.trimmed();
                row.insert("received_by".into(), json!(receipt.received_by));
                row.insert("comment".into(), json!(receipt.comment));
            }
        }
        row
    }

    fn with_status(&self, status: OrderStatus) -> Self {
        let status = match status {
            OrderStatus::Received(receipt) => OrderStatus::Received(receipt.trimmed()),
            pending => pending,
        };
        Self {
            status,
            ..self.clone()
        }
    }

    fn status_message(status: &OrderStatus) -> String {
        format!("Order marked as {}!", status.as_str())
    }
}

impl View<Order> {
    pub fn orders() -> Self {
        View::all("orders")
    }

    /// Newest orders first, at most `limit` of them.
    pub fn recent_orders(limit: usize) -> Self {
        View::new(
            "recent orders",
            Query::new().order_by(ID_COLUMN, false).limit(limit),
        )
    }
}

/// New order form: a comma separated product list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderDraft {
    pub products: String,
}

impl OrderDraft {
    pub fn new(products: impl Into<String>) -> Self {
        Self {
            products: products.into(),
        }
    }

    pub fn product_list(&self) -> Vec<String> {
        self.products
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Draft for OrderDraft {
    fn to_row(&self, _image_url: Option<String>) -> Result<Row, ValidationError> {
        let products = self.product_list();
        if products.is_empty() {
            return Err(ValidationError::new(PRODUCTS_REQUIRED));
        }
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut row = Row::new();
        row.insert("name".into(), json!(format!("Order - {}", now)));
        row.insert("products".into(), json!(products));
        row.insert("status".into(), json!(OrderStatus::Pending.as_str()));
        Ok(row)
    }
}
