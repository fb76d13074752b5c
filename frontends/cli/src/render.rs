//! Plain-text rendering of rows for the terminal.

use barkeep::{Drink, MissingProduct, Order, OrderStatus, Premix};

/// One line of terminal output per row
pub trait Line {
    fn line(&self) -> String;
}

impl Line for Drink {
    fn line(&self) -> String {
        format!(
            "#{} {}: {} ({})",
            self.id, self.name, self.ingredients, self.preparation
        )
    }
}

impl Line for Premix {
    fn line(&self) -> String {
        let status = if self.ready { "ready" } else { "pending" };
        format!("#{} {} [{}]", self.id, self.name, status)
    }
}

impl Line for Order {
    fn line(&self) -> String {
        let products = self.products.join(", ");
        match &self.status {
            OrderStatus::Pending => format!("#{} {} - pending: {}", self.id, self.name, products),
            OrderStatus::Received(receipt) => format!(
                "#{} {} - received by {} ({}): {}",
                self.id, self.name, receipt.received_by, receipt.comment, products
            ),
        }
    }
}

impl Line for MissingProduct {
    fn line(&self) -> String {
        format!("#{} {}", self.id, self.name)
    }
}

/// A titled block of lines, with a placeholder when empty.
pub fn section<T: Line>(title: &str, rows: &[T]) -> String {
    let mut out = format!("== {} ({}) ==\n", title, rows.len());
    if rows.is_empty() {
        out.push_str("  (none)\n");
    }
    for row in rows {
        out.push_str("  ");
        out.push_str(&row.line());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use barkeep::Receipt;
    use barkeep_api::RowId;

    #[test]
    fn received_order_shows_receipt() {
        let order = Order {
            id: RowId(3),
            name: "Order - 2024-05-01T10:00:00.000Z".into(),
            products: vec!["Gin".into(), "Tonic".into()],
            status: OrderStatus::Received(Receipt::new("Alice", "ok")),
        };
        assert_eq!(
            order.line(),
            "#3 Order - 2024-05-01T10:00:00.000Z - received by Alice (ok): Gin, Tonic"
        );
    }

    #[test]
    fn empty_section_says_so() {
        let rows: Vec<MissingProduct> = vec![];
        assert_eq!(section("Missing products", &rows), "== Missing products (0) ==\n  (none)\n");
    }

    #[test]
    fn section_lists_rows() {
        let rows = vec![
            MissingProduct { id: RowId(1), name: "Limes".into() },
            MissingProduct { id: RowId(2), name: "Mint".into() },
        ];
        assert_eq!(
            section("Missing products", &rows),
            "== Missing products (2) ==\n  #1 Limes\n  #2 Mint\n"
        );
    }
}
