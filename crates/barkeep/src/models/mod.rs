//! Records mirrored from the backend tables, with their creation drafts.

mod drink;
mod missing_product;
mod order;
mod premix;

pub use drink::{Drink, DrinkDraft};
pub use missing_product::{MissingProduct, MissingProductDraft};
pub use order::{Order, OrderDraft, OrderStatus, Receipt};
pub use premix::{Premix, PremixDraft};
