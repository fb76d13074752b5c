pub mod core;
pub mod dashboard;
pub mod memory;
pub mod models;

pub use crate::core::notification::{Notification, Notifier, Severity};
pub use crate::core::reconcile::reconcile;
pub use crate::core::view::View;
pub use crate::core::view_model::{ViewModel, ViewModelError, IMAGES_BUCKET};
pub use dashboard::Dashboard;
pub use memory::{GatewayOp, MemoryGateway};
pub use models::{
    Drink, DrinkDraft, MissingProduct, MissingProductDraft, Order, OrderDraft, OrderStatus,
    Premix, PremixDraft, Receipt,
};
