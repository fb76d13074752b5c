//! The home screen: what is missing, what still needs preparing, what was ordered lately.

use std::sync::Arc;

use barkeep_core::Gateway;

use crate::core::notification::Notifier;
use crate::core::view::View;
use crate::core::view_model::ViewModel;
use crate::models::{MissingProduct, Order, Premix};

pub const DEFAULT_RECENT_ORDERS: usize = 10;

pub struct Dashboard {
    pub missing_products: ViewModel<MissingProduct>,
    pub pending_premixes: ViewModel<Premix>,
    pub recent_orders: ViewModel<Order>,
    notifier: Notifier,
}

impl Dashboard {
    /// Open the three view-models side by side, all reporting to `notifier`.
    pub async fn open(
        gateway: Arc<dyn Gateway>,
        notifier: Notifier,
        recent_orders_limit: usize,
    ) -> Self {
        let (missing_products, pending_premixes, recent_orders) = tokio::join!(
            ViewModel::open(
                Arc::clone(&gateway),
                View::<MissingProduct>::missing_products(),
                notifier.clone()
            ),
            ViewModel::open(
                Arc::clone(&gateway),
                View::<Premix>::pending_premixes(),
                notifier.clone()
            ),
            ViewModel::open(
                Arc::clone(&gateway),
                View::<Order>::recent_orders(recent_orders_limit),
                notifier.clone()
            ),
        );
        Self {
            missing_products,
            pending_premixes,
            recent_orders,
            notifier,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub async fn refresh(&self) {
        let _ = tokio::join!(
            self.missing_products.refresh(),
            self.pending_premixes.refresh(),
            self.recent_orders.refresh(),
        );
    }

    pub async fn close(&mut self) {
        self.missing_products.close().await;
        self.pending_premixes.close().await;
        self.recent_orders.close().await;
    }
}
