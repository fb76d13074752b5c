pub mod notification;
pub mod reconcile;
pub mod view;
pub mod view_model;
