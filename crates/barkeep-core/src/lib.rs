//! Core traits for barkeep gateways and entities
//!
//! This crate provides:
//! - `TableGateway` / `ObjectStorage`: row and object access against a hosted backend
//! - `Gateway`: everything a view-model needs, including change notifications
//! - `Entity` / `Draft` / `HasStatus`: what a record type declares about itself

pub mod entity;
pub mod traits;
pub mod validation;

pub use entity::{Draft, Entity, HasStatus, ImageAttachment};
pub use traits::{Gateway, MaybeSendSync, ObjectStorage, Result, TableGateway};
pub use validation::{require, ValidationError};
