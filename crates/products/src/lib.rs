//! Products domain module.
//!
//! Products, their cached offers, and the reconciliation rules that keep the
//! cache aligned with the upstream offers service. Pure domain logic: no IO,
//! no HTTP, no storage.

pub mod offer;
pub mod product;
pub mod reconcile;

pub use offer::{ExternalOffer, Offer};
pub use product::{NewProduct, Product, ProductUpdate};
pub use reconcile::{ReconcilePlan, ReconcileSummary};
