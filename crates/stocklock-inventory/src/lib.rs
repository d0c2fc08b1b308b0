//! Stocklock Inventory - the protected resource
//!
//! A single stock counter kept as a decimal string in the shared store. Every
//! read and every decrement happens while holding the distributed lock.

pub mod error;
pub mod model;
pub mod service;

pub use error::{InventoryError, InventoryResult};
pub use model::SaleOutcome;
pub use service::{DEFAULT_INVENTORY_KEY, InventoryService};
