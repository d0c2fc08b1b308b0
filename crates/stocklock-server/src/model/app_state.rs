//! Application state shared across all handlers

use std::sync::Arc;

use stocklock_inventory::InventoryService;

use super::config::Configuration;

#[derive(Clone)]
pub struct AppState {
    pub configuration: Configuration,
    pub inventory: Arc<InventoryService>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("configuration", &self.configuration)
            .field("inventory_key", &self.inventory.inventory_key())
            .field("port", &self.inventory.port())
            .finish()
    }
}
