//! Main entry point for the stocklock server.
//!
//! Loads configuration, connects to Redis, and serves the inventory API. Run
//! several instances on different ports against the same Redis to see the
//! lock serialize their sales.

use std::sync::Arc;

use stocklock_inventory::InventoryService;
use stocklock_lock::{LockBackend, LockFactory};
use stocklock_server::{
    model::{AppState, Configuration},
    startup,
};
use stocklock_store::{RedisStore, SharedStore};
use tracing::info;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let configuration = Configuration::new()?;
    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    let server_address = configuration.server_address();
    let server_port = configuration.server_port();
    let redis_url = configuration.redis_url();
    let inventory_key = configuration.inventory_key();
    let lock_config = configuration.lock_config();

    // An unsupported backend tag fails start-up rather than the first sale.
    let backend: LockBackend = configuration.lock_backend().parse()?;

    info!(
        redis_url = %redis_url,
        backend = %backend,
        lock_key = %lock_config.key,
        ttl = ?lock_config.ttl,
        renewal = ?lock_config.renewal,
        "Connecting to shared store"
    );
    let store: Arc<dyn SharedStore> = Arc::new(RedisStore::new(&redis_url).await?);

    let factory = LockFactory::new(store.clone(), lock_config);
    let inventory = Arc::new(InventoryService::from_factory(
        store,
        &factory,
        backend,
        inventory_key,
        server_port,
    )?);

    let app_state = Arc::new(AppState {
        configuration,
        inventory,
    });

    info!(
        client_id = %factory.client_id(),
        "Stocklock server listening on {}:{}",
        server_address,
        server_port
    );
    startup::main_server(app_state, server_address, server_port)?.await?;

    info!("Stocklock server stopped");
    Ok(())
}
