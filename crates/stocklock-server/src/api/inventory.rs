//! Inventory API handlers
//!
//! - GET|POST /inventory/sale - Sell one unit
//! - GET /inventory - Current stock

use actix_web::{HttpResponse, Responder, Scope, get, post, web};
use tracing::warn;

use crate::{error::AppError, model::AppState, model::response::Result};

async fn sell(data: &AppState) -> std::result::Result<HttpResponse, AppError> {
    let outcome = data.inventory.sale().await.inspect_err(|e| {
        warn!(port = data.inventory.port(), "Sale failed: {}", e);
    })?;
    Ok(Result::<String>::http_success(outcome.to_string()))
}

/// Sell one unit
///
/// GET /inventory/sale
#[get("/sale")]
pub async fn sale(data: web::Data<AppState>) -> std::result::Result<impl Responder, AppError> {
    sell(&data).await
}

/// Sell one unit
///
/// POST /inventory/sale
#[post("/sale")]
pub async fn sale_post(
    data: web::Data<AppState>,
) -> std::result::Result<impl Responder, AppError> {
    sell(&data).await
}

/// Current stock, read while holding the lock
///
/// GET /inventory
#[get("")]
pub async fn stock(data: web::Data<AppState>) -> std::result::Result<impl Responder, AppError> {
    let stock = data.inventory.stock().await?;
    Ok(Result::<u64>::http_success(stock))
}

pub fn routes() -> Scope {
    web::scope("/inventory")
        .service(sale)
        .service(sale_post)
        .service(stock)
}
