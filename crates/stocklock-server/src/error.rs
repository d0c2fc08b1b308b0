//! Error codes and the actix-web error wrapper

use std::fmt::{Display, Formatter};

use actix_web::HttpResponse;
use stocklock_inventory::InventoryError;
use stocklock_lock::LockError;

use crate::model::response as common;

/// Error code structure for API responses
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const STORE_UNAVAILABLE: ErrorCode<'static> = ErrorCode {
    code: 20001,
    message: "shared store unavailable",
};

pub const LOCK_TIMEOUT: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "lock acquisition timed out",
};

pub const DATA_CORRUPTED: ErrorCode<'static> = ErrorCode {
    code: 20003,
    message: "stored data is corrupted",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
};

// Local wrapper so actix-web's ResponseError can be implemented for anyhow errors
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError { inner: value }
    }
}

impl From<InventoryError> for AppError {
    fn from(value: InventoryError) -> Self {
        AppError {
            inner: value.into(),
        }
    }
}

impl AppError {
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// HTTP status and error code for this error.
    fn classify(&self) -> (u16, &'static ErrorCode<'static>) {
        let lock_error = match self.downcast_ref::<InventoryError>() {
            Some(e) if e.is_unavailable() => return (503, &STORE_UNAVAILABLE),
            Some(InventoryError::MalformedCounter { .. }) | Some(InventoryError::Store(_)) => {
                return (500, &DATA_CORRUPTED);
            }
            Some(InventoryError::Lock(e)) => Some(e),
            None => self.downcast_ref::<LockError>(),
        };

        match lock_error {
            Some(LockError::StoreUnavailable(_)) => (503, &STORE_UNAVAILABLE),
            Some(LockError::AcquireTimeout { .. }) => (503, &LOCK_TIMEOUT),
            Some(LockError::CorruptRecord(_)) => (500, &DATA_CORRUPTED),
            _ => (500, &SERVER_ERROR),
        }
    }
}

impl actix_web::error::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, code) = self.classify();
        if status >= 500 {
            tracing::error!(code = code.code, "Request failed: {}", self.inner);
        }
        common::Result::<String>::http_response(
            status,
            code.code,
            self.inner.to_string(),
            String::new(),
        )
    }
}
