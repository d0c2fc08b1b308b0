use std::fmt::{Display, Formatter};

/// Result of one sale attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleOutcome {
    /// One unit was sold; `port` identifies the serving instance
    Sold { remaining: u64, port: u16 },
    InsufficientStock,
}

impl SaleOutcome {
    pub fn is_sold(&self) -> bool {
        matches!(self, SaleOutcome::Sold { .. })
    }
}

impl Display for SaleOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SaleOutcome::Sold { remaining, port } => write!(
                f,
                "sale succeeded, {} remaining, served by port {}",
                remaining, port
            ),
            SaleOutcome::InsufficientStock => f.write_str("insufficient stock"),
        }
    }
}
