//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic business rejection. Storage and transport failures
/// belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Malformed input (non-positive quantity, blank code, unparsable id, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested appointment status change is not in the transition table.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Usage or notes mutation attempted on a COMPLETED or CANCELLED appointment.
    #[error("appointment is closed ({status}); no further changes allowed")]
    AppointmentTerminal { status: String },

    /// A decreasing stock movement would drive the stock below zero.
    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock {
        available: Decimal,
        requested: Decimal,
    },

    /// Consumption attempted on a deactivated material.
    #[error("material is inactive: {0}")]
    MaterialInactive(String),

    /// Optimistic concurrency collision; re-read and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller lacks the permission required for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Stable machine-readable code, used for logs and HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound { .. } => "not_found",
            DomainError::InvalidArgument(_) => "invalid_argument",
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::AppointmentTerminal { .. } => "appointment_terminal",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::MaterialInactive(_) => "material_inactive",
            DomainError::Conflict(_) => "conflict",
            DomainError::PermissionDenied(_) => "permission_denied",
        }
    }

    /// Only optimistic concurrency collisions are safe to retry after re-reading state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Conflict(_))
    }
}
