use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use clinicore_core::DomainError;
use clinicore_infra::command_dispatcher::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Domain(e) => domain_error_to_response(e),
        DispatchError::Integrity(msg) => {
            tracing::error!(error = %msg, "stream integrity violation");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "integrity_error", msg)
        }
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match &err {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::InvalidArgument(_) | DomainError::MaterialInactive(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DomainError::InvalidTransition { .. }
        | DomainError::AppointmentTerminal { .. }
        | DomainError::InsufficientStock { .. }
        | DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::PermissionDenied(_) => StatusCode::FORBIDDEN,
    };
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
