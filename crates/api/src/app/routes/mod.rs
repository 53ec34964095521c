use axum::Router;

pub mod appointments;
pub mod materials;
pub mod reports;
pub mod system;
pub mod usages;

/// Router for all endpoints that require a caller identity.
pub fn router() -> Router {
    Router::new()
        .nest("/appointments", appointments::router())
        .nest("/material-usages", usages::router())
        .nest("/materials", materials::router())
        .nest("/reports", reports::router())
}
