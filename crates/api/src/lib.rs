//! HTTP API for the clinic core: identity headers, routing, request/response mapping.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
