//! HTTP edge for the rebill billing service

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::{create_app_state, run, ApiPipeline};
pub use state::AppState;
