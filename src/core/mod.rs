pub mod config;
pub mod error;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::InstanceState;
