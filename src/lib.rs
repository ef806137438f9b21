pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod services;
pub mod validation;

pub use error::{ConvertError, Result};
pub use models::*;
pub use output::*;
pub use services::*;
