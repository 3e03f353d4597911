//! Common infrastructure: unified errors and logging

pub mod error;
pub mod logger;

pub use error::{AppError, AppResponse, ok};

/// Application-level result type
pub type AppResult<T> = Result<T, AppError>;
