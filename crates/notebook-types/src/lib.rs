pub mod message;
pub mod event;
pub mod file;
pub mod model;
pub mod config;
pub mod error;
pub mod session;


pub use error::NotebookError;
pub type Result<T> = std::result::Result<T, NotebookError>;
