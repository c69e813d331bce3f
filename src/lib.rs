// Library exports shared by the server binary and the tests
pub mod cli;
pub mod config;
pub mod error;
pub mod image_processing;
pub mod report;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{ConfigError, ProcessingError, ProcessingResult};
pub use image_processing::{apply, list_operations, Operation, OperationDescriptor, OperationKind, RawParams};
