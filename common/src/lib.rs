//! Shared helpers for the source-finding workspace: logging setup,
//! serde file-format dispatch and test output locations.

pub mod file_format;
pub mod log_setup;
pub mod test_utils;

pub use file_format::{FileExtensionError, SerdeFormat, SerdeFormatError};
pub use log_setup::{setup_logging, LogSetupError};
