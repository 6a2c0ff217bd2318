//! Shared test utilities for DocMind test suites.
//!
//! - [`workspace`]: temp-directory + sample-document fixtures
//! - [`cli`]: `docmind` binary command builders with clean environments
//! - [`logging`]: test logging configuration
//! - [`assertions`]: domain-specific assertion helpers

pub mod assertions;
pub mod cli;
pub mod logging;
pub mod workspace;

pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::cli::{command_for, docmind_command};
    pub use crate::logging::{init_test_logging, suppress_logs};
    pub use crate::workspace::{data_dir, source_folder_with_files, temp_dir};
}
