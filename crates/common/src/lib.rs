//! appcheck Common Library
//!
//! Data model of the application under test, harness configuration,
//! test-category tags and synthetic test data shared by the harness crates.

pub mod config;
pub mod dates;
pub mod error;
pub mod random;
pub mod tags;
pub mod types;

// Re-export commonly used types
pub use config::{BrowserKind, BrowserSettings, HarnessConfig, Timeouts};
pub use error::{Error, Result};
pub use random::{passwords, RandomData};
pub use tags::{Tag, TagFilter};
pub use types::*;

/// appcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
