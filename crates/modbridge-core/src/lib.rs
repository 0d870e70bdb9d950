//! # modbridge-core
//!
//! Core crate for the native module bridge. Contains configuration
//! schemas, typed handle identifiers and the unified error system.
//!
//! This crate has **no** knowledge of the vendor ABI; see `modbridge-sdk`.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
