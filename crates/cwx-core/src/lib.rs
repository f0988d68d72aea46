pub mod config;
pub mod error;

pub use config::CwxConfig;
pub use error::{CwxError, CwxResult};
