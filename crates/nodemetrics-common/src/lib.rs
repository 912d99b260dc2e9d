pub mod error;

pub use error::{MetricsError, Result};
