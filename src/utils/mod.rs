pub mod error;

pub use error::{CondensateError, Result};
