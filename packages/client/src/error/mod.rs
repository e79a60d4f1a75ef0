mod classification;
pub(crate) mod constructors;
mod types;

pub(crate) use constructors::*;
pub use types::{Error, Kind, Result};

pub(crate) use types::BoxError;
