//! Common types for the Z.AI token pool workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
