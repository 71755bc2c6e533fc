//! Core types, schemas, and validation for the Pulse tracking pipeline.

pub mod device;
pub mod error;
pub mod event;
pub mod limits;
pub mod reports;
pub mod sanitize;
pub mod session;

pub use device::*;
pub use error::{Error, Result};
pub use event::*;
pub use reports::*;
pub use session::*;
