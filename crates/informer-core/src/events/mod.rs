//! Informer data model
//!
//! Raw probe notifications come in, settled objects are tracked, and
//! lifecycle events go out.

pub mod lifecycle;
pub mod notification;
pub mod object;

pub use lifecycle::*;
pub use notification::*;
pub use object::*;
