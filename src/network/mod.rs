//! Network access.
//!
//! - [`origin`]: the `Origin` capability and its HTTP implementation

pub mod origin;
