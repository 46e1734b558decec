//! Request interception.
//!
//! - [`request`]: the intercepted request model
//! - [`classifier`]: maps a request to a tier/strategy pair
//! - [`strategy`]: the four strategy executors
//! - [`fallback`]: offline page resolution

pub mod classifier;
pub mod fallback;
pub mod request;
pub mod strategy;
