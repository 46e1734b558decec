//! HTTP front for the engine.
//!
//! - [`proxy`]: intercepting fallback handler and control routes
//! - [`streaming`]: SSE streaming of lifecycle notifications

pub mod proxy;
pub mod streaming;
