//! nginx side of the controller
//!
//! Configuration model, rendering, reload, and the reconciler tying them
//! together. The token bucket used by both polling loops lives here too.

pub mod backend;
pub mod rate_limiter;
pub mod reconciler;
pub mod reload;
pub mod template;
