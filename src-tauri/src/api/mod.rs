//! API types for frontend-backend bridge.
//!
//! Stable types for the module commands and the session status event,
//! independent of which platform service delivers the modules.

pub mod types;
