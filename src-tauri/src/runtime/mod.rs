//! Runtime modules for install orchestration.
//!
//! The runtime domain handles the broker that owns install sessions
//! and the bridge that reports them to the frontend.

pub mod event_bridge;
pub mod install_broker;
