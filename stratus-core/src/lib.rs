//! Stratus Core
//!
//! Core library for cloud providers that drive remote resources through a
//! create/read/update/delete/import lifecycle.
//!
//! ## Module Structure
//!
//! - `resource` - Desired and observed resource state
//! - `schema` - Attribute schemas and validation
//! - `provider` - Provider trait and error type
//! - `timeouts` - Per-verb operation timeouts
//! - `waiter` - Status poller for asynchronous operations
//! - `lifecycle` - Generic lifecycle driver over resource kinds

pub mod lifecycle;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod timeouts;
pub mod waiter;
