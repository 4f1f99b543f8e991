//! # Bizberry Core
//!
//! Engine-independent logic and the ports the engine is built against.
//!
//! This crate contains:
//! - Port interfaces (token store, liveness signal)
//! - The hook registry used for host-supplied interaction
//! - `$rel` template resolution and relation merging
//!
//! ## Architecture Principles
//! - Only depends on `bizberry-domain`
//! - No HTTP or storage code
//! - All external collaborators via traits

pub mod hooks;
pub mod relations;

// Infrastructure ports
pub mod liveness_ports;
pub mod store_ports;

// Re-export specific items to avoid ambiguity
pub use hooks::{hook_fn, Hook, HookError, HookHandle, HookRegistry};
pub use liveness_ports::{Liveness, LivenessListener, Subscription};
pub use relations::template::{RelationTarget, Scope, TemplateError};
pub use relations::{merge_relation, relation_template};
pub use store_ports::{StoreOptions, TokenStore};
