//! mdk-lifecycle
//!
//! Memo lifecycle rules and the service that applies them.
//!
//! - [`engine`]: pure `(status, action) -> patch | error` state machine.
//! - [`roles`]: static role -> privilege table.
//! - [`LifecycleService`]: read, plan, merge through the store, audit.

pub mod engine;
pub mod roles;
mod service;

pub use engine::{plan_transition, MemoAction};
pub use roles::{privilege_names, privileges_for, user_view};
pub use service::LifecycleService;
