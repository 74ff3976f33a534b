//! Ordered interceptors around the backend call.
//!
//! Hooks are registered once at startup with a [`MethodMatcher`](crate::types::MethodMatcher)
//! and a [`Phase`]. For each call the [`Caller`](crate::proxy::Caller) runs the matching
//! preflight hooks, then the backend (unless a hook answered or failed), then the matching
//! postflight hooks on whatever the outcome was.
//!
//! ```text
//! preflight[0..n] ──Respond──┐
//!      │   └──────Fail───────┤
//!      ▼                     │
//!   backend / cache          │
//!      │                     │
//!      ▼                     ▼
//! postflight[0..n] (sees ctx.outcome(); may replace or fail it)
//! ```

pub mod builtin;
pub mod context;
pub mod registry;

pub use context::HookContext;
pub use registry::{FnHook, Hook, HookOutcome, HookRegistry, HookRegistryBuilder, Phase};
