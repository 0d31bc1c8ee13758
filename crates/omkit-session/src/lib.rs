//! Session integration for omkit.
//!
//! `omkit-session` is the **runtime boundary**. The persistence runtime
//! itself is external; this crate decorates it.
//!
//! # Role In The Architecture
//!
//! - **Decoration**: [`SessionWrapper`] implements [`SessionApi`] by
//!   delegating to the wrapped session, and adds criteria queries compiled
//!   through a per-session plan cache.
//! - **Population**: [`SessionWrapper::load_collection`] and
//!   [`SessionWrapper::load_map`] fill managed collections inside a
//!   [`LoadPhase`](omkit_collection::LoadPhase), so listeners follow the
//!   configured [`LoadEventPolicy`](omkit_collection::LoadEventPolicy).
//! - **Factory metadata**: [`SessionFactory`] derives its compiler through
//!   an injected [`FactoryMetadataCache`] and memoizes metamodel checks in a
//!   [`WeakFlagCache`].

pub mod config;
pub mod factory;
pub mod metadata;
pub mod wrapper;

#[cfg(test)]
mod testing;

pub use config::SessionConfig;
pub use factory::{CompilerCache, SessionFactory};
pub use metadata::{FactoryMetadataCache, WeakFlagCache};
pub use wrapper::{LoadTarget, SessionApi, SessionWrapper};
