//! Provider and model registry for atlas.
//!
//! This crate resolves which model-serving providers and models are
//! available to the agent runtime:
//! - Merges provider definitions from the catalog, user configuration,
//!   credentials, and plugins (later layers win per-field)
//! - Filters the result by policy (enable/disable sets, allow/deny lists,
//!   experimental gating)
//! - Lazily builds and caches the client adapters and model handles needed
//!   to invoke each model
//!
//! # Architecture
//!
//! ```text
//! catalog ─┐
//! config  ─┤                ┌──────────────┐     ┌─────────────────┐
//! env/store┼─▶ MergeEngine ─▶ PolicyFilter ─▶    │    Registry     │
//! plugins ─┘                └──────────────┘     │  ┌───────────┐  │
//!                                                │  │ Provider  │  │
//!                                                │  │  Table    │  │
//!                                                │  └─────┬─────┘  │
//!                                                │  ┌─────▼─────┐  │
//!                                                │  │ Adapter / │  │
//!                                                │  │  Handle   │  │
//!                                                │  │  caches   │  │
//!                                                │  └───────────┘  │
//!                                                └─────────────────┘
//! ```
//!
//! The table is built once per process ([`Registry::shared`]) and is
//! immutable afterwards; adapters and handles are cached for the process
//! lifetime.

mod error;
mod merge;
mod policy;
mod select;

pub mod adapters;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod custom;
pub mod registry;
pub mod types;

pub use catalog::Catalog;
pub use config::Config;
pub use error::{BoxError, Error, Result};
pub use registry::{Registry, RegistryBuilder};
pub use select::sort_by_priority;
pub use types::{Model, OptionMap, OptionValue, Provider};
