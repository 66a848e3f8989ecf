//! # hostbridge core
//!
//! I/O-free logic shared by every hostbridge frontend: the instance model,
//! the include/exclude filter stage, fuzzy similarity scoring, and the
//! resolver that ranks instances against free-text targets.
//!
//! This crate contains no tokio, filesystem, or network dependencies.
//! Inventory sources live in the `hostbridge` crate and hand their decoded
//! instances to [`search::rank`].

pub mod filter;
pub mod fuzzy;
pub mod models;
pub mod search;

pub use filter::{instance_filter, InstanceFilter};
pub use models::{Instance, InstanceKind};
pub use search::{rank, MatchOptions};
