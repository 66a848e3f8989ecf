//! # hostbridge
//!
//! Resolve a possibly ambiguous host name against an inventory gathered from
//! several backends (EC2, ECS, flat files, New Relic), ranked best match
//! first.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐   ┌──────────────┐   ┌────────────┐   ┌──────────┐
//! │ Sources              │──▶│ InventorySet │──▶│ Filter     │──▶│ Resolver │
//! │ aws/ecs/csv/newrelic │   │ (aggregator) │   │ incl/excl  │   │ rank()   │
//! └──────────┬───────────┘   └──────────────┘   └────────────┘   └──────────┘
//!            │ update()
//!            ▼
//!      cache files (JSON, replaced wholesale)
//! ```
//!
//! The instance model, filter and ranking live in the I/O-free
//! `hostbridge-core` crate; this crate adds configuration, caches, the
//! backends and the CLI handlers.
//!
//! ## Quick Start
//!
//! ```bash
//! hostbridge init                 # write ~/.hostbridge/config.toml
//! hostbridge update               # refresh every source's cache
//! hostbridge search web --fuzzy   # rank hosts matching "web"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`cache`] | Atomic JSON cache files |
//! | [`error`] | Cache faults callers can tell apart |
//! | [`traits`] | The [`traits::InventorySource`] contract |
//! | [`aws_sign`] | AWS credentials and SigV4 signing |
//! | [`http`] | Shared HTTP client |
//! | [`source_aws`] | EC2 instances |
//! | [`source_ecs`] | ECS containers joined to their hosts |
//! | [`source_csv`] | Flat-file hosts |
//! | [`source_newrelic`] | New Relic infrastructure samples |
//! | [`inventory`] | Source aggregator |
//! | [`session`] | Per-invocation snapshot and filtering |
//! | [`sources`] | Source status listing |
//! | [`commands`] | CLI command handlers |
//! | [`logging`] | `tracing` subscriber setup |

pub mod aws_sign;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod inventory;
pub mod logging;
pub mod session;
pub mod source_aws;
pub mod source_csv;
pub mod source_ecs;
pub mod source_newrelic;
pub mod sources;
pub mod traits;
