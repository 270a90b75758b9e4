//! Plotwise: scheduled AI analysis of garden zones.
//!
//! A daily trigger fans out over a durable job queue into one job per
//! garden and then one per zone. Each zone job asks an AI provider for
//! care recommendations and reconciles them against the zone's task list:
//! daily trigger → garden jobs → zone jobs → task reconciliation
//!
//! # Architecture
//!
//! - **Providers** ([`llm`]): Anthropic (primary) and OpenAI (fallback)
//!   adapters behind one trait, chosen per user by stored credentials
//! - **Output contract** ([`contract`]): typed operations, validation and
//!   the prompt instruction block derived from the same types
//! - **Context** ([`context`]): zone snapshot with plants, care history,
//!   sensors, weather and photos
//! - **Queue** ([`queue`]): SQLite-backed at-least-once job queue with
//!   retries, expiry and batch workers
//! - **Pipeline** ([`pipeline`]): trigger, garden and zone job handlers plus
//!   the daily schedule
//! - **Reconciliation** ([`reconcile`]): idempotent, per-operation task
//!   updates guarded by pending status

pub mod config;
pub mod context;
pub mod contract;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod observability;
pub mod photos;
pub mod pipeline;
pub mod plotwise_dirs;
pub mod queue;
pub mod reconcile;
pub mod store;
pub mod weather;

pub use config::PlotwiseConfig;
pub use error::{PlotwiseError, Result};
pub use pipeline::{AnalysisService, Pipeline, PipelineDeps};
