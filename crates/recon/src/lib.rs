//! `scorecheck-recon`: scraped-vs-reference reconciliation for athletics data.
//!
//! Pure engine crate: receives pre-loaded roster, schedule, stats and boxscore
//! records, pairs them, compares them field by field under the active mapping
//! rules, and returns a structured diff. Rule storage is injected through the
//! [`RuleStore`] port.

pub mod aggregate;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod schema;
pub mod scope;
pub mod store;

pub use config::ReconConfig;
pub use engine::{load_csv_records, load_json_records, Reconciler};
pub use error::ReconError;
pub use model::{
    CompareContext, ComparisonResult, Discrepancy, EntityKind, MappingRule, Record, Scope,
    ScopeLevel,
};
pub use store::{MemoryRuleStore, NoopRuleStore, RuleStore};
