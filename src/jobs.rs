//! Job records and the queries built on top of the API invoker.

mod clones;
mod latest;
mod query;
mod types;
mod wait;

pub use clones::{resolve_clones, JobSource};
pub use latest::latest_per_scenario;
pub use query::JobSelector;
pub use types::{Job, JobResult, JobState, ResultGroup, ScenarioKey, StateGroup, SCENARIO_KEYS};
pub use wait::JobWatcher;
