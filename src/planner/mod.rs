//! Query planner and response synthesizer

pub mod context;
#[allow(clippy::module_inception)]
pub mod planner;
pub mod state;

pub use context::{AssembledContext, ContextBuilder, ContextConfig, ContextFormat};
pub use planner::{
    filter_prompt, synthesis_prompt, FilterMode, PlannerConfig, QueryFailure, QueryOutcome, QueryPlanner,
    DEFAULT_TOP_K,
};
pub use state::{QueryEvent, QueryState};
