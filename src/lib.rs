pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod services;

// Re-export main types for easier access
pub use config::Config;
pub use engine::{
    AsyncTaskGroup,
    CancellationExt,
    CancellationToken,
    Outcome,
    TaskGroup,
    TaskResults,
    TaskSpec,
};
pub use error::{GroupError, GroupResult, TaskScopeError, TaskScopeResult};
pub use services::{ServiceClient, SimulatedService};
