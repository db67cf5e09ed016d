pub mod app;
mod commands;
mod interactive;
mod report;

pub use app::App;
pub use commands::{execute_command, run_specs, Args, Commands, Mode};
pub use interactive::{prompt_name, User};
pub use report::{RunBody, RunReport, RunStatus, TaskReport};
