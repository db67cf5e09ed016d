use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, debug};

use crate::config::Config;
use crate::engine::TaskSpec;
use crate::services::{ServiceClient, SimulatedService};

use super::interactive::{self, User};
use super::report::{RunBody, RunReport};

#[derive(Parser)]
#[command(name = "taskscope")]
#[command(about = "Run labelled tasks concurrently and join their results")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(long, short, global = true, help = "Path to a configuration file")]
    pub config: Option<PathBuf>,
}

/// How the group schedules its tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// One worker thread per task
    #[default]
    Threads,
    /// Tasks spawned on the tokio runtime
    Async,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Threads => "threads",
            Mode::Async => "async",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Greet the user and call the configured services concurrently
    Greet {
        #[arg(short, long, help = "Name to greet (prompted when omitted)")]
        name: Option<String>,

        #[arg(short, long, value_enum, default_value_t = Mode::Threads)]
        mode: Mode,

        #[arg(long, help = "Report every service instead of failing fast")]
        settled: bool,
    },

    /// Run simulated tasks from a JSON file
    Run {
        #[arg(short, long, help = "Path to task definition file")]
        tasks: PathBuf,

        #[arg(short, long, help = "Path to write the JSON report")]
        output: Option<PathBuf>,

        #[arg(long, help = "Maximum concurrent tasks (0 = one worker per task)")]
        max_concurrency: Option<usize>,

        #[arg(short, long, value_enum, default_value_t = Mode::Threads)]
        mode: Mode,

        #[arg(long, help = "Report every task instead of failing fast")]
        settled: bool,
    },

    /// Initialize the configuration
    Init {
        #[arg(short, long, help = "Force overwrite existing configuration")]
        force: bool,
    },
}

pub async fn execute_command(command: &Commands, config: &mut Config) -> Result<()> {
    match command {
        Commands::Greet { name, mode, settled } => {
            handle_greet_command(name.clone(), *mode, *settled, config).await
        },
        Commands::Run { tasks, output, max_concurrency, mode, settled } => {
            if let Some(limit) = max_concurrency {
                config.group.max_concurrency = *limit;
            }
            handle_run_command(tasks, output.as_ref(), *mode, *settled, config).await
        },
        Commands::Init { force } => {
            handle_init_command(*force)
        },
    }
}

/// Run `specs` as one group against the simulated service
pub async fn run_specs(config: &Config, specs: Vec<TaskSpec>, mode: Mode, settled: bool) -> Result<RunReport> {
    let base = SimulatedService::from_config(&config.service);
    let started_at = Utc::now();
    debug!("Running {} tasks in {} mode", specs.len(), mode.as_str());

    let (group_id, body) = match mode {
        Mode::Threads => {
            let config = config.clone();
            tokio::task::spawn_blocking(move || {
                let mut group = config.task_group();
                for spec in &specs {
                    let service = base.for_spec(spec);
                    let label = spec.label.clone();
                    group.submit_cancellable(spec.label.clone(), move |token| service.fetch_blocking(&label, token))?;
                }

                let body = if settled {
                    RunBody::Settled(group.join_settled()?)
                } else {
                    RunBody::Joined(group.join())
                };
                Ok::<_, anyhow::Error>((group.id(), body))
            })
            .await
            .context("Worker pool terminated unexpectedly")??
        },
        Mode::Async => {
            let mut group = config.async_task_group();
            for spec in &specs {
                let service = base.for_spec(spec);
                let label = spec.label.clone();
                group.submit_cancellable(spec.label.clone(), move |token| async move {
                    service.fetch(&label, &token).await
                })?;
            }

            let body = if settled {
                RunBody::Settled(group.join_settled().await?)
            } else {
                RunBody::Joined(group.join().await)
            };
            (group.id(), body)
        },
    };

    Ok(RunReport::new(group_id, mode.as_str(), started_at, body))
}

async fn handle_greet_command(name: Option<String>, mode: Mode, settled: bool, config: &Config) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => interactive::prompt_name()?,
    };
    let user = User::new(name, config.user.default_age)?;
    println!("{}", user.greeting());
    debug!("Greeting user {:?}", user);

    let specs = config.service.names.iter().map(TaskSpec::new).collect();
    let report = run_specs(config, specs, mode, settled).await?;

    for task in &report.results {
        match (&task.value, &task.error) {
            (Some(value), _) => println!("{}", value),
            (None, Some(error)) => eprintln!("Execution failed: {}", error),
            (None, None) => {}
        }
    }
    if let Some(error) = &report.error {
        eprintln!("Execution failed: {}", error);
    }

    if report.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Not every service responded for {}", user.name)
    }
}

async fn handle_run_command(
    tasks: &PathBuf,
    output: Option<&PathBuf>,
    mode: Mode,
    settled: bool,
    config: &Config,
) -> Result<()> {
    let specs = TaskSpec::load_all(tasks)?;
    let report = run_specs(config, specs, mode, settled).await?;

    match output {
        Some(path) => report.save(path)?,
        None => println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize report")?),
    }

    info!("Run {} finished with status {:?}", report.group_id, report.status);
    if report.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Run {} finished with status {:?}", report.group_id, report.status)
    }
}

fn handle_init_command(force: bool) -> Result<()> {
    let path = Config::init(force)?;
    println!("Configuration initialized at {}", path.display());
    Ok(())
}
