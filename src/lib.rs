mod api;
pub mod command;
mod error;
mod manifest;
mod options;
mod output;
mod pattern;
mod placeholder;
mod planner;
mod plans;
mod process;
mod scheduler;
mod tasks;

pub use api::{execute, run, run_with};
pub use error::{Error, CANCELLED_EXIT_CODE};
pub use manifest::{Manifest, MANIFEST_FILE};
pub use options::RunOptions;
pub use output::Sink;
pub use planner::{parse_cli_args, CliArgs, EntryPoint, PatternGroup};
pub use plans::{Group, GroupMode, GroupStatus, RunPlan};
pub use process::{Exit, NpmRunner, Process, ProcessRunner};
pub use tasks::{ExecutionResult, ResolvedTask, TaskSpec, TaskStatus};
