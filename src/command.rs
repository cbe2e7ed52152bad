use clap::{Arg, Command};

use crate::planner::EntryPoint;

mod run;

pub use run::run;


const OPTIONS: &str = "\
Options:
    -c, --continue-on-error  Keep running after a task fails. The exit code
                             is still non-zero when any task failed.
    -l, --print-label        Prefix every output line with the task name.
    -n, --print-name         Print the task name before running it.
    -r, --race               Stop the other tasks once one succeeds.
                             Parallel groups only.
    -m, --max-parallel <n>   Run at most <n> tasks at once. Parallel groups
                             only.
    --aggregate-output       Hold each task's stdout until it finishes.
                             Parallel groups only.
    --npm-path <path>        Package manager to run tasks with.
    --silent                 Pass --silent to the package manager and hide
                             the error message on failure.
    --<key>=<value>          Override a package config value.
    --<scope>:<key>=<value>  Override a config value of package <scope>.
    -- <args...>             Arguments for {1}, {@}, {*} and {%}.";

const GROUP_OPTIONS: &str = "\
Groups:
    -s, --sequential, --serial  Run the following patterns one at a time.
    -p, --parallel              Run the following patterns concurrently.";


/// Help and usage for `entry`.
///
/// Arguments are not parsed by clap: their meaning depends on position and
/// `--` must reach the planner intact.
pub(crate) fn cli(entry: EntryPoint) -> Command {
    Command::new(entry.name())
        .bin_name(entry.name())
        .about(entry.about())
        .override_usage(entry.usage())
        .after_help(entry.help())
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("tasks")
                .value_name("TASKS")
                .num_args(0..)
                .trailing_var_arg(true)
                .allow_hyphen_values(true)
                .help("Task patterns, each optionally followed by argument text"),
        )
}


impl EntryPoint {
    fn usage(&self) -> String {
        let name = self.name();
        format!(
            "{name} [--help | -h | --version | -v]\n       {name} [OPTIONS] <tasks>..."
        )
    }

    fn about(&self) -> &'static str {
        match self {
            EntryPoint::RunAll => "Run package scripts in sequential and parallel groups.",
            EntryPoint::RunSequential => "Run package scripts one at a time.",
            EntryPoint::RunParallel => "Run package scripts concurrently.",
        }
    }

    fn help(&self) -> String {
        match self {
            EntryPoint::RunAll => format!("{OPTIONS}\n\n{GROUP_OPTIONS}"),
            _ => format!("{OPTIONS}\n    -s                       Same as --silent."),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        for entry in [EntryPoint::RunAll, EntryPoint::RunSequential, EntryPoint::RunParallel] {
            let command = cli(entry);
            command.clone().debug_assert();
            assert_eq!(command.get_name(), entry.name());
        }
    }

    #[test]
    fn only_run_all_documents_groups() {
        assert!(EntryPoint::RunAll.help().contains("--parallel"));
        assert!(!EntryPoint::RunParallel.help().contains("--parallel"));
        assert!(EntryPoint::RunSequential.usage().starts_with("run-s "));
    }
}
