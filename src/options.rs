use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::output::Sink;


/// Settings for one run, shared by the command line and library callers.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Run the patterns given to [`crate::run`] concurrently.
    pub parallel: bool,
    pub max_parallel: Option<usize>,
    pub continue_on_error: bool,
    pub race: bool,
    /// `--key=value` overrides passed to every task.
    pub config: BTreeMap<String, String>,
    /// `--scope:key=value` overrides, keyed by scope then key.
    pub package_config: BTreeMap<String, BTreeMap<String, String>>,
    pub print_label: bool,
    pub print_name: bool,
    pub silent: bool,
    pub aggregate_output: bool,
    /// Arguments after `--`, available to placeholders.
    pub arguments: Vec<String>,
    pub npm_path: Option<PathBuf>,
    /// Known task names; read from `package.json` when absent.
    pub task_list: Option<Vec<String>>,
    /// Project directory; the current directory when absent.
    pub cwd: Option<PathBuf>,
    pub stdout: Option<Sink>,
    pub stderr: Option<Sink>,
    /// Tripping this terminates every running task.
    pub cancel: CancellationToken,
}

impl RunOptions {
    /// Config and package-config overrides flattened into `key` and
    /// `scope:key` entries.
    pub fn config_overrides(&self) -> BTreeMap<String, String> {
        let mut overrides = self.config.clone();
        for (scope, entries) in &self.package_config {
            for (key, value) in entries {
                overrides.insert(format!("{scope}:{key}"), value.clone());
            }
        }
        overrides
    }

    pub fn cwd(&self) -> std::io::Result<PathBuf> {
        match &self.cwd {
            Some(cwd) => Ok(cwd.clone()),
            None => std::env::current_dir(),
        }
    }
}
