use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::Instant;

use crate::error::Error;
use crate::options::RunOptions;
use crate::tasks::ResolvedTask;


/// How long a terminated task may take to exit before it is killed outright.
const KILL_GRACE: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];


/// Turns a resolved task into an operating-system command.
pub trait ProcessRunner: Send + Sync {
    fn command(&self, task: &ResolvedTask) -> Command;

    /// Spawns `task` with stdin inherited and the given output streams.
    fn launch(
        &self,
        task: &ResolvedTask,
        stdout: Stdio,
        stderr: Stdio,
    ) -> Result<Process, Error> {
        let mut command = self.command(task);
        command
            .stdin(Stdio::inherit())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| Error::Launch {
            name: task.label(),
            source,
        })?;
        Ok(Process { child })
    }
}


/// Runs tasks as `<npm> run <name> <args...>`.
#[derive(Clone, Debug)]
pub struct NpmRunner {
    npm_path: Option<PathBuf>,
    cwd: Option<PathBuf>,
    silent: bool,
    yarn: bool,
}

impl NpmRunner {
    /// Builds a runner from the options, falling back to `npm_execpath` and
    /// `npm_config_user_agent` from the environment.
    pub fn new(options: &RunOptions) -> Self {
        let npm_path = options
            .npm_path
            .clone()
            .or_else(|| std::env::var_os("npm_execpath").map(PathBuf::from));
        let yarn = std::env::var("npm_config_user_agent")
            .map(|agent| agent.starts_with("yarn"))
            .unwrap_or(false);

        Self {
            npm_path,
            cwd: options.cwd.clone(),
            silent: options.silent,
            yarn,
        }
    }

    pub fn with_yarn(mut self, yarn: bool) -> Self {
        self.yarn = yarn;
        self
    }

    /// The program to execute and the arguments that precede `run`.
    fn program(&self) -> (OsString, Vec<OsString>) {
        match &self.npm_path {
            Some(path) => {
                let script = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| SCRIPT_EXTENSIONS.contains(&ext))
                    .unwrap_or(false);
                if script {
                    ("node".into(), vec![path.clone().into_os_string()])
                } else {
                    (path.clone().into_os_string(), vec![])
                }
            }
            None if cfg!(windows) => ("npm.cmd".into(), vec![]),
            None => ("npm".into(), vec![]),
        }
    }

    /// Arguments for `task`, without the program.
    pub fn arguments(&self, task: &ResolvedTask) -> Vec<OsString> {
        let (_, mut args) = self.program();
        args.push("run".into());
        if self.silent {
            args.push("--silent".into());
        }
        if !self.yarn {
            for (key, value) in &task.config_overrides {
                args.push(format!("--{key}={value}").into());
            }
        }
        args.push(task.name.clone().into());
        args.extend(task.argv.iter().map(OsString::from));
        args
    }
}

impl ProcessRunner for NpmRunner {
    fn command(&self, task: &ResolvedTask) -> Command {
        let (program, _) = self.program();
        let mut command = Command::new(program);
        command.args(self.arguments(task));
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command
    }
}


/// How a child process ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Exit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl Exit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The exit code a shell would report: the code itself, or 128 plus
    /// the signal number.
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => 1,
        }
    }

    pub fn signal_name(&self) -> Option<String> {
        self.signal.map(signal_name)
    }
}

impl From<ExitStatus> for Exit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}


#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map(|signal| signal.as_str().to_string())
        .unwrap_or_else(|_| format!("SIG{signal}"))
}

#[cfg(not(unix))]
fn signal_name(signal: i32) -> String {
    format!("SIG{signal}")
}


/// A running task.
#[derive(Debug)]
pub struct Process {
    child: Child,
}

impl Process {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    pub async fn wait(&mut self) -> Result<Exit, Error> {
        Ok(self.child.wait().await?.into())
    }

    /// Terminates the task with its descendants and waits for it to exit.
    ///
    /// The whole tree gets SIGTERM. Whatever is still running when the grace
    /// period ends, root or descendant, gets SIGKILL.
    pub async fn terminate(&mut self) -> Result<Exit, Error> {
        let Some(pid) = self.child.id() else {
            return self.wait().await;
        };
        let tree = platform::process_tree(&[pid]).await;
        tracing::debug!(pid, processes = tree.len(), "Terminating process tree");
        platform::signal_all(&tree, false).await;

        let deadline = Instant::now() + KILL_GRACE;
        loop {
            if let Some(status) = self.child.try_wait()? {
                if !platform::any_alive(&tree[1..]).await {
                    return Ok(status.into());
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let survivors = platform::process_tree(&tree).await;
        tracing::warn!(pid, processes = survivors.len(), "Process tree ignored SIGTERM, killing");
        platform::signal_all(&survivors, true).await;
        Ok(self.child.wait().await?.into())
    }
}


#[cfg(unix)]
mod platform {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::collections::{HashMap, VecDeque};
    use tokio::process::Command;

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Entry {
        pub ppid: u32,
        pub pid: u32,
        pub zombie: bool,
    }

    /// Parses `ppid pid stat` lines.
    pub fn parse_table(text: &str) -> Vec<Entry> {
        text.lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let ppid = fields.next()?.parse().ok()?;
                let pid = fields.next()?.parse().ok()?;
                let zombie = fields.next().map(|stat| stat.starts_with('Z')).unwrap_or(false);
                Some(Entry { ppid, pid, zombie })
            })
            .collect()
    }

    async fn process_table() -> Vec<Entry> {
        match Command::new("ps")
            .args(["-A", "-o", "ppid=,pid=,stat="])
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                parse_table(&String::from_utf8_lossy(&output.stdout))
            }
            _ => vec![],
        }
    }

    /// `roots` followed by all their descendants, breadth first.
    pub fn tree(roots: &[u32], table: &[Entry]) -> Vec<u32> {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for entry in table {
            children.entry(entry.ppid).or_default().push(entry.pid);
        }

        let mut found: Vec<u32> = vec![];
        let mut queue = VecDeque::new();
        for &root in roots {
            if !found.contains(&root) {
                found.push(root);
                queue.push_back(root);
            }
        }
        while let Some(pid) = queue.pop_front() {
            for &child in children.get(&pid).into_iter().flatten() {
                if !found.contains(&child) {
                    found.push(child);
                    queue.push_back(child);
                }
            }
        }
        found
    }

    pub async fn process_tree(roots: &[u32]) -> Vec<u32> {
        tree(roots, &process_table().await)
    }

    /// Whether any of `pids` is still running. Zombies count as gone.
    pub async fn any_alive(pids: &[u32]) -> bool {
        if pids.is_empty() {
            return false;
        }
        process_table()
            .await
            .iter()
            .any(|entry| !entry.zombie && pids.contains(&entry.pid))
    }

    pub async fn signal_all(pids: &[u32], force: bool) {
        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        for &pid in pids {
            let Ok(raw) = i32::try_from(pid) else {
                continue;
            };
            match kill(Pid::from_raw(raw), signal) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => tracing::warn!(pid, %signal, error = %err, "Failed to signal process"),
            }
        }
    }
}


#[cfg(windows)]
mod platform {
    use tokio::process::Command;

    /// `taskkill /T` walks the tree itself, so only the roots are tracked.
    pub async fn process_tree(roots: &[u32]) -> Vec<u32> {
        roots.to_vec()
    }

    pub async fn any_alive(_pids: &[u32]) -> bool {
        false
    }

    pub async fn signal_all(pids: &[u32], _force: bool) {
        for pid in pids {
            let result = Command::new("taskkill")
                .args(["/T", "/F", "/PID", &pid.to_string()])
                .status()
                .await;
            if let Err(err) = result {
                tracing::warn!(pid, error = %err, "Failed to run taskkill");
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn runner(npm_path: Option<&str>, silent: bool) -> NpmRunner {
        let options = RunOptions {
            npm_path: npm_path.map(PathBuf::from),
            silent,
            ..RunOptions::default()
        };
        NpmRunner::new(&options).with_yarn(false)
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn npm_arguments_carry_overrides_and_argv() {
        let mut task = ResolvedTask::new("build", vec!["--watch".into()]);
        task.config_overrides.insert("pkg:port".into(), "8080".into());

        let args = strings(runner(Some("/usr/bin/pnpm"), true).arguments(&task));
        assert_eq!(args, vec!["run", "--silent", "--pkg:port=8080", "build", "--watch"]);
    }

    #[test]
    fn script_npm_path_runs_through_node() {
        let task = ResolvedTask::new("lint", vec![]);
        let runner = runner(Some("/opt/npm/bin/npm-cli.js"), false);
        let (program, _) = runner.program();
        assert_eq!(program, OsString::from("node"));
        assert_eq!(
            strings(runner.arguments(&task)),
            vec!["/opt/npm/bin/npm-cli.js", "run", "lint"]
        );
    }

    #[test]
    fn yarn_only_receives_silent() {
        let mut task = ResolvedTask::new("lint", vec![]);
        task.config_overrides.insert("a".into(), "b".into());
        let runner = runner(Some("yarn"), true).with_yarn(true);
        assert_eq!(strings(runner.arguments(&task)), vec!["run", "--silent", "lint"]);
    }

    #[test]
    fn exit_codes_follow_shell_convention() {
        let exited = Exit { code: Some(2), signal: None };
        assert_eq!(exited.exit_code(), 2);
        assert!(!exited.success());

        let aborted = Exit { code: None, signal: Some(6) };
        assert_eq!(aborted.exit_code(), 134);
    }

    #[cfg(unix)]
    #[test]
    fn signal_names_are_symbolic() {
        let aborted = Exit { code: None, signal: Some(nix::sys::signal::Signal::SIGABRT as i32) };
        assert_eq!(aborted.signal_name().as_deref(), Some("SIGABRT"));

        let unknown = Exit { code: None, signal: Some(999) };
        assert_eq!(unknown.signal_name().as_deref(), Some("SIG999"));
    }

    #[cfg(unix)]
    #[test]
    fn tree_walks_the_process_table() {
        let table = platform::parse_table(
            "    1   10 Ss\n   10   11 S\n   11   12 Z\n   10   13 R+\n    1   20 S\n",
        );
        assert!(table[2].zombie && !table[1].zombie);
        assert_eq!(platform::tree(&[10], &table), vec![10, 11, 13, 12]);
        assert_eq!(platform::tree(&[20, 11], &table), vec![20, 11, 12]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_stops_a_sleeping_child() {
        struct Shell;
        impl ProcessRunner for Shell {
            fn command(&self, _: &ResolvedTask) -> Command {
                let mut command = Command::new("sh");
                command.args(["-c", "sleep 30"]);
                command
            }
        }

        let task = ResolvedTask::new("sleep", vec![]);
        let mut process = Shell.launch(&task, Stdio::null(), Stdio::null()).unwrap();
        let exit = process.terminate().await.unwrap();
        assert!(!exit.success());
    }
}
