use std::collections::VecDeque;
use std::path::PathBuf;

use crate::error::Error;
use crate::options::RunOptions;
use crate::pattern::resolve_patterns;
use crate::placeholder::Placeholders;
use crate::plans::{Group, GroupMode, RunPlan};
use crate::tasks::ResolvedTask;


const SHORT_FLAGS: &str = "clnprs";


/// Which executable is parsing the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryPoint {
    /// `run-all`: groups are opened with `-s` and `-p`.
    RunAll,
    /// `run-s`: one sequential group; `-s` means `--silent`.
    RunSequential,
    /// `run-p`: one parallel group; `-s` means `--silent`.
    RunParallel,
}

impl EntryPoint {
    pub fn name(&self) -> &'static str {
        match self {
            EntryPoint::RunAll => "run-all",
            EntryPoint::RunSequential => "run-s",
            EntryPoint::RunParallel => "run-p",
        }
    }

    fn default_mode(&self) -> GroupMode {
        match self {
            EntryPoint::RunParallel => GroupMode::Parallel,
            _ => GroupMode::Sequential,
        }
    }

    fn single_mode(&self) -> bool {
        *self != EntryPoint::RunAll
    }
}


/// Patterns that run under one mode, before resolution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PatternGroup {
    pub mode: GroupMode,
    pub patterns: Vec<String>,
}

impl PatternGroup {
    pub fn new<S: AsRef<str>>(mode: GroupMode, patterns: &[S]) -> Self {
        Self {
            mode,
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        }
    }
}


/// A parsed command line.
#[derive(Clone, Debug)]
pub struct CliArgs {
    pub groups: Vec<PatternGroup>,
    pub options: RunOptions,
}


pub fn parse_cli_args<S: AsRef<str>>(args: &[S], entry: EntryPoint) -> Result<CliArgs, Error> {
    let mut queue: VecDeque<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
    let mut groups = vec![PatternGroup::new::<&str>(entry.default_mode(), &[])];
    let mut options = RunOptions {
        parallel: entry == EntryPoint::RunParallel,
        ..RunOptions::default()
    };

    while let Some(arg) = queue.pop_front() {
        match arg.as_str() {
            "--" => {
                options.arguments = queue.drain(..).collect();
            }
            "--color" | "--no-color" => {}
            "-c" | "--continue-on-error" => options.continue_on_error = true,
            "-l" | "--print-label" => options.print_label = true,
            "-n" | "--print-name" => options.print_name = true,
            "-r" | "--race" => options.race = true,
            "--silent" => options.silent = true,
            "--aggregate-output" => options.aggregate_output = true,
            "-m" | "--max-parallel" => {
                let value = queue.pop_front().unwrap_or_default();
                match value.parse::<usize>() {
                    Ok(n) if n > 0 => options.max_parallel = Some(n),
                    _ => {
                        return Err(Error::InvalidOption(format!("--max-parallel {value}")));
                    }
                }
            }
            "--npm-path" => options.npm_path = queue.pop_front().map(PathBuf::from),
            "--config" => {
                let value = queue.pop_front().unwrap_or_default();
                let (key, value) = split_assignment(&value)
                    .ok_or_else(|| Error::InvalidOption(format!("--config {value}")))?;
                options.config.insert(key, value);
            }
            "--package-config" => {
                let value = queue.pop_front().unwrap_or_default();
                let (scope, key, value) = value
                    .split_once(':')
                    .filter(|(scope, _)| !scope.is_empty())
                    .and_then(|(scope, rest)| {
                        split_assignment(rest).map(|(key, value)| (scope.to_string(), key, value))
                    })
                    .ok_or_else(|| Error::InvalidOption(format!("--package-config {value}")))?;
                options.package_config.entry(scope).or_default().insert(key, value);
            }
            "-s" if entry.single_mode() => options.silent = true,
            "-s" | "--sequential" | "--serial" | "-p" | "--parallel" => {
                if entry.single_mode() {
                    return Err(Error::InvalidOption(arg));
                }
                let mode = if arg == "-p" || arg == "--parallel" {
                    GroupMode::Parallel
                } else {
                    GroupMode::Sequential
                };
                groups.push(PatternGroup::new::<&str>(mode, &[]));
            }
            _ => {
                if let Some((scope, key, value)) = package_override(&arg) {
                    let value = match value {
                        Some(value) => value,
                        None => queue.pop_front().unwrap_or_default(),
                    };
                    options.package_config.entry(scope).or_default().insert(key, value);
                } else if let Some((key, value)) = arg.strip_prefix("--").and_then(split_assignment) {
                    options.config.insert(key, value);
                } else if is_combined_flags(&arg) {
                    for flag in arg[1..].chars().rev() {
                        queue.push_front(format!("-{flag}"));
                    }
                } else if arg.starts_with('-') {
                    return Err(Error::InvalidOption(arg));
                } else if let Some(group) = groups.last_mut() {
                    group.patterns.push(arg);
                }
            }
        }
    }

    check_options(&groups, &options)?;
    Ok(CliArgs { groups, options })
}


/// `key=value` with both sides non-empty and no `=` in the key.
fn split_assignment(text: &str) -> Option<(String, String)> {
    let (key, value) = text.split_once('=')?;
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}


/// `--scope:key=value` or `--scope:key` followed by the value.
fn package_override(arg: &str) -> Option<(String, String, Option<String>)> {
    let (scope, rest) = arg.strip_prefix("--")?.split_once(':')?;
    if scope.is_empty() {
        return None;
    }
    match rest.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => {
            Some((scope.to_string(), key.to_string(), Some(value.to_string())))
        }
        Some(_) => None,
        None if !rest.is_empty() => Some((scope.to_string(), rest.to_string(), None)),
        None => None,
    }
}


fn is_combined_flags(arg: &str) -> bool {
    arg.len() > 2
        && arg.starts_with('-')
        && arg[1..].chars().all(|c| SHORT_FLAGS.contains(c))
}


/// Rejects option combinations that need a parallel group.
pub fn check_options(groups: &[PatternGroup], options: &RunOptions) -> Result<(), Error> {
    let parallel = groups.iter().any(|group| group.mode == GroupMode::Parallel);
    if !parallel {
        if options.aggregate_output {
            return Err(Error::InvalidOption("--aggregate-output (without parallel)".into()));
        }
        if options.race {
            return Err(Error::InvalidOption("--race (without parallel)".into()));
        }
        if options.max_parallel.is_some() {
            return Err(Error::InvalidOption("--max-parallel (without parallel)".into()));
        }
    }
    if options.aggregate_output && options.race {
        return Err(Error::InvalidOption("--aggregate-output (with --race)".into()));
    }
    if options.max_parallel == Some(0) {
        return Err(Error::InvalidOption("--max-parallel 0".into()));
    }
    Ok(())
}


/// Resolves every group against `known` before anything runs.
///
/// Groups without patterns are dropped. Parallel groups take the race and
/// throttle options; every group takes `continue_on_error`.
pub fn build_plan(
    groups: &[PatternGroup],
    options: &RunOptions,
    known: &[String],
) -> Result<RunPlan, Error> {
    let overrides = options.config_overrides();
    let mut plan = RunPlan {
        groups: vec![],
        continue_on_error: options.continue_on_error,
    };

    for pattern_group in groups.iter().filter(|g| !g.patterns.is_empty()) {
        let specs = resolve_patterns(&pattern_group.patterns, known)?;
        let mut placeholders = Placeholders::new(&options.arguments);

        let mut tasks = vec![];
        for spec in specs {
            for argv in placeholders.expand(&spec.raw_args) {
                let mut task = ResolvedTask::new(spec.name.clone(), argv);
                task.config_overrides = overrides.clone();
                tasks.push(task);
            }
        }

        let group = match pattern_group.mode {
            GroupMode::Sequential => Group::sequential(tasks),
            GroupMode::Parallel => Group::parallel(tasks)
                .with_max_parallel(options.max_parallel)
                .with_race(options.race),
        }
        .with_continue_on_error(options.continue_on_error);
        group.validate()?;
        plan.groups.push(group);
    }

    tracing::debug!(
        groups = plan.groups.len(),
        tasks = plan.tasks().count(),
        "Built run plan"
    );
    Ok(plan)
}
