use crate::error::Error;
use crate::manifest::Manifest;
use crate::options::RunOptions;
use crate::output::{OutputManager, Sink};
use crate::planner::{build_plan, check_options, PatternGroup};
use crate::plans::GroupMode;
use crate::process::{NpmRunner, ProcessRunner};
use crate::scheduler::Scheduler;
use crate::tasks::ExecutionResult;


/// Runs the tasks matched by `patterns` through the package manager.
///
/// With `options.parallel` the patterns form one parallel group, otherwise
/// one sequential group.
pub async fn run<S: AsRef<str>>(
    patterns: &[S],
    options: RunOptions,
) -> Result<Vec<ExecutionResult>, Error> {
    let runner = NpmRunner::new(&options);
    run_with(patterns, options, &runner).await
}


/// Like [`run`], launching tasks through `runner`.
pub async fn run_with<S: AsRef<str>, R: ProcessRunner>(
    patterns: &[S],
    options: RunOptions,
    runner: &R,
) -> Result<Vec<ExecutionResult>, Error> {
    let mode = if options.parallel {
        GroupMode::Parallel
    } else {
        GroupMode::Sequential
    };
    execute(&[PatternGroup::new(mode, patterns)], &options, runner).await
}


/// Resolves every group, then runs them in order.
pub async fn execute<R: ProcessRunner>(
    groups: &[PatternGroup],
    options: &RunOptions,
    runner: &R,
) -> Result<Vec<ExecutionResult>, Error> {
    check_options(groups, options)?;
    if groups.iter().all(|group| group.patterns.is_empty()) {
        return Ok(vec![]);
    }

    let (known, manifest) = match &options.task_list {
        Some(names) => (names.clone(), None),
        None => {
            let manifest = Manifest::load(&options.cwd()?)?;
            (manifest.task_names(), Some(manifest))
        }
    };

    let plan = build_plan(groups, options, &known)?;
    let output = OutputManager::new(
        options.stdout.clone().unwrap_or_else(Sink::stdout),
        options.stderr.clone().unwrap_or_else(Sink::stderr),
    )
    .with_print_label(options.print_label)
    .with_print_name(options.print_name)
    .with_aggregate_output(options.aggregate_output)
    .with_manifest(manifest)
    .with_labels_for(&plan);

    Scheduler::new(runner, &output, options.cancel.clone())
        .run(&plan)
        .await
}
