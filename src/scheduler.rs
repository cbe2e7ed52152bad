use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::output::{OutputManager, Stream};
use crate::plans::{Group, GroupStatus, RunPlan};
use crate::process::{Exit, ProcessRunner};
use crate::tasks::{ExecutionResult, ResolvedTask};


/// How one task ended, as seen by its group.
#[derive(Debug)]
enum TaskExit {
    Exited(Exit),
    /// Terminated by the scheduler after a failure, a race win or a cancel.
    Killed,
    Failed(Error),
}


#[derive(Debug)]
enum Failure {
    Exit { name: String, code: i32 },
    Other(Error),
}


#[derive(Debug)]
struct GroupOutcome {
    status: GroupStatus,
    results: Vec<ExecutionResult>,
    failure: Option<Failure>,
}


/// Executes a [`RunPlan`] group by group.
pub struct Scheduler<'a, R: ProcessRunner> {
    runner: &'a R,
    output: &'a OutputManager,
    cancel: CancellationToken,
}

impl<'a, R: ProcessRunner> Scheduler<'a, R> {
    pub fn new(runner: &'a R, output: &'a OutputManager, cancel: CancellationToken) -> Self {
        Self {
            runner,
            output,
            cancel,
        }
    }

    /// Runs every group in order and collects one result per task.
    ///
    /// A failed group stops the plan unless the plan continues on error, in
    /// which case the first failure is reported once everything has run.
    pub async fn run(&self, plan: &RunPlan) -> Result<Vec<ExecutionResult>, Error> {
        let mut results = vec![];
        let mut failure = None;

        for (index, group) in plan.groups.iter().enumerate() {
            tracing::debug!(group = index, mode = ?group.mode, tasks = group.tasks.len(), "Starting group");
            let outcome = self.run_group(group).await;
            results.extend(outcome.results);
            tracing::debug!(group = index, status = ?outcome.status, "Finished group");

            match outcome.status {
                GroupStatus::Completed => {}
                GroupStatus::Cancelled => return Err(Error::Cancelled { results }),
                GroupStatus::Failed => {
                    if failure.is_none() {
                        failure = outcome.failure;
                    }
                    if !plan.continue_on_error {
                        break;
                    }
                }
            }
        }

        match failure {
            None => Ok(results),
            Some(Failure::Exit { name, code }) => Err(Error::TaskFailed {
                name,
                code,
                results,
            }),
            Some(Failure::Other(err)) => Err(err),
        }
    }

    async fn run_group(&self, group: &Group) -> GroupOutcome {
        let group_cancel = self.cancel.child_token();
        let limit = group.concurrency();
        let mut results: Vec<ExecutionResult> = group
            .tasks
            .iter()
            .map(|task| ExecutionResult::pending(task.label()))
            .collect();
        let mut queue = group.tasks.iter().enumerate();
        let mut running = FuturesUnordered::new();
        let mut failure = None;
        let mut stopping = false;
        let mut won = false;

        loop {
            while !stopping && !self.cancel.is_cancelled() && running.len() < limit {
                let Some((index, task)) = queue.next() else {
                    break;
                };
                running.push(self.run_task(index, task, group, group_cancel.clone()));
            }

            let Some((index, exit)) = running.next().await else {
                break;
            };

            let failed = match exit {
                TaskExit::Exited(exit) => {
                    results[index].code = exit.code;
                    results[index].signal = exit.signal_name();
                    if exit.success() {
                        if group.race && !stopping {
                            tracing::debug!(task = %results[index].name, "Race won");
                            won = true;
                            stopping = true;
                            group_cancel.cancel();
                        }
                        None
                    } else {
                        Some(Failure::Exit {
                            name: results[index].name.clone(),
                            code: exit.exit_code(),
                        })
                    }
                }
                TaskExit::Killed => None,
                TaskExit::Failed(err) => Some(Failure::Other(err)),
            };

            if let Some(task_failure) = failed {
                if won {
                    continue;
                }
                if failure.is_none() {
                    failure = Some(task_failure);
                }
                if !group.continue_on_error && !stopping {
                    stopping = true;
                    group_cancel.cancel();
                }
            }
        }

        let status = if self.cancel.is_cancelled() {
            GroupStatus::Cancelled
        } else if failure.is_some() {
            GroupStatus::Failed
        } else {
            GroupStatus::Completed
        };

        GroupOutcome {
            status,
            results,
            failure,
        }
    }

    async fn run_task(
        &self,
        index: usize,
        task: &ResolvedTask,
        group: &Group,
        cancel: CancellationToken,
    ) -> (usize, TaskExit) {
        let output = self.output.for_task(task, group);
        if let Err(err) = output.start().await {
            tracing::warn!(task = %task.label(), error = %err, "Failed to write header");
        }

        let (stdout, stderr) = output.stdio();
        let mut process = match self.runner.launch(task, stdout, stderr) {
            Ok(process) => process,
            Err(err) => {
                tracing::error!(task = %task.label(), error = %err, "Failed to launch task");
                return (index, TaskExit::Failed(err));
            }
        };
        tracing::info!(task = %task.label(), pid = ?process.id(), "Task started");

        let stdout = process.take_stdout();
        let stderr = process.take_stderr();
        let waiting = async {
            tokio::select! {
                exit = process.wait() => exit.map(TaskExit::Exited),
                _ = cancel.cancelled() => process.terminate().await.map(|_| TaskExit::Killed),
            }
        };

        let (exit, held, forwarded) = tokio::join!(
            waiting,
            output.forward(stdout, Stream::Stdout),
            output.forward(stderr, Stream::Stderr),
        );

        let held = held.unwrap_or_else(|err| {
            tracing::warn!(task = %task.label(), error = %err, "Failed to forward stdout");
            vec![]
        });
        if let Err(err) = forwarded {
            tracing::warn!(task = %task.label(), error = %err, "Failed to forward stderr");
        }
        if let Err(err) = output.finish(held).await {
            tracing::warn!(task = %task.label(), error = %err, "Failed to flush output");
        }

        let exit = exit.unwrap_or_else(TaskExit::Failed);
        tracing::info!(task = %task.label(), exit = ?exit, "Task finished");
        (index, exit)
    }
}
