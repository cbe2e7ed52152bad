use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;


/// A script name matched by a pattern, with the argument text that followed
/// the pattern on the command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskSpec {
    pub name: String,
    pub raw_args: String,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, raw_args: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_args: raw_args.into(),
        }
    }

    /// The command this spec stands for, used as the dedup key within a group.
    pub fn command(&self) -> String {
        if self.raw_args.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.raw_args)
        }
    }
}


/// A concrete script invocation, ready to hand to a process runner.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTask {
    pub name: String,
    pub argv: Vec<String>,
    pub config_overrides: BTreeMap<String, String>,
}

impl ResolvedTask {
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            argv,
            config_overrides: BTreeMap::new(),
        }
    }

    /// The name followed by its arguments, quoted where a shell would need it.
    pub fn label(&self) -> String {
        let mut label = self.name.clone();
        for arg in &self.argv {
            label.push(' ');
            label.push_str(&quote_arg(arg));
        }
        label
    }
}


#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum TaskStatus {
    /// Never started, or terminated by the scheduler before it reported.
    Incomplete,
    Success,
    Failure,
}


/// What happened to one task of a run.
///
/// `code` is absent when the task never started, was terminated by the
/// scheduler, or was killed by a signal (then `signal` names it).
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct ExecutionResult {
    pub name: String,
    pub code: Option<i32>,
    pub signal: Option<String>,
}

impl ExecutionResult {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: None,
            signal: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        match (self.code, &self.signal) {
            (Some(0), None) => TaskStatus::Success,
            (Some(_), _) | (None, Some(_)) => TaskStatus::Failure,
            (None, None) => TaskStatus::Incomplete,
        }
    }
}


/// Quotes `arg` with single quotes when it would not survive a shell word split.
pub fn quote_arg(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg.chars().all(|c| {
            c.is_ascii_alphanumeric() || "-_./:=@%+,{}".contains(c)
        });
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}
