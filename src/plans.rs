use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::tasks::ResolvedTask;


#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum GroupMode {
    Sequential,
    Parallel,
}


/// A contiguous run of tasks sharing one execution mode.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Group {
    pub mode: GroupMode,
    pub tasks: Vec<ResolvedTask>,
    pub max_parallel: Option<usize>,
    pub race: bool,
    pub continue_on_error: bool,
}

impl Group {
    pub fn sequential(tasks: Vec<ResolvedTask>) -> Self {
        Self {
            mode: GroupMode::Sequential,
            tasks,
            max_parallel: None,
            race: false,
            continue_on_error: false,
        }
    }

    pub fn parallel(tasks: Vec<ResolvedTask>) -> Self {
        Self {
            mode: GroupMode::Parallel,
            ..Self::sequential(tasks)
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_race(mut self, race: bool) -> Self {
        self.race = race;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Rejects policies that only make sense for parallel groups.
    pub fn validate(&self) -> Result<(), Error> {
        if self.mode == GroupMode::Sequential {
            if self.race {
                return Err(Error::InvalidOption("--race (without parallel)".into()));
            }
            if self.max_parallel.is_some() {
                return Err(Error::InvalidOption(
                    "--max-parallel (without parallel)".into(),
                ));
            }
        }
        if self.max_parallel == Some(0) {
            return Err(Error::InvalidOption("--max-parallel 0".into()));
        }
        Ok(())
    }

    /// Number of tasks allowed to run at once.
    pub fn concurrency(&self) -> usize {
        match self.mode {
            GroupMode::Sequential => 1,
            GroupMode::Parallel => self
                .max_parallel
                .unwrap_or(self.tasks.len())
                .max(1),
        }
    }
}


#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct RunPlan {
    pub groups: Vec<Group>,
    /// Keep running later groups after a group fails.
    pub continue_on_error: bool,
}

impl RunPlan {
    pub fn tasks(&self) -> impl Iterator<Item = &ResolvedTask> {
        self.groups.iter().flat_map(|group| group.tasks.iter())
    }
}


/// Terminal state of one group.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum GroupStatus {
    Completed,
    Failed,
    Cancelled,
}
