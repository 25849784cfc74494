//! Task sequences and process plans.

use crate::error::{Result, RlsError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of stage kinds a pipeline is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Split,
    Kernel,
    Paramsel,
    Optimizer,
    Predictor,
    Performance,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Split,
        TaskKind::Kernel,
        TaskKind::Paramsel,
        TaskKind::Optimizer,
        TaskKind::Predictor,
        TaskKind::Performance,
    ];

    /// Canonical name, also the key a stage's results are stored under.
    pub const fn name(self) -> &'static str {
        match self {
            TaskKind::Split => "split",
            TaskKind::Kernel => "kernel",
            TaskKind::Paramsel => "paramsel",
            TaskKind::Optimizer => "optimizer",
            TaskKind::Predictor => "predictor",
            TaskKind::Performance => "performance",
        }
    }
}

impl FromStr for TaskKind {
    type Err = RlsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "split" => Ok(TaskKind::Split),
            "kernel" => Ok(TaskKind::Kernel),
            "paramsel" => Ok(TaskKind::Paramsel),
            "optimizer" => Ok(TaskKind::Optimizer),
            "predictor" | "pred" => Ok(TaskKind::Predictor),
            "performance" | "perf" => Ok(TaskKind::Performance),
            other => Err(RlsError::InvalidTask(format!("unknown stage kind '{other}'"))),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One `kind:algorithm` entry of a task sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    pub name: String,
}

impl TaskDescriptor {
    pub fn new(kind: TaskKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Parses `"kind:algorithm"`, e.g. `"paramsel:fixlambda"`.
    ///
    /// # Errors
    ///
    /// `InvalidTask` unless there is exactly one `:` with non-empty parts on both sides
    /// and a known kind on the left.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut parts = descriptor.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(kind), Some(name), None) if !kind.is_empty() && !name.is_empty() => {
                Ok(Self::new(kind.parse()?, name))
            }
            _ => Err(RlsError::InvalidTask(descriptor.to_string())),
        }
    }
}

impl FromStr for TaskDescriptor {
    type Err = RlsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// The ordered stages of an experiment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSequence {
    tasks: Vec<TaskDescriptor>,
}

impl TaskSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a sequence from descriptor strings.
    pub fn parse<I, S>(descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        descriptors
            .into_iter()
            .map(|d| TaskDescriptor::parse(d.as_ref()))
            .collect::<Result<Vec<_>>>()
            .map(|tasks| Self { tasks })
    }

    pub fn push(&mut self, task: TaskDescriptor) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TaskDescriptor> {
        self.tasks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaskDescriptor> {
        self.tasks.iter()
    }
}

impl FromIterator<TaskDescriptor> for TaskSequence {
    fn from_iter<I: IntoIterator<Item = TaskDescriptor>>(iter: I) -> Self {
        Self {
            tasks: iter.into_iter().collect(),
        }
    }
}

/// What the pipeline does with one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Skip the stage.
    Ignore,
    /// Run it and keep the result in memory.
    Compute,
    /// Run it, then save the whole accumulated tree.
    ComputeAndPersist,
    /// Restore the stage's result from the saved tree without running it.
    Load,
    /// Drop the stage's result from memory and from the saved tree.
    Delete,
}

impl Action {
    /// Display name used when printing a process plan.
    pub const fn name(self) -> &'static str {
        match self {
            Action::Ignore => "Ignore",
            Action::Compute => "Compute",
            Action::ComputeAndPersist => "ComputeNsave",
            Action::Load => "Load",
            Action::Delete => "Remove",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-stage actions of one named run, aligned by position with a task sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessPlan {
    actions: Vec<Action>,
}

impl ProcessPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Action> {
        self.actions.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.actions.iter().copied()
    }
}

impl FromIterator<Action> for ProcessPlan {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}
