use std::fmt;
use std::str::FromStr;

use crate::task::{Category, Task};

/// List filter offered on the task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskFilter {
    /// Every task.
    #[default]
    All,
    /// Tasks not yet completed.
    Pending,
    /// Completed tasks.
    Completed,
    /// Tasks in one category.
    Category(Category),
}

impl TaskFilter {
    /// Determine whether `task` passes the filter.
    #[must_use]
    pub fn matches(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Pending => !task.is_completed,
            Self::Completed => task.is_completed,
            Self::Category(category) => task.category == category,
        }
    }

    /// Clone the matching tasks, keeping their order.
    #[must_use]
    pub fn apply(self, tasks: &[Task]) -> Vec<Task> {
        tasks.iter().filter(|task| self.matches(task)).cloned().collect()
    }

    /// Every filter in display order.
    pub fn all() -> impl Iterator<Item = Self> {
        [Self::All, Self::Pending, Self::Completed]
            .into_iter()
            .chain(Category::ALL.into_iter().map(Self::Category))
    }
}

impl fmt::Display for TaskFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Pending => f.write_str("Pending"),
            Self::Completed => f.write_str("Completed"),
            Self::Category(category) => f.write_str(category.label()),
        }
    }
}

/// Error returned for unknown filter tokens.
#[derive(Debug, thiserror::Error)]
#[error("unknown filter: {0}")]
pub struct UnknownFilter(pub String);

impl FromStr for TaskFilter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Self::all()
            .find(|filter| filter.to_string().eq_ignore_ascii_case(token))
            .ok_or_else(|| UnknownFilter(token.to_owned()))
    }
}

/// Summary counters shown above the task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskStats {
    /// Every task.
    pub total: usize,
    /// Not completed.
    pub pending: usize,
    /// Completed.
    pub completed: usize,
    /// High or urgent priority, regardless of completion.
    pub high_priority: usize,
}

impl TaskStats {
    /// Count the given tasks.
    #[must_use]
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut stats, task| {
            stats.total += 1;
            if task.is_completed {
                stats.completed += 1;
            } else {
                stats.pending += 1;
            }
            if task.is_high_priority() {
                stats.high_priority += 1;
            }
            stats
        })
    }
}
