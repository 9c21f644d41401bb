//! Filtering, sorting and progress figures over a [`Snapshot`].

use std::cmp::Reverse;

use crate::model::{Snapshot, TaskView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Open,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Most recently created first.
    #[default]
    Newest,
    /// High before normal before low.
    Priority,
    /// Earliest due date first; tasks without one go last.
    DueDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewOptions {
    pub filter: Filter,
    pub sort: SortOrder,
    /// Case-insensitive substring of the title; empty matches everything.
    pub search: String,
}

impl Filter {
    pub fn matches(&self, task: &TaskView) -> bool {
        match self {
            Filter::All => true,
            Filter::Open => !task.done,
            Filter::Completed => task.done,
        }
    }
}

/// Tasks of `snapshot` that pass `options`, in the requested order.
pub fn visible_tasks<'a>(snapshot: &'a Snapshot, options: &ViewOptions) -> Vec<&'a TaskView> {
    let needle = options.search.trim().to_lowercase();
    let mut tasks: Vec<&TaskView> = snapshot
        .tasks
        .iter()
        .filter(|task| options.filter.matches(task))
        .filter(|task| needle.is_empty() || task.title.to_lowercase().contains(&needle))
        .collect();
    // stable sorts keep collection order among equals
    match options.sort {
        SortOrder::Newest => tasks.sort_by_key(|task| Reverse(task.created_at)),
        SortOrder::Priority => tasks.sort_by_key(|task| Reverse(task.priority)),
        SortOrder::DueDate => tasks.sort_by_key(|task| (task.due_date.is_none(), task.due_date)),
    }
    tasks
}

/// Share of completed subtasks, 0 to 100. A task without subtasks is at 0.
pub fn subtask_progress(task: &TaskView) -> u8 {
    let total = task.subtasks.len();
    if total == 0 {
        return 0;
    }
    let done = task.subtasks.iter().filter(|subtask| subtask.done).count();
    ((done * 100) / total) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub open: usize,
    pub percent_complete: u8,
}

pub fn stats(snapshot: &Snapshot) -> Stats {
    let total = snapshot.tasks.len();
    let completed = snapshot.tasks.iter().filter(|task| task.done).count();
    let percent_complete = if total == 0 {
        0
    } else {
        ((completed * 100) / total) as u8
    };
    Stats {
        total,
        completed,
        open: total - completed,
        percent_complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemId, SubtaskView};
    use chrono::{Duration, NaiveDate, Utc};
    use shared::Priority;
    use uuid::Uuid;

    fn task(title: &str, age_minutes: i64) -> TaskView {
        TaskView {
            id: ItemId::Confirmed(Uuid::new_v4()),
            title: title.to_string(),
            description: None,
            due_date: None,
            priority: Priority::Normal,
            done: false,
            created_at: Utc::now() - Duration::minutes(age_minutes),
            owner_email: "ann@example.com".to_string(),
            collaborators: Vec::new(),
            pending_requests: Vec::new(),
            subtasks: Vec::new(),
            pending: false,
        }
    }

    fn subtask(parent: &TaskView, done: bool) -> SubtaskView {
        SubtaskView {
            id: ItemId::Confirmed(Uuid::new_v4()),
            task_id: parent.id,
            title: "step".to_string(),
            done,
            created_at: Utc::now(),
            pending: false,
        }
    }

    fn titles(tasks: Vec<&TaskView>) -> Vec<&str> {
        tasks.into_iter().map(|t| t.title.as_str()).collect()
    }

    fn snapshot(tasks: Vec<TaskView>) -> Snapshot {
        Snapshot { version: 1, tasks }
    }

    #[test]
    fn default_view_is_newest_first() {
        let snapshot = snapshot(vec![task("old", 30), task("new", 1), task("mid", 10)]);

        let visible = visible_tasks(&snapshot, &ViewOptions::default());

        assert_eq!(titles(visible), vec!["new", "mid", "old"]);
    }

    #[test]
    fn filter_and_search_combine() {
        let mut milk = task("Buy milk", 1);
        milk.done = true;
        let snapshot = snapshot(vec![milk, task("Buy bread", 2), task("Call mom", 3)]);

        let options = ViewOptions {
            filter: Filter::Open,
            search: "  BUY ".to_string(),
            ..Default::default()
        };

        assert_eq!(titles(visible_tasks(&snapshot, &options)), vec!["Buy bread"]);

        let completed = ViewOptions {
            filter: Filter::Completed,
            ..Default::default()
        };
        assert_eq!(titles(visible_tasks(&snapshot, &completed)), vec!["Buy milk"]);
    }

    #[test]
    fn priority_sort_puts_high_first() {
        let mut high = task("high", 3);
        high.priority = Priority::High;
        let mut low = task("low", 1);
        low.priority = Priority::Low;
        let snapshot = snapshot(vec![low, task("normal", 2), high]);

        let options = ViewOptions {
            sort: SortOrder::Priority,
            ..Default::default()
        };

        assert_eq!(
            titles(visible_tasks(&snapshot, &options)),
            vec!["high", "normal", "low"]
        );
    }

    #[test]
    fn due_date_sort_puts_undated_last() {
        let mut later = task("later", 1);
        later.due_date = NaiveDate::from_ymd_opt(2025, 6, 1);
        let mut sooner = task("sooner", 2);
        sooner.due_date = NaiveDate::from_ymd_opt(2025, 5, 1);
        let snapshot = snapshot(vec![task("undated", 0), later, sooner]);

        let options = ViewOptions {
            sort: SortOrder::DueDate,
            ..Default::default()
        };

        assert_eq!(
            titles(visible_tasks(&snapshot, &options)),
            vec!["sooner", "later", "undated"]
        );
    }

    #[test]
    fn progress_counts_done_subtasks() {
        let mut parent = task("trip", 0);
        assert_eq!(subtask_progress(&parent), 0);

        parent.subtasks = vec![
            subtask(&parent, true),
            subtask(&parent, false),
            subtask(&parent, false),
        ];
        assert_eq!(subtask_progress(&parent), 33);
    }

    #[test]
    fn stats_summarize_completion() {
        let mut done = task("a", 0);
        done.done = true;
        let snapshot = snapshot(vec![done, task("b", 0), task("c", 0), task("d", 0)]);

        assert_eq!(
            stats(&snapshot),
            Stats {
                total: 4,
                completed: 1,
                open: 3,
                percent_complete: 25,
            }
        );
        assert_eq!(stats(&Snapshot::default()).percent_complete, 0);
    }
}
