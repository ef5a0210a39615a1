//! # Next-operation planning for a task.
//!
//! [`next_action`] looks at a task's current state and returns the single
//! next runtime operation its manager should perform, or `None` when nothing
//! is actionable. The manager executes it, records the outcome and asks
//! again, so the plan is always recomputed from observed state (this is also
//! what makes restore work: a restored task is planned exactly like a new one).
//!
//! Priority, first match wins:
//! 1. **Teardown**, reverse declaration order: a non-terminal container whose
//!    target is STOPPED, or that has not started yet and depends on a
//!    container that already terminated.
//! 2. **Prepare**, declaration order: pull, then create, a container whose
//!    target is not STOPPED once its dependencies are ready: RUNNING when it
//!    targets RUNNING, at least CREATED when it targets CREATED.
//! 3. **Start**, declaration order: a CREATED container targeting RUNNING
//!    whose dependencies are all RUNNING.
//!
//! A dependent is therefore not touched until the containers it depends on
//! run, which keeps the event stream in dependency order:
//!
//! ```text
//! a PULLED ─► a CREATED ─► a RUNNING ─► b PULLED ─► b CREATED ─► b RUNNING
//! ```

use crate::tasks::{Container, ContainerStatus, DesiredStatus, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Pull,
    Create,
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Action {
    pub idx: usize,
    pub op: Op,
    /// Recorded on the container when the operation completes (teardown only).
    pub reason: Option<String>,
}

impl Action {
    fn new(idx: usize, op: Op) -> Self {
        Self {
            idx,
            op,
            reason: None,
        }
    }
}

pub(crate) fn next_action(task: &Task) -> Option<Action> {
    teardown(task)
        .or_else(|| prepare(task))
        .or_else(|| start(task))
}

fn teardown(task: &Task) -> Option<Action> {
    let containers = task.containers();
    for (idx, c) in containers.iter().enumerate().rev() {
        if c.is_terminal() {
            continue;
        }
        if task.target_of(idx) == DesiredStatus::Stopped {
            return Some(Action {
                reason: task.stop_reason().map(str::to_string),
                ..Action::new(idx, Op::Stop)
            });
        }
        if ContainerStatus::reached(c.known_status(), ContainerStatus::Running) {
            continue;
        }
        let dead_dep = c
            .dependencies
            .iter()
            .filter_map(|d| task.container(d))
            .find(|d| d.is_terminal());
        if let Some(dep) = dead_dep {
            return Some(Action {
                reason: Some(format!(
                    "dependency '{}' is {}",
                    dep.name,
                    dep.known_status()
                        .map(ContainerStatus::as_str)
                        .unwrap_or("STOPPED")
                )),
                ..Action::new(idx, Op::Stop)
            });
        }
    }
    None
}

fn prepare(task: &Task) -> Option<Action> {
    task.containers()
        .iter()
        .enumerate()
        .filter(|(idx, c)| match task.target_of(*idx) {
            DesiredStatus::Stopped => false,
            DesiredStatus::Created => deps_ready(task, c, |s| {
                ContainerStatus::reached(s, ContainerStatus::Created)
            }),
            DesiredStatus::Running => deps_ready(task, c, is_running),
        })
        .find_map(|(idx, c)| match c.known_status() {
            None => Some(Action::new(idx, Op::Pull)),
            Some(ContainerStatus::Pulled) => Some(Action::new(idx, Op::Create)),
            _ => None,
        })
}

fn start(task: &Task) -> Option<Action> {
    task.containers()
        .iter()
        .enumerate()
        .filter(|(idx, c)| {
            task.target_of(*idx) == DesiredStatus::Running
                && c.known_status() == Some(ContainerStatus::Created)
        })
        .find(|(_, c)| deps_ready(task, c, is_running))
        .map(|(idx, _)| Action::new(idx, Op::Start))
}

fn is_running(status: Option<ContainerStatus>) -> bool {
    status == Some(ContainerStatus::Running)
}

fn deps_ready(
    task: &Task,
    container: &Container,
    ready: impl Fn(Option<ContainerStatus>) -> bool,
) -> bool {
    container
        .dependencies
        .iter()
        .all(|d| task.container(d).is_some_and(|d| ready(d.known_status())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContainerStatus::*;

    fn task() -> Task {
        Task::new(
            "t",
            vec![
                Container::new("a", "img-a"),
                Container::new("b", "img-b").depends_on("a").essential(false),
            ],
        )
    }

    fn with(mut t: Task, statuses: &[Option<ContainerStatus>]) -> Task {
        for (idx, s) in statuses.iter().enumerate() {
            t.container_mut(idx).unwrap().known_status = *s;
        }
        t
    }

    fn op(t: &Task) -> Option<(usize, Op)> {
        next_action(t).map(|a| (a.idx, a.op))
    }

    #[test]
    fn test_dependent_is_prepared_after_dependencies_run() {
        assert_eq!(op(&task()), Some((0, Op::Pull)));
        assert_eq!(op(&with(task(), &[Some(Pulled), None])), Some((0, Op::Create)));
        assert_eq!(op(&with(task(), &[Some(Created), None])), Some((0, Op::Start)));
        assert_eq!(op(&with(task(), &[Some(Running), None])), Some((1, Op::Pull)));
        assert_eq!(
            op(&with(task(), &[Some(Running), Some(Pulled)])),
            Some((1, Op::Create))
        );
    }

    #[test]
    fn test_desired_created_prepares_after_dependencies_exist() {
        let t = task().with_desired_status(DesiredStatus::Created);
        assert_eq!(op(&with(t.clone(), &[Some(Pulled), None])), Some((0, Op::Create)));
        assert_eq!(op(&with(t, &[Some(Created), None])), Some((1, Op::Pull)));
    }

    #[test]
    fn test_start_waits_for_running_dependencies() {
        let t = with(task(), &[Some(Created), Some(Created)]);
        assert_eq!(op(&t), Some((0, Op::Start)));
        let t = with(task(), &[Some(Running), Some(Created)]);
        assert_eq!(op(&t), Some((1, Op::Start)));
        let t = with(task(), &[Some(Running), Some(Running)]);
        assert_eq!(op(&t), None);
    }

    #[test]
    fn test_dead_dependency_stops_dependent() {
        let t = with(task(), &[Some(Dead), Some(Created)]);
        let action = next_action(&t).unwrap();
        assert_eq!((action.idx, action.op), (1, Op::Stop));
        assert_eq!(action.reason.as_deref(), Some("dependency 'a' is DEAD"));
    }

    #[test]
    fn test_teardown_runs_in_reverse_order() {
        let mut t = with(task(), &[Some(Running), Some(Running)]);
        t.request_stop("operator");
        let action = next_action(&t).unwrap();
        assert_eq!((action.idx, action.op), (1, Op::Stop));
        assert_eq!(action.reason.as_deref(), Some("operator"));

        let t2 = with(t, &[Some(Running), Some(Stopped)]);
        assert_eq!(op(&t2), Some((0, Op::Stop)));
    }

    #[test]
    fn test_desired_created_never_starts() {
        let t = with(
            task().with_desired_status(DesiredStatus::Created),
            &[Some(Created), Some(Created)],
        );
        assert_eq!(op(&t), None);
    }

    #[test]
    fn test_terminal_task_has_nothing_to_do() {
        let t = with(task(), &[Some(Dead), Some(Stopped)]);
        assert_eq!(op(&t), None);
    }
}
