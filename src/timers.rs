use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::{Document, Error, Result};

/// Handle returned when a timer is scheduled on a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub(crate) i64);

impl TimerId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub(crate) type TimerCallback = Rc<RefCell<dyn FnMut(&Document) -> Result<()>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: TimerId,
    pub due_at: i64,
    pub order: i64,
    pub interval_ms: Option<i64>,
}

#[derive(Clone)]
pub(crate) struct ScheduledTask {
    pub(crate) id: TimerId,
    pub(crate) due_at: i64,
    pub(crate) order: i64,
    pub(crate) interval_ms: Option<i64>,
    pub(crate) callback: TimerCallback,
}

impl ScheduledTask {
    pub(crate) fn describe(&self) -> String {
        let interval_desc = self
            .interval_ms
            .map(|value| value.to_string())
            .unwrap_or_else(|| "none".into());
        format!(
            "id={},due_at={},order={},interval_ms={}",
            self.id, self.due_at, self.order, interval_desc
        )
    }
}

/// Virtual clock plus the queue of scheduled callbacks.
///
/// The queue only stores tasks. Running them is left to [`Document`], which must not
/// hold its state borrow while a callback executes.
pub(crate) struct TimerQueue {
    pub(crate) now_ms: i64,
    tasks: Vec<ScheduledTask>,
    next_timer_id: i64,
    next_task_order: i64,
    pub(crate) running_timer_id: Option<TimerId>,
    pub(crate) running_timer_canceled: bool,
    pub(crate) step_limit: usize,
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self {
            now_ms: 0,
            tasks: Vec::new(),
            next_timer_id: 1,
            next_task_order: 0,
            running_timer_id: None,
            running_timer_canceled: false,
            step_limit: 10_000,
        }
    }
}

impl TimerQueue {
    pub(crate) fn schedule(
        &mut self,
        callback: TimerCallback,
        delay_ms: i64,
        interval_ms: Option<i64>,
    ) -> ScheduledTask {
        let delay_ms = delay_ms.max(0);
        let id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;
        let task = ScheduledTask {
            id,
            due_at: self.now_ms.saturating_add(delay_ms),
            order: self.next_order(),
            interval_ms: interval_ms.map(|ms| ms.max(0)),
            callback,
        };
        self.tasks.push(task.clone());
        task
    }

    fn next_order(&mut self) -> i64 {
        let order = self.next_task_order;
        self.next_task_order += 1;
        order
    }

    /// Drops the task with `id`. Returns how many queued entries were removed and
    /// whether the currently running task was the one canceled.
    pub(crate) fn clear(&mut self, id: TimerId) -> (usize, bool) {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        let removed = before.saturating_sub(self.tasks.len());
        let running_canceled = self.running_timer_id == Some(id);
        if running_canceled {
            self.running_timer_canceled = true;
        }
        (removed, running_canceled)
    }

    pub(crate) fn clear_all(&mut self) -> usize {
        let cleared = self.tasks.len();
        self.tasks.clear();
        if self.running_timer_id.is_some() {
            self.running_timer_canceled = true;
        }
        cleared
    }

    pub(crate) fn contains(&self, id: TimerId) -> bool {
        (self.running_timer_id == Some(id) && !self.running_timer_canceled)
            || self.tasks.iter().any(|task| task.id == id)
    }

    pub(crate) fn pending(&self) -> Vec<PendingTimer> {
        let mut timers = self
            .tasks
            .iter()
            .map(|task| PendingTimer {
                id: task.id,
                due_at: task.due_at,
                order: task.order,
                interval_ms: task.interval_ms,
            })
            .collect::<Vec<_>>();
        timers.sort_by_key(|timer| (timer.due_at, timer.order));
        timers
    }

    fn next_task_index(&self, due_limit: Option<i64>) -> Option<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| due_limit.is_none_or(|limit| task.due_at <= limit))
            .min_by_key(|(_, task)| (task.due_at, task.order))
            .map(|(idx, _)| idx)
    }

    pub(crate) fn has_next(&self, due_limit: Option<i64>) -> bool {
        self.next_task_index(due_limit).is_some()
    }

    /// Removes the earliest task due at or before `due_limit` (any task when `None`),
    /// moving the clock forward to its due time when `advance_clock` is set.
    pub(crate) fn take_next(
        &mut self,
        due_limit: Option<i64>,
        advance_clock: bool,
    ) -> Option<ScheduledTask> {
        let idx = self.next_task_index(due_limit)?;
        let task = self.tasks.remove(idx);
        if advance_clock && task.due_at > self.now_ms {
            self.now_ms = task.due_at;
        }
        Some(task)
    }

    pub(crate) fn begin_run(&mut self, id: TimerId) {
        self.running_timer_id = Some(id);
        self.running_timer_canceled = false;
    }

    /// Ends the current run and puts an uncanceled interval task back in the queue.
    /// Returns the new due time when it was requeued.
    pub(crate) fn finish_run(&mut self, task: ScheduledTask) -> Option<i64> {
        let canceled = self.running_timer_canceled;
        self.running_timer_id = None;
        self.running_timer_canceled = false;

        let interval_ms = task.interval_ms?;
        if canceled {
            return None;
        }
        let due_at = task.due_at.saturating_add(interval_ms);
        let order = self.next_order();
        self.tasks.push(ScheduledTask {
            due_at,
            order,
            ..task
        });
        Some(due_at)
    }

    /// Leaves the queue consistent after a callback failed mid-run.
    pub(crate) fn abort_run(&mut self) {
        self.running_timer_id = None;
        self.running_timer_canceled = false;
    }

    pub(crate) fn step_limit_error(&self, steps: usize, due_limit: Option<i64>) -> Error {
        let due_limit_desc = due_limit
            .map(|value| value.to_string())
            .unwrap_or_else(|| "none".into());
        let next_task_desc = self
            .next_task_index(due_limit)
            .and_then(|idx| self.tasks.get(idx))
            .map(ScheduledTask::describe)
            .unwrap_or_else(|| "none".into());

        Error::Timer(format!(
            "timer queue exceeded max steps (possible unstopped interval): limit={}, steps={steps}, now_ms={}, due_limit={due_limit_desc}, pending_tasks={}, next_task={next_task_desc}",
            self.step_limit,
            self.now_ms,
            self.tasks.len(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TimerCallback {
        Rc::new(RefCell::new(|_: &Document| Ok::<(), Error>(())))
    }

    #[test]
    fn tasks_come_out_by_due_time_then_schedule_order() {
        let mut queue = TimerQueue::default();
        let late = queue.schedule(noop(), 20, None).id;
        let first = queue.schedule(noop(), 5, None).id;
        let second = queue.schedule(noop(), 5, None).id;

        let order = std::iter::from_fn(|| queue.take_next(None, true))
            .map(|task| task.id)
            .collect::<Vec<_>>();
        assert_eq!(order, vec![first, second, late]);
        assert_eq!(queue.now_ms, 20);
    }

    #[test]
    fn due_limit_leaves_future_tasks_queued() {
        let mut queue = TimerQueue::default();
        queue.schedule(noop(), 10, None);
        assert!(queue.take_next(Some(9), false).is_none());
        assert!(queue.take_next(Some(10), false).is_some());
    }

    #[test]
    fn interval_requeues_unless_canceled_while_running() {
        let mut queue = TimerQueue::default();
        let id = queue.schedule(noop(), 10, Some(10)).id;

        let task = queue.take_next(None, true).expect("interval task");
        queue.begin_run(task.id);
        assert_eq!(queue.finish_run(task), Some(20));

        let task = queue.take_next(None, true).expect("requeued task");
        queue.begin_run(task.id);
        assert_eq!(queue.clear(id), (0, true));
        assert_eq!(queue.finish_run(task), None);
        assert!(queue.pending().is_empty());
    }

    #[test]
    fn negative_delay_is_clamped_to_now() {
        let mut queue = TimerQueue::default();
        queue.now_ms = 50;
        let task = queue.schedule(noop(), -5, None);
        assert_eq!(task.due_at, 50);
    }
}
