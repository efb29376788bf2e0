//! Cooperative single-threaded task scheduler (§4.7, grounded in the
//! original firmware's main-loop task queue: no OS, no preemption, callers
//! post closures-as-tokens and a driving loop pops them in priority/deadline
//! order).
//!
//! There is no real clock here — `now_ms` is supplied by the caller on every
//! `tick`, matching how the original derives time from a hardware timer
//! rather than the scheduler owning one.

pub const QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(u32);

#[derive(Clone, Copy)]
struct Task<T> {
    handle: TaskHandle,
    token: T,
    priority: Priority,
    due_ms: u32,
    period_ms: Option<u32>,
}

/// A fixed-capacity queue of scheduled tokens. `T` is typically a small
/// `Copy` enum identifying what to run; the queue itself runs nothing — the
/// caller's driving loop pops due tasks via `poll_due` and dispatches them.
pub struct TaskQueue<T: Copy, const N: usize = QUEUE_CAPACITY> {
    tasks: heapless::Vec<Task<T>, N>,
    next_handle: u32,
}

impl<T: Copy, const N: usize> Default for TaskQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> TaskQueue<T, N> {
    pub fn new() -> Self {
        TaskQueue {
            tasks: heapless::Vec::new(),
            next_handle: 1,
        }
    }

    fn alloc_handle(&mut self) -> TaskHandle {
        let h = TaskHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        h
    }

    /// Run `token` as soon as the queue is next polled.
    pub fn post(&mut self, token: T, priority: Priority, now_ms: u32) -> Option<TaskHandle> {
        self.post_delayed(token, priority, now_ms, 0)
    }

    /// Run `token` once, `delay_ms` after `now_ms`.
    pub fn post_delayed(
        &mut self,
        token: T,
        priority: Priority,
        now_ms: u32,
        delay_ms: u32,
    ) -> Option<TaskHandle> {
        let handle = self.alloc_handle();
        let task = Task {
            handle,
            token,
            priority,
            due_ms: now_ms.wrapping_add(delay_ms),
            period_ms: None,
        };
        self.tasks.push(task).ok()?;
        Some(handle)
    }

    /// Run `token` once, identical to `post_delayed` — named for call-site
    /// clarity when the delay is semantically "after this other thing".
    pub fn post_after(&mut self, token: T, priority: Priority, now_ms: u32, delay_ms: u32) -> Option<TaskHandle> {
        self.post_delayed(token, priority, now_ms, delay_ms)
    }

    /// Run `token` once right away and never again, replacing any existing
    /// pending instance carrying an equal token (requires `T: PartialEq`).
    pub fn post_once(&mut self, token: T, priority: Priority, now_ms: u32) -> Option<TaskHandle>
    where
        T: PartialEq,
    {
        if self.tasks.iter().any(|t| t.token == token) {
            return None;
        }
        self.post(token, priority, now_ms)
    }

    /// Run `token` every `period_ms`, starting `period_ms` from now.
    pub fn post_periodic(
        &mut self,
        token: T,
        priority: Priority,
        now_ms: u32,
        period_ms: u32,
    ) -> Option<TaskHandle> {
        let handle = self.alloc_handle();
        let task = Task {
            handle,
            token,
            priority,
            due_ms: now_ms.wrapping_add(period_ms),
            period_ms: Some(period_ms),
        };
        self.tasks.push(task).ok()?;
        Some(handle)
    }

    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        if let Some(pos) = self.tasks.iter().position(|t| t.handle == handle) {
            self.tasks.swap_remove(pos);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Pop and return the highest-priority (ties: earliest-due) task that is
    /// due at or before `now_ms`. Periodic tasks are rescheduled for their
    /// next period before returning.
    pub fn poll_due(&mut self, now_ms: u32) -> Option<(TaskHandle, T)> {
        let mut best: Option<usize> = None;
        for (i, t) in self.tasks.iter().enumerate() {
            if now_ms.wrapping_sub(t.due_ms) as i32 < 0 {
                continue; // not due yet (handles wraparound via signed delta)
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let bt = &self.tasks[b];
                    if t.priority > bt.priority
                        || (t.priority == bt.priority && t.due_ms < bt.due_ms)
                    {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }

        let i = best?;
        let task = self.tasks[i];
        if let Some(period) = task.period_ms {
            self.tasks[i].due_ms = task.due_ms.wrapping_add(period);
        } else {
            self.tasks.swap_remove(i);
        }
        Some((task.handle, task.token))
    }
}
