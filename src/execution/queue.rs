//! The ready queue shared between the coordinator and workers.
//!
//! Mirrors a join-able task queue: `put` admits work, blocked workers wake
//! on `get`, and `join` returns once every admitted item has been marked
//! done. Shutdown sentinels drain ahead of real work so idle workers exit
//! promptly.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use parking_lot::{Condvar, Mutex};
use petgraph::stable_graph::NodeIndex;
use rand::Rng;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Task {
    Run(NodeIndex),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueStrategy {
    Fifo,
    Random,
    Priority,
}

struct PriorityTask {
    priority: i64,
    task: Task,
}

impl PartialEq for PriorityTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for PriorityTask {}

impl PartialOrd for PriorityTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityTask {
    // BinaryHeap is a max-heap; lower priority values are more important.
    fn cmp(&self, other: &Self) -> Ordering {
        other.priority.cmp(&self.priority)
    }
}

enum Items {
    Fifo(VecDeque<Task>),
    Random(Vec<Task>),
    Priority {
        heap: BinaryHeap<PriorityTask>,
        priorities: FxHashMap<NodeIndex, i64>,
    },
}

impl Items {
    fn push(&mut self, task: Task) {
        match self {
            Items::Fifo(queue) => queue.push_back(task),
            Items::Random(items) => {
                // Online Fisher-Yates: append then swap into a random slot.
                items.push(task);
                let last = items.len() - 1;
                let target = rand::thread_rng().gen_range(0..items.len());
                items.swap(target, last);
            }
            Items::Priority { heap, priorities } => {
                // Missing priorities (and shutdown) sort ahead of all work.
                let priority = match task {
                    Task::Run(node) => priorities.get(&node).copied().unwrap_or(-1),
                    Task::Shutdown => -1,
                };
                heap.push(PriorityTask { priority, task });
            }
        }
    }

    fn pop(&mut self) -> Option<Task> {
        match self {
            Items::Fifo(queue) => queue.pop_front(),
            Items::Random(items) => items.pop(),
            Items::Priority { heap, .. } => heap.pop().map(|entry| entry.task),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Items::Fifo(queue) => queue.is_empty(),
            Items::Random(items) => items.is_empty(),
            Items::Priority { heap, .. } => heap.is_empty(),
        }
    }
}

struct QueueState {
    items: Items,
    unfinished: usize,
}

pub(crate) struct ReadyQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    drained: Condvar,
}

impl ReadyQueue {
    pub fn fifo() -> Self {
        Self::with_items(Items::Fifo(VecDeque::new()))
    }

    pub fn random() -> Self {
        Self::with_items(Items::Random(Vec::new()))
    }

    pub fn priority(priorities: FxHashMap<NodeIndex, i64>) -> Self {
        Self::with_items(Items::Priority {
            heap: BinaryHeap::new(),
            priorities,
        })
    }

    fn with_items(items: Items) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items,
                unfinished: 0,
            }),
            available: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    pub fn put(&self, task: Task) {
        let mut state = self.state.lock();
        state.items.push(task);
        state.unfinished += 1;
        drop(state);
        self.available.notify_one();
    }

    /// Block until a task is available.
    pub fn get(&self) -> Task {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.items.pop() {
                return task;
            }
            self.available.wait(&mut state);
        }
    }

    /// Mark one previously fetched task as finished.
    pub fn task_done(&self) {
        let mut state = self.state.lock();
        state.unfinished -= 1;
        if state.unfinished == 0 {
            drop(state);
            self.drained.notify_all();
        }
    }

    /// Block until every admitted task has been marked done.
    pub fn join(&self) {
        let mut state = self.state.lock();
        while state.unfinished > 0 {
            self.drained.wait(&mut state);
        }
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}
