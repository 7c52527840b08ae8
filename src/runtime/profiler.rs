//! # Operation Profiler
//!
//! Records a tree of timed nodes, one per operation run. Each run becomes a
//! child of whichever run was active on the same profiler when it started,
//! so sub operations nest under their parent.
//!
//! A [`Profiler`] is a session handle: every [`Context`](crate::framework::Context)
//! owns one and hands clones of it to the contexts it spawns. Nothing is
//! global, so independent requests never see each other's nodes.
//!
//! ## Timings
//!
//! For a finished node:
//!
//! - `total` is wall time between start and stop,
//! - `children` is the sum of the direct children's totals,
//! - `own` is `total - children`.
//!
//! Once a root node has been logged, [`Profiler::free`] drops it together
//! with its whole subtree.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::info;

use crate::framework::{lock, OpId};

#[derive(Debug, Clone)]
pub struct ProfileNode {
    pub id: OpId,
    pub description: String,
    pub parent: Option<OpId>,
    pub children: Vec<OpId>,
    started: Instant,
    stopped: Option<Instant>,
    failed: bool,
}

impl ProfileNode {
    pub fn elapsed(&self) -> Option<Duration> {
        self.stopped.map(|stopped| stopped.duration_since(self.started))
    }

    pub fn finished(&self) -> bool {
        self.stopped.is_some()
    }

    pub fn failed(&self) -> bool {
        self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timings {
    pub total: Duration,
    pub children: Duration,
    pub own: Duration,
}

impl Timings {
    pub fn total_ms(&self) -> f64 {
        self.total.as_secs_f64() * 1000.0
    }

    pub fn children_ms(&self) -> f64 {
        self.children.as_secs_f64() * 1000.0
    }

    pub fn own_ms(&self) -> f64 {
        self.own.as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Default)]
struct ProfilerState {
    nodes: HashMap<OpId, ProfileNode>,
    current: Option<OpId>,
}

#[derive(Debug, Clone, Default)]
pub struct Profiler {
    state: Arc<Mutex<ProfilerState>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` as node `id`. The node is stopped and the previously active
    /// node restored even if `f` fails or panics.
    pub fn profile<T, E>(
        &self,
        id: OpId,
        description: impl Into<String>,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut guard = self.enter(id, description.into());
        let result = f();
        guard.failed = result.is_err();
        result
    }

    fn enter(&self, id: OpId, description: String) -> NodeGuard<'_> {
        let mut state = lock(&self.state);
        let parent = state.current;
        if let Some(parent_node) = parent.and_then(|p| state.nodes.get_mut(&p)) {
            parent_node.children.push(id);
        }
        state.nodes.insert(
            id,
            ProfileNode {
                id,
                description,
                parent,
                children: Vec::new(),
                started: Instant::now(),
                stopped: None,
                failed: false,
            },
        );
        state.current = Some(id);
        NodeGuard {
            profiler: self,
            id,
            parent,
            failed: false,
        }
    }

    /// The node currently being profiled.
    pub fn current(&self) -> Option<OpId> {
        lock(&self.state).current
    }

    pub fn node(&self, id: OpId) -> Option<ProfileNode> {
        lock(&self.state).nodes.get(&id).cloned()
    }

    /// Timings of a finished node.
    pub fn timings(&self, id: OpId) -> Option<Timings> {
        let state = lock(&self.state);
        let node = state.nodes.get(&id)?;
        let total = node.elapsed()?;
        let children = node
            .children
            .iter()
            .filter_map(|child| state.nodes.get(child)?.elapsed())
            .sum::<Duration>();
        Some(Timings {
            total,
            children,
            own: total.saturating_sub(children),
        })
    }

    /// Drops a root node and its subtree. Non-root nodes are kept.
    pub fn free(&self, id: OpId) -> bool {
        let mut state = lock(&self.state);
        match state.nodes.get(&id) {
            Some(node) if node.parent.is_none() => {}
            _ => return false,
        }
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(node) = state.nodes.remove(&next) {
                pending.extend(node.children);
            }
        }
        true
    }

    pub fn forget_all(&self) {
        let mut state = lock(&self.state);
        state.nodes.clear();
        state.current = None;
    }

    pub fn len(&self) -> usize {
        lock(&self.state).nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` and logs how long it took.
    pub fn time<T>(description: &str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let result = f();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!("{description} - {elapsed_ms:.1}ms elapsed.");
        result
    }
}

struct NodeGuard<'a> {
    profiler: &'a Profiler,
    id: OpId,
    parent: Option<OpId>,
    failed: bool,
}

impl Drop for NodeGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.profiler.state);
        if let Some(node) = state.nodes.get_mut(&self.id) {
            node.stopped = Some(Instant::now());
            node.failed = self.failed || std::thread::panicking();
        }
        state.current = self.parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn nested_runs_form_a_tree() {
        let profiler = Profiler::new();
        let (root, child) = (OpId::next(), OpId::next());

        profiler
            .profile(root, "root", || {
                thread::sleep(Duration::from_millis(5));
                profiler.profile(child, "child", || {
                    thread::sleep(Duration::from_millis(5));
                    Ok::<_, ()>(())
                })
            })
            .unwrap();

        assert_eq!(profiler.node(child).unwrap().parent, Some(root));
        assert_eq!(profiler.node(root).unwrap().children, vec![child]);
        assert_eq!(profiler.current(), None);

        let timings = profiler.timings(root).unwrap();
        assert!(timings.children >= Duration::from_millis(5));
        assert_eq!(timings.own + timings.children, timings.total);
    }

    #[test]
    fn failures_restore_the_parent() {
        let profiler = Profiler::new();
        let (root, child) = (OpId::next(), OpId::next());

        let _ = profiler.profile(root, "root", || {
            let failed: Result<(), &str> = profiler.profile(child, "child", || Err("boom"));
            assert_eq!(profiler.current(), Some(root));
            failed
        });

        assert!(profiler.node(child).unwrap().failed());
        assert!(profiler.node(root).unwrap().failed());
        assert_eq!(profiler.current(), None);
    }

    #[test]
    fn freeing_a_root_drops_its_subtree() {
        let profiler = Profiler::new();
        let (root, child) = (OpId::next(), OpId::next());
        profiler
            .profile(root, "root", || profiler.profile(child, "child", || Ok::<_, ()>(())))
            .unwrap();

        assert!(!profiler.free(child));
        assert_eq!(profiler.len(), 2);
        assert!(profiler.free(root));
        assert!(profiler.is_empty());
    }

    #[test]
    fn time_returns_the_block_result() {
        assert_eq!(Profiler::time("adding", || 1 + 1), 2);
    }
}
