//! Synchronous scheduling state of the resource manager
//!
//! Every public mutation ends with a scheduling pass, so between calls the
//! heap holds exactly the nodes with unmet demand.

use tokio::sync::mpsc;
use crate::resources::arena::{NodeArena, NodeId};
use crate::resources::heap::{HeapKey, KeyedHeap};
use crate::resources::ResourceMode;
use crate::system::metrics::Metrics;
use crate::types::ResourceState;
use crate::{log_debug, log_trace};

/// Grant notification sent to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceGrant {
    /// Node the grant is for
    pub node: NodeId,
    /// Manager's view of the node after the grant; the worker takes `limit`
    /// from it with [`ResourceState::update_slave`]
    pub state: ResourceState,
}

struct Node {
    id: NodeId,
    state: ResourceState,
    priority: i32,
    callback: mpsc::UnboundedSender<ResourceGrant>,
}

enum Satisfy {
    /// All demand granted
    Full,
    /// Some demand granted, budget ran out
    Partial,
    /// Nothing could be granted
    Exhausted,
}

/// Scheduling state over registered workers
pub struct ResourceScheduler {
    mode: ResourceMode,
    max_resource_limit: i64,
    nodes: NodeArena<Node>,
    /// Nodes awaiting a heap membership check, highest priority first
    pending: Vec<(i32, NodeId)>,
    by_estimated_extra: KeyedHeap<HeapKey>,
    /// Sum of `active_limit` over all nodes
    active_total: i64,
    stopping: bool,
}

impl ResourceScheduler {
    /// Create a scheduler sharing `max_resource_limit` among its workers
    pub fn new(mode: ResourceMode, max_resource_limit: i64) -> Self {
        Self {
            mode,
            max_resource_limit,
            nodes: NodeArena::new(),
            pending: Vec::new(),
            by_estimated_extra: KeyedHeap::new(),
            active_total: 0,
            stopping: false,
        }
    }

    /// Scheduling mode
    pub fn mode(&self) -> ResourceMode {
        self.mode
    }

    /// Budget currently held by workers
    pub fn active_total(&self) -> i64 {
        self.active_total
    }

    /// Budget not held by any worker
    pub fn unused(&self) -> i64 {
        self.max_resource_limit - self.active_total
    }

    /// Number of registered workers
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of workers with unmet demand
    pub fn heap_len(&self) -> usize {
        self.by_estimated_extra.len()
    }

    /// Whether `id` is waiting for budget
    pub fn is_heap_resident(&self, id: NodeId) -> bool {
        self.by_estimated_extra.contains(id)
    }

    /// Manager's view of a worker
    pub fn node_state(&self, id: NodeId) -> Option<ResourceState> {
        self.nodes.get(id).map(|node| node.state)
    }

    /// Whether a stop was requested and every worker is gone
    pub fn is_finished(&self) -> bool {
        self.stopping && self.nodes.is_empty()
    }

    /// Add a worker with an empty ledger
    pub fn register_worker(
        &mut self,
        callback: mpsc::UnboundedSender<ResourceGrant>,
        priority: i32,
    ) -> NodeId {
        let id = self.nodes.insert_with(|id| Node {
            id,
            state: ResourceState::new(),
            priority,
            callback,
        });
        log_debug!("Registered {} with priority {}", id, priority);
        Metrics::global().resources.workers_registered.inc();
        self.add_pending(id, priority);
        self.run();
        id
    }

    /// Change a worker's priority
    pub fn update_priority(&mut self, id: NodeId, priority: i32) {
        if self.stopping {
            return;
        }
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.priority = priority;
        let key = HeapKey { extra: node.state.estimated_extra(), priority };
        self.by_estimated_extra.update(id, key);
        if self.remove_pending(id) {
            self.add_pending(id, priority);
        }
        self.run();
    }

    /// Take a worker's report of usage and demand
    pub fn update_resources(&mut self, id: NodeId, report: &ResourceState) {
        if self.stopping {
            return;
        }
        let Some(node) = self.nodes.get_mut(id) else {
            log_debug!("Ignoring report from departed {}", id);
            return;
        };
        log_trace!("Before {}: {} total {}", id, node.state, self.active_total);
        self.active_total -= node.state.active_limit();
        node.state.update_master(report);
        self.active_total += node.state.active_limit();
        log_trace!("After {}: {} total {}", id, node.state, self.active_total);

        let priority = node.priority;
        if !self.pending.iter().any(|&(_, pending)| pending == id) {
            self.add_pending(id, priority);
        }
        self.run();
    }

    /// Drop a worker and give its budget back. Returns false if it was
    /// already gone.
    pub fn remove_worker(&mut self, id: NodeId) -> bool {
        if !self.detach(id) {
            return false;
        }
        self.run();
        true
    }

    /// Change the shared budget and reschedule
    pub fn set_max_resource_limit(&mut self, max_resource_limit: i64) {
        log_debug!("Budget {} -> {}", self.max_resource_limit, max_resource_limit);
        self.max_resource_limit = max_resource_limit;
        self.run();
    }

    /// Total shared budget
    pub fn max_resource_limit(&self) -> i64 {
        self.max_resource_limit
    }

    /// Stop granting; the scheduler finishes once every worker is gone
    pub fn stop(&mut self) {
        self.stopping = true;
    }

    /// Run scheduling passes until no grant fails on a dropped worker.
    /// Returns the number of grants sent.
    pub fn run(&mut self) -> usize {
        if self.stopping {
            return 0;
        }
        let mut grants = 0;
        loop {
            let mut disconnected = Vec::new();
            grants += self.run_pass(&mut disconnected);
            if disconnected.is_empty() {
                break;
            }
            for id in disconnected {
                self.detach(id);
            }
        }
        Metrics::global().resources.active_budget.set(self.active_total);
        grants
    }

    fn run_pass(&mut self, disconnected: &mut Vec<NodeId>) -> usize {
        for (_, id) in std::mem::take(&mut self.pending) {
            self.sync_heap(id);
        }
        log_trace!("Scheduling pass: unused {} waiting {}", self.unused(), self.heap_len());

        let mut grants = 0;
        let mut first_satisfied = None;
        while let Some((id, _)) = self.by_estimated_extra.peek() {
            match self.satisfy_node(id, disconnected) {
                Satisfy::Full => {
                    self.by_estimated_extra.remove(id);
                    first_satisfied.get_or_insert(id);
                    grants += 1;
                }
                Satisfy::Partial => {
                    self.sync_heap(id);
                    grants += 1;
                    break;
                }
                Satisfy::Exhausted => break,
            }
        }

        if self.mode == ResourceMode::Greedy && self.by_estimated_extra.is_empty() {
            if let Some(id) = first_satisfied {
                if self.grant_idle(id, disconnected) {
                    grants += 1;
                }
            }
        }
        grants
    }

    /// Grant `id` as much of its demand as the budget allows
    fn satisfy_node(&mut self, id: NodeId, disconnected: &mut Vec<NodeId>) -> Satisfy {
        let free = self.unused();
        let Some(node) = self.nodes.get_mut(id) else {
            panic!("scheduling heap references missing {}", id);
        };
        let unit = node.state.unit_size();
        let need = node.state.estimated_extra();
        if need == 0 {
            return Satisfy::Full;
        }
        let mut give = need.min(free);
        give -= give % unit;
        if give <= 0 {
            return Satisfy::Exhausted;
        }

        node.state.update_limit(give);
        self.active_total += give;
        log_debug!("Granting {} of {} to {} (unused {})", give, need, id, free - give);
        Self::notify(node, give, disconnected);

        if give == need {
            Satisfy::Full
        } else {
            Satisfy::Partial
        }
    }

    /// Hand the idle budget to `id` in whole units
    fn grant_idle(&mut self, id: NodeId, disconnected: &mut Vec<NodeId>) -> bool {
        let free = self.unused();
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let unit = node.state.unit_size();
        let give = free - free % unit;
        if give <= 0 {
            return false;
        }
        node.state.update_limit(give);
        self.active_total += give;
        log_debug!("Granting idle {} to {}", give, id);
        Self::notify(node, give, disconnected);
        true
    }

    fn notify(node: &Node, give: i64, disconnected: &mut Vec<NodeId>) {
        let metrics = &Metrics::global().resources;
        metrics.grants.inc();
        metrics.granted_bytes.inc_by(give as u64);
        let grant = ResourceGrant { node: node.id, state: node.state };
        if node.callback.send(grant).is_err() {
            log_debug!("{} dropped its grant channel", node.id);
            disconnected.push(node.id);
        }
    }

    /// Make heap membership of `id` match its current demand
    fn sync_heap(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let key = HeapKey { extra: node.state.estimated_extra(), priority: node.priority };
        if self.by_estimated_extra.contains(id) {
            if key.extra > 0 {
                self.by_estimated_extra.update(id, key);
            } else {
                self.by_estimated_extra.remove(id);
            }
        } else if key.extra > 0 {
            self.by_estimated_extra.insert(id, key);
        }
    }

    fn detach(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.remove(id) else {
            return false;
        };
        self.by_estimated_extra.remove(id);
        self.remove_pending(id);
        self.active_total -= node.state.active_limit();
        log_debug!("Removed {} returning {}", id, node.state.active_limit());
        Metrics::global().resources.workers_removed.inc();
        true
    }

    fn add_pending(&mut self, id: NodeId, priority: i32) {
        let pos = self
            .pending
            .iter()
            .position(|&(existing, _)| existing < priority)
            .unwrap_or(self.pending.len());
        self.pending.insert(pos, (priority, id));
    }

    fn remove_pending(&mut self, id: NodeId) -> bool {
        match self.pending.iter().position(|&(_, pending)| pending == id) {
            Some(pos) => {
                self.pending.remove(pos);
                true
            }
            None => false,
        }
    }
}
