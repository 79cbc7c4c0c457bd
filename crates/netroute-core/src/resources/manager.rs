//! Resource manager actor
//!
//! One tokio task owns a [`ResourceScheduler`] and applies commands in the
//! order they arrive. Workers talk to it through a [`WorkerLink`]; dropping
//! the link unregisters the worker.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::core::config::ResourceConfig;
use crate::resources::arena::NodeId;
use crate::resources::scheduler::{ResourceGrant, ResourceScheduler};
use crate::resources::ResourceMode;
use crate::types::{Error, ResourceState, Result};
use crate::{log_debug, log_info};

enum ResourceCommand {
    Register {
        callback: mpsc::UnboundedSender<ResourceGrant>,
        priority: i32,
        reply: oneshot::Sender<NodeId>,
    },
    UpdatePriority {
        node: NodeId,
        priority: i32,
    },
    UpdateResources {
        node: NodeId,
        state: ResourceState,
    },
    Hangup {
        node: NodeId,
    },
    SetLimit {
        max_resource_limit: i64,
    },
    Stop,
}

/// Handle to a running resource manager
#[derive(Clone)]
pub struct ResourceManager {
    tx: mpsc::UnboundedSender<ResourceCommand>,
}

impl ResourceManager {
    /// Spawn a manager sharing `max_resource_limit` among its workers
    pub fn spawn(mode: ResourceMode, max_resource_limit: i64) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = ResourceScheduler::new(mode, max_resource_limit);
        let handle = tokio::spawn(run_manager(scheduler, rx));
        log_info!("ResourceManager started: {:?} mode, budget {}", mode, max_resource_limit);
        (Self { tx }, handle)
    }

    /// Spawn a manager from the resources section of the config
    pub fn from_config(config: &ResourceConfig) -> (Self, JoinHandle<()>) {
        Self::spawn(config.mode, config.max_resource_limit)
    }

    /// Register a worker. Grants arrive on `callback`.
    pub async fn register_worker(
        &self,
        callback: mpsc::UnboundedSender<ResourceGrant>,
        priority: i32,
    ) -> Result<WorkerLink> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ResourceCommand::Register { callback, priority, reply })
            .map_err(|_| Error::closed("ResourceManager"))?;
        let node = rx.await.map_err(|_| Error::closed("ResourceManager"))?;
        Ok(WorkerLink {
            node,
            tx: self.tx.clone(),
        })
    }

    /// Change the shared budget
    pub fn set_max_resource_limit(&self, max_resource_limit: i64) {
        let _ = self.tx.send(ResourceCommand::SetLimit { max_resource_limit });
    }

    /// Stop granting; the actor exits once every worker has gone
    pub fn stop(&self) {
        let _ = self.tx.send(ResourceCommand::Stop);
    }
}

async fn run_manager(
    mut scheduler: ResourceScheduler,
    mut rx: mpsc::UnboundedReceiver<ResourceCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            ResourceCommand::Register { callback, priority, reply } => {
                let node = scheduler.register_worker(callback, priority);
                if reply.send(node).is_err() {
                    // Registrant went away before learning its id.
                    scheduler.remove_worker(node);
                }
            }
            ResourceCommand::UpdatePriority { node, priority } => {
                scheduler.update_priority(node, priority);
            }
            ResourceCommand::UpdateResources { node, state } => {
                scheduler.update_resources(node, &state);
            }
            ResourceCommand::Hangup { node } => {
                scheduler.remove_worker(node);
            }
            ResourceCommand::SetLimit { max_resource_limit } => {
                scheduler.set_max_resource_limit(max_resource_limit);
            }
            ResourceCommand::Stop => {
                log_debug!("ResourceManager stopping with {} workers", scheduler.node_count());
                scheduler.stop();
            }
        }
        if scheduler.is_finished() {
            break;
        }
    }
    log_info!("ResourceManager stopped");
}

/// A worker's connection to the resource manager
///
/// Messages sent through the link are attributed to the worker's node.
/// Dropping the link removes the node and returns its budget.
pub struct WorkerLink {
    node: NodeId,
    tx: mpsc::UnboundedSender<ResourceCommand>,
}

impl WorkerLink {
    /// Node assigned to this worker
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Change this worker's priority
    pub fn update_priority(&self, priority: i32) {
        let _ = self.tx.send(ResourceCommand::UpdatePriority { node: self.node, priority });
    }

    /// Report usage and demand
    pub fn update_resources(&self, state: &ResourceState) {
        let _ = self.tx.send(ResourceCommand::UpdateResources { node: self.node, state: *state });
    }
}

impl Drop for WorkerLink {
    fn drop(&mut self) {
        let _ = self.tx.send(ResourceCommand::Hangup { node: self.node });
    }
}
