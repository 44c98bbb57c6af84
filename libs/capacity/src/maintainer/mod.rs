//! Spare host capacity maintenance.
//!
//! The maintainer is responsible for:
//! - Counting how many host failures the fleet can absorb
//! - Searching for the shortest plan of moves restoring the target count
//! - Retiring the nodes of each planned move and redeploying their
//!   application, which relocates them through the ordinary deploy path
//!
//! Search runs on an immutable snapshot without holding any lock. Only
//! committing a move takes the lock of the application being moved.

mod deployment;
mod fleet;
mod solver;

use std::collections::BTreeSet;
use std::sync::Arc;

use fleet_id::ApplicationId;
use tracing::{debug, info, instrument, warn};

pub use deployment::MaintenanceDeployment;
pub use fleet::{ClusterKey, Fleet, FleetSignature, Move};
pub use solver::{CapacitySolver, Plan, SearchOutcome};

use crate::capacity::HostCapacity;
use crate::config::MaintainerConfig;
use crate::deployer::Deployer;
use crate::metric::{Metric, OVERCOMMITTED_HOSTS, SPARE_HOST_CAPACITY};
use crate::repository::NodeRepository;

/// How a maintenance cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceOutcome {
    /// The fleet already had enough spare hosts.
    Sufficient,
    /// A plan was found and its first `committed` of `planned` moves were
    /// committed or already in progress.
    Executed { planned: usize, committed: usize },
    /// No plan reaches the target.
    NotFound,
    /// The search budget ran out before a plan was found.
    BudgetExceeded,
}

/// Result of one maintenance cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceStats {
    /// Spare hosts the fleet is expected to have once committed moves complete.
    pub spare_host_capacity: usize,
    pub overcommitted_hosts: usize,
    pub outcome: MaintenanceOutcome,
    /// Successful redeployments.
    pub redeployments: usize,
    /// Nodes newly marked as retired.
    pub retired_nodes: usize,
}

enum Execution {
    /// The first move could not be started for this application.
    Blocked(ApplicationId),
    /// A prefix of the plan was committed, leaving the fleet in this state.
    Committed { fleet: Fleet, moves: usize },
}

/// Keeps enough free capacity in the fleet to absorb host failures.
pub struct SpareCapacityMaintainer {
    repository: Arc<NodeRepository>,
    deployer: Arc<dyn Deployer>,
    metric: Arc<dyn Metric>,
    config: MaintainerConfig,
}

impl SpareCapacityMaintainer {
    pub fn new(
        repository: Arc<NodeRepository>,
        deployer: Arc<dyn Deployer>,
        metric: Arc<dyn Metric>,
        config: MaintainerConfig,
    ) -> Self {
        Self {
            repository,
            deployer,
            metric,
            config,
        }
    }

    pub fn config(&self) -> &MaintainerConfig {
        &self.config
    }

    /// Run one maintenance cycle.
    #[instrument(skip(self))]
    pub async fn maintain(&self) -> MaintenanceStats {
        let nodes = self.repository.list();

        let overcommitted = HostCapacity::new(&nodes).overcommitted_hosts();
        if !overcommitted.is_empty() {
            let hosts: Vec<_> = overcommitted.iter().map(|h| h.as_str()).collect();
            warn!(hosts = ?hosts, "Hosts are overcommitted");
        }
        self.metric.set(OVERCOMMITTED_HOSTS, overcommitted.len() as f64);

        let fleet = Fleet::from_snapshot(&nodes);
        let spares = fleet.spare_host_count();
        let mut stats = MaintenanceStats {
            spare_host_capacity: spares,
            overcommitted_hosts: overcommitted.len(),
            outcome: MaintenanceOutcome::Sufficient,
            redeployments: 0,
            retired_nodes: 0,
        };

        if spares >= self.config.spare_target {
            debug!(spares, target = self.config.spare_target, "Enough spare capacity");
            self.metric.set(SPARE_HOST_CAPACITY, spares as f64);
            return stats;
        }

        let mut solver = CapacitySolver::new(self.config.spare_target, self.config.max_iterations);
        let mut excluded = BTreeSet::new();
        let outcome = loop {
            let plan = match solver.search(&fleet, &excluded) {
                SearchOutcome::Found(plan) => plan,
                SearchOutcome::NotFound => break MaintenanceOutcome::NotFound,
                SearchOutcome::BudgetExceeded => break MaintenanceOutcome::BudgetExceeded,
            };

            match self.execute(&fleet, &plan, &mut stats).await {
                Execution::Blocked(application) => {
                    debug!(application = %application, "Excluding application from spare capacity plans");
                    excluded.insert(application);
                }
                Execution::Committed { fleet, moves } => {
                    stats.spare_host_capacity = fleet.spare_host_count();
                    break MaintenanceOutcome::Executed {
                        planned: plan.len(),
                        committed: moves,
                    };
                }
            }
        };
        stats.outcome = outcome;

        self.metric.set(SPARE_HOST_CAPACITY, stats.spare_host_capacity as f64);
        info!(
            spares_before = spares,
            spares = stats.spare_host_capacity,
            target = self.config.spare_target,
            outcome = ?stats.outcome,
            iterations = solver.iterations(),
            redeployments = stats.redeployments,
            retired_nodes = stats.retired_nodes,
            "Spare capacity maintenance complete"
        );
        stats
    }

    /// Commit the moves of `plan` in order.
    ///
    /// Stops at the first move that cannot be started. If that is the first
    /// move, nothing was committed and the caller may search again without
    /// its application.
    async fn execute(&self, fleet: &Fleet, plan: &Plan, stats: &mut MaintenanceStats) -> Execution {
        let mut committed = fleet.clone();
        let mut moves = 0;

        for (position, mv) in plan.moves().iter().enumerate() {
            let nodes = self.repository.list();
            let in_progress = mv
                .nodes
                .iter()
                .all(|hostname| nodes.get(hostname).is_some_and(|node| node.is_retired()));
            if in_progress {
                debug!(step = %mv, "Move already in progress");
                committed = committed.apply(mv);
                moves += 1;
                continue;
            }

            let mut deployment = MaintenanceDeployment::new(
                mv.application(),
                &self.repository,
                self.deployer.as_ref(),
                self.metric.clone(),
                self.config.lock_timeout,
            )
            .await;

            if !deployment.is_valid() {
                info!(step = %mv, "Could not start {}", deployment);
                if position == 0 {
                    return Execution::Blocked(mv.application().clone());
                }
                break;
            }
            match deployment.retire(&self.repository, &mv.nodes) {
                Ok(count) => {
                    stats.retired_nodes += count;
                    info!(step = %mv, retired = count, "Retired nodes to free spare capacity");
                }
                Err(e) => {
                    warn!(step = %mv, error = %e, "Failed to retire nodes");
                    if position == 0 {
                        return Execution::Blocked(mv.application().clone());
                    }
                    break;
                }
            }

            committed = committed.apply(mv);
            moves += 1;
            if deployment.deploy().await {
                stats.redeployments += 1;
            }
        }

        Execution::Committed {
            fleet: committed,
            moves,
        }
    }
}
