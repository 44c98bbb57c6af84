//! Bounded search for a plan of moves restoring spare capacity.

use std::collections::{BTreeSet, HashSet, VecDeque};

use fleet_id::ApplicationId;
use tracing::debug;

use super::fleet::{Fleet, Move};

/// An ordered list of moves; later moves may depend on earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    moves: Vec<Move>,
}

impl Plan {
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Applications redeployed by this plan, in order of first appearance.
    pub fn applications(&self) -> Vec<&ApplicationId> {
        let mut seen = BTreeSet::new();
        self.moves
            .iter()
            .map(Move::application)
            .filter(|application| seen.insert(*application))
            .collect()
    }

    fn with(&self, mv: Move) -> Plan {
        let mut moves = self.moves.clone();
        moves.push(mv);
        Plan { moves }
    }
}

/// Result of a spare capacity search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// A plan reaching the spare target.
    Found(Plan),
    /// Every reachable plan was explored without reaching the target.
    NotFound,
    /// The iteration budget ran out first.
    BudgetExceeded,
}

/// Breadth-first search over plans.
///
/// Plans leading to fleets with the same [`Fleet::signature`] are explored
/// once, so the order of independent moves and the choice between equal
/// hosts do not multiply the frontier. The iteration budget is shared by every search run on one solver, so a
/// maintenance cycle that searches again after a failed move does not get
/// a fresh budget.
#[derive(Debug)]
pub struct CapacitySolver {
    spare_target: usize,
    max_iterations: usize,
    iterations: usize,
}

impl CapacitySolver {
    pub fn new(spare_target: usize, max_iterations: usize) -> Self {
        Self {
            spare_target,
            max_iterations,
            iterations: 0,
        }
    }

    /// Plans explored so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Find the shortest plan giving `fleet` at least the target number of
    /// spare hosts without moving nodes of `excluded` applications.
    pub fn search(&mut self, fleet: &Fleet, excluded: &BTreeSet<ApplicationId>) -> SearchOutcome {
        let mut seen = HashSet::from([fleet.signature()]);
        let mut frontier = VecDeque::from([(Plan::default(), fleet.clone())]);

        while let Some((plan, state)) = frontier.pop_front() {
            if self.iterations >= self.max_iterations {
                debug!(
                    iterations = self.iterations,
                    frontier = frontier.len() + 1,
                    "Spare capacity search budget exceeded"
                );
                return SearchOutcome::BudgetExceeded;
            }
            self.iterations += 1;

            if !plan.is_empty() && state.spare_host_count() >= self.spare_target {
                debug!(
                    iterations = self.iterations,
                    moves = plan.len(),
                    "Found spare capacity plan"
                );
                return SearchOutcome::Found(plan);
            }

            for mv in state.candidate_moves(excluded) {
                let moved = state.apply(&mv);
                if seen.insert(moved.signature()) {
                    frontier.push_back((plan.with(mv), moved));
                }
            }
        }

        debug!(iterations = self.iterations, "No spare capacity plan exists");
        SearchOutcome::NotFound
    }
}
