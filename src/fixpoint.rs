/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;
use std::fmt::Debug;

use crate::datatype::AbstractDomain;
use crate::datatype::AbstractStore;
use crate::datatype::SemanticError;
use crate::graph::Graph;
use crate::worklist::WorkingSet;

/// The abstract transfer function of a single node.
///
/// `compute` receives the node, its entry state, the call-graph oracle used
/// to resolve cross-graph queries (opaque to the engine), and a fresh
/// intermediate store it may populate with states for the inner nodes of
/// the current node. It returns the node's post state.
///
/// Implementations may keep external caches, but must be deterministic:
/// identical (node, entry state) inputs must produce identical outputs and
/// store populations. They must not mutate the graph or the call graph.
pub trait SemanticFunction<N, D, F, C> {
    fn compute(
        &mut self,
        node: N,
        entry_state: &D,
        call_graph: &C,
        intermediate: &mut F,
    ) -> Result<D, SemanticError>;
}

/// Error aborting a fixpoint computation. Every variant names the node
/// being processed when the failure occurred; no partial result survives.
#[derive(Debug, thiserror::Error)]
pub enum FixpointError {
    /// The working set yielded a node that is not part of the graph, or no
    /// node at all while claiming not to be empty.
    #[error("working set yielded node {node}, which is not in the graph")]
    UnknownNode { node: String },
    /// The current node has no starting state and no predecessor with a
    /// computed result to derive an entry state from.
    #[error("no entry state can be computed for node {node}")]
    MissingEntryState { node: String },
    /// The client transfer function signaled a computation failure.
    #[error("semantics computation failed for node {node}")]
    TransferFailure {
        node: String,
        #[source]
        source: SemanticError,
    },
    /// Joining the edge-transformed predecessor states failed.
    #[error("computation of the entry state of node {node} failed")]
    EntryComputationFailure {
        node: String,
        #[source]
        source: SemanticError,
    },
    /// Lub or widening between the stored and the freshly computed values
    /// failed.
    #[error("combination of old and new results for node {node} failed")]
    CombinationFailure {
        node: String,
        #[source]
        source: SemanticError,
    },
    /// Any other failure during the iteration.
    #[error("unexpected failure while processing node {node}: {message}")]
    UnexpectedFailure { node: String, message: String },
}

fn fmt_node<N: Debug>(node: &N) -> String {
    format!("{node:?}")
}

/// The (post state, intermediate store) pair tracked for each processed
/// node. The pair is the unit of storage: neither half is ever stored
/// without the other.
struct NodeResult<D, F> {
    post: D,
    intermediate: F,
}

/// A worklist-driven fixpoint computation over a single graph.
///
/// Starting from a set of entry nodes with prescribed entry states, the
/// engine repeatedly pops a pending node, joins the edge-transformed post
/// states of its predecessors into an entry state, applies the node's
/// transfer function, and combines the outcome with the previously stored
/// result; when the stored result grows, every successor is re-enqueued.
/// Combination uses lub until a per-node budget of `widen_after` lubs per
/// incoming edge is exhausted, and widening from then on, which bounds the
/// iteration on any ascending chain the domain's widening stabilizes.
///
/// All bookkeeping lives in the single `fixpoint` call; the engine itself
/// only borrows the graph and records the widening threshold.
pub struct Fixpoint<'g, G: Graph> {
    graph: &'g G,
    widen_after: u32,
}

impl<'g, G> Fixpoint<'g, G>
where
    G: Graph,
{
    /// Create an engine for `graph`. `widen_after` is the number of lub
    /// iterations granted per incoming edge of a node before the engine
    /// switches to widening; zero disables widening entirely.
    pub fn new(graph: &'g G, widen_after: u32) -> Self {
        Self { graph, widen_after }
    }

    /// Run the computation from `starting_points` and return the least
    /// fixpoint approximation reached for every node, with the
    /// intermediate results of inner nodes flattened in.
    pub fn fixpoint<C, T, W>(
        &self,
        starting_points: HashMap<G::NodeId, G::Domain>,
        call_graph: &C,
        working_set: &mut W,
        semantics: &mut T,
    ) -> Result<HashMap<G::NodeId, G::Domain>, FixpointError>
    where
        T: SemanticFunction<G::NodeId, G::Domain, G::Store, C>,
        W: WorkingSet<G::NodeId>,
    {
        let mut result: HashMap<G::NodeId, NodeResult<G::Domain, G::Store>> = HashMap::new();
        let mut lub_budgets: HashMap<G::NodeId, u32> = HashMap::new();

        // Seed in node order so that a deterministic working set yields a
        // deterministic computation.
        let mut seeds: Vec<G::NodeId> = starting_points.keys().copied().collect();
        seeds.sort_unstable();
        for node in seeds {
            working_set.push(node);
        }

        while !working_set.is_empty() {
            let node = match working_set.pop() {
                Some(node) => node,
                None => {
                    return Err(FixpointError::UnknownNode {
                        node: "<none>".to_owned(),
                    });
                }
            };
            if !self.graph.contains_node(node) {
                return Err(FixpointError::UnknownNode {
                    node: fmt_node(&node),
                });
            }
            log::trace!(target: "fixpoint", "processing node {:?}", node);
            self.process(
                node,
                &starting_points,
                call_graph,
                working_set,
                semantics,
                &mut result,
                &mut lub_budgets,
            )?;
        }

        Ok(Self::flatten(result))
    }

    #[allow(clippy::too_many_arguments)]
    fn process<C, T, W>(
        &self,
        node: G::NodeId,
        starting_points: &HashMap<G::NodeId, G::Domain>,
        call_graph: &C,
        working_set: &mut W,
        semantics: &mut T,
        result: &mut HashMap<G::NodeId, NodeResult<G::Domain, G::Store>>,
        lub_budgets: &mut HashMap<G::NodeId, u32>,
    ) -> Result<(), FixpointError>
    where
        T: SemanticFunction<G::NodeId, G::Domain, G::Store, C>,
        W: WorkingSet<G::NodeId>,
    {
        let predecessors = self.graph.predecessors(node);
        let entry_state = self.entry_state(node, &predecessors, starting_points, result)?;

        let mut intermediate = self.graph.make_internal_store(&entry_state);
        let new_post = semantics
            .compute(node, &entry_state, call_graph, &mut intermediate)
            .map_err(|source| FixpointError::TransferFailure {
                node: fmt_node(&node),
                source,
            })?;

        let update = match result.get(&node) {
            None => Some(NodeResult {
                post: new_post,
                intermediate,
            }),
            Some(old) => self.combine(
                node,
                predecessors.len(),
                old,
                new_post,
                intermediate,
                lub_budgets,
            )?,
        };

        match update {
            Some(combined) => {
                result.insert(node, combined);
                for successor in self.graph.successors(node) {
                    working_set.push(successor);
                }
            }
            None => {
                log::trace!(target: "fixpoint", "node {:?} did not grow", node);
            }
        }
        Ok(())
    }

    /// Join the seed for `node` (if any) with the edge-transformed post
    /// states of every predecessor that already has a stored result.
    fn entry_state(
        &self,
        node: G::NodeId,
        predecessors: &[G::NodeId],
        starting_points: &HashMap<G::NodeId, G::Domain>,
        result: &HashMap<G::NodeId, NodeResult<G::Domain, G::Store>>,
    ) -> Result<G::Domain, FixpointError> {
        use crate::graph::Edge;

        let mut entry = starting_points.get(&node).cloned();
        for &pred in predecessors {
            let stored = match result.get(&pred) {
                Some(stored) => stored,
                None => continue,
            };
            let edge = self.graph.edge_connecting(pred, node).ok_or_else(|| {
                FixpointError::UnexpectedFailure {
                    node: fmt_node(&node),
                    message: format!("no edge connecting predecessor {pred:?}"),
                }
            })?;
            debug_assert_eq!(edge.source(), pred);
            let contribution =
                edge.traverse(&stored.post)
                    .map_err(|source| FixpointError::EntryComputationFailure {
                        node: fmt_node(&node),
                        source,
                    })?;
            entry = Some(match entry {
                Some(acc) => {
                    acc.lub(&contribution)
                        .map_err(|source| FixpointError::EntryComputationFailure {
                            node: fmt_node(&node),
                            source,
                        })?
                }
                None => contribution,
            });
        }

        entry.ok_or_else(|| FixpointError::MissingEntryState {
            node: fmt_node(&node),
        })
    }

    /// Combine the freshly computed pair with the stored one. Returns the
    /// grown pair to store, or `None` when the node has converged.
    fn combine(
        &self,
        node: G::NodeId,
        predecessors: usize,
        old: &NodeResult<G::Domain, G::Store>,
        new_post: G::Domain,
        new_intermediate: G::Store,
        lub_budgets: &mut HashMap<G::NodeId, u32>,
    ) -> Result<Option<NodeResult<G::Domain, G::Store>>, FixpointError> {
        let widen = self.widen_after > 0 && {
            // The lub budget is `widen_after` per incoming edge; a node
            // with no predecessors widens on its first revisit.
            let budget = lub_budgets
                .entry(node)
                .or_insert_with(|| self.widen_after.saturating_mul(predecessors as u32));
            if *budget > 0 {
                *budget -= 1;
                false
            } else {
                true
            }
        };

        let combination_failure = |source| FixpointError::CombinationFailure {
            node: fmt_node(&node),
            source,
        };
        let (post, intermediate) = if widen {
            log::debug!(target: "fixpoint", "widening node {:?}", node);
            (
                old.post.widening(&new_post).map_err(combination_failure)?,
                old.intermediate
                    .widening(&new_intermediate)
                    .map_err(combination_failure)?,
            )
        } else {
            (
                new_post.lub(&old.post).map_err(combination_failure)?,
                new_intermediate
                    .lub(&old.intermediate)
                    .map_err(combination_failure)?,
            )
        };

        if post.leq(&old.post) && intermediate.leq(&old.intermediate) {
            Ok(None)
        } else {
            Ok(Some(NodeResult { post, intermediate }))
        }
    }

    /// Flatten the per-node pairs into a single mapping holding the post
    /// state of every outer node and the state of every inner node found
    /// in an intermediate store. The two key sets are disjoint within a
    /// well-formed graph.
    fn flatten(
        result: HashMap<G::NodeId, NodeResult<G::Domain, G::Store>>,
    ) -> HashMap<G::NodeId, G::Domain> {
        let mut flat = HashMap::with_capacity(result.len());
        for (node, stored) in result {
            for (inner, state) in stored.intermediate.states() {
                flat.insert(*inner, state.clone());
            }
            flat.insert(node, stored.post);
        }
        flat
    }
}
