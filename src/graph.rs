/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt::Debug;
use std::hash::Hash;

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use smallvec::SmallVec;

use crate::datatype::AbstractDomain;
use crate::datatype::AbstractStore;
use crate::datatype::HashMapAbstractStore;
use crate::datatype::SemanticError;

pub const DEFAULT_GRAPH_SUCCS_NUM: usize = 4;

/// A directed edge between two program nodes, carrying the pure function
/// that lifts an abstract state from the post state of its source to the
/// entry contribution at its target.
pub trait Edge {
    type NodeId: Copy;
    type Domain: AbstractDomain;

    /// The node this edge leaves from.
    fn source(&self) -> Self::NodeId;

    /// Transform `state` as it crosses this edge.
    fn traverse(&self, state: &Self::Domain) -> Result<Self::Domain, SemanticError>;
}

/// Graph trait consumed by the fixpoint engine.
///
/// Clients can either maintain their own structure and implement this
/// trait, or use [`FlowGraph`] below. The graph must not change while a
/// fixpoint computation is running. At most one edge may connect a given
/// (source, target) pair.
///
/// The constant generic parameter S is an estimated number of adjacent
/// nodes that is just enough for most nodes. A larger/smaller value will
/// not cause incorrect results, it only affects performance.
// NOTE: due to the status of Rust const generics, we can not define
// S as an associated constant since it is part of the return type for
// method predecessors and successors.
pub trait Graph<const S: usize = DEFAULT_GRAPH_SUCCS_NUM> {
    type NodeId: Copy + Hash + Eq + Ord + Debug;
    type Domain: AbstractDomain;
    type Edge: Edge<NodeId = Self::NodeId, Domain = Self::Domain>;
    type Store: AbstractStore<Self::NodeId, Domain = Self::Domain>;

    /// All nodes of the graph.
    fn nodes(&self) -> Vec<Self::NodeId>;

    /// Whether n is a node of this graph.
    fn contains_node(&self, n: Self::NodeId) -> bool;

    /// Predecessors of n.
    fn predecessors(&self, n: Self::NodeId) -> SmallVec<[Self::NodeId; S]>;

    /// Successors of n.
    fn successors(&self, n: Self::NodeId) -> SmallVec<[Self::NodeId; S]>;

    /// The edge going from src to dst, if any.
    fn edge_connecting(&self, src: Self::NodeId, dst: Self::NodeId) -> Option<&Self::Edge>;

    /// Produce a fresh store for the intermediate results computed while
    /// evaluating a node entered with `entry_state`.
    fn make_internal_store(&self, entry_state: &Self::Domain) -> Self::Store;
}

/// An edge of a [`FlowGraph`]: the source node plus a boxed traversal
/// function supplied when the edge is added.
pub struct FlowEdge<N, D> {
    source: N,
    traverse: Box<dyn Fn(&D) -> Result<D, SemanticError>>,
}

impl<N: Copy, D: AbstractDomain> Edge for FlowEdge<N, D> {
    type NodeId = N;
    type Domain = D;

    fn source(&self) -> N {
        self.source
    }

    fn traverse(&self, state: &D) -> Result<D, SemanticError> {
        (self.traverse)(state)
    }
}

/// A ready-made adjacency structure for clients that don't want to
/// implement [`Graph`] themselves.
///
/// Backed by a directed graph map, which also enforces that no two edges
/// share the same (source, target) pair; self loops are allowed. Uses
/// [`HashMapAbstractStore`] for intermediate results.
pub struct FlowGraph<N: Copy + Hash + Eq + Ord, D> {
    graph: DiGraphMap<N, FlowEdge<N, D>>,
}

impl<N, D> Default for FlowGraph<N, D>
where
    N: Copy + Hash + Eq + Ord + Debug,
    D: AbstractDomain,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N, D> FlowGraph<N, D>
where
    N: Copy + Hash + Eq + Ord + Debug,
    D: AbstractDomain,
{
    pub fn new() -> Self {
        Self {
            graph: DiGraphMap::new(),
        }
    }

    pub fn add_node(&mut self, n: N) -> N {
        self.graph.add_node(n)
    }

    /// Connect `source` to `target` with the given traversal function,
    /// replacing any previous edge between the two.
    pub fn add_edge(
        &mut self,
        source: N,
        target: N,
        traverse: impl Fn(&D) -> Result<D, SemanticError> + 'static,
    ) {
        self.graph.add_edge(
            source,
            target,
            FlowEdge {
                source,
                traverse: Box::new(traverse),
            },
        );
    }

    /// Connect `source` to `target` with an edge that propagates states
    /// unchanged.
    pub fn add_identity_edge(&mut self, source: N, target: N) {
        self.add_edge(source, target, |state: &D| Ok(state.clone()));
    }
}

impl<N, D> Graph for FlowGraph<N, D>
where
    N: Copy + Hash + Eq + Ord + Debug,
    D: AbstractDomain,
{
    type NodeId = N;
    type Domain = D;
    type Edge = FlowEdge<N, D>;
    type Store = HashMapAbstractStore<N, D>;

    fn nodes(&self) -> Vec<N> {
        self.graph.nodes().collect()
    }

    fn contains_node(&self, n: N) -> bool {
        self.graph.contains_node(n)
    }

    fn predecessors(&self, n: N) -> SmallVec<[N; DEFAULT_GRAPH_SUCCS_NUM]> {
        self.graph.neighbors_directed(n, Direction::Incoming).collect()
    }

    fn successors(&self, n: N) -> SmallVec<[N; DEFAULT_GRAPH_SUCCS_NUM]> {
        self.graph.neighbors_directed(n, Direction::Outgoing).collect()
    }

    fn edge_connecting(&self, src: N, dst: N) -> Option<&FlowEdge<N, D>> {
        self.graph.edge_weight(src, dst)
    }

    fn make_internal_store(&self, _entry_state: &D) -> HashMapAbstractStore<N, D> {
        HashMapAbstractStore::new()
    }
}
