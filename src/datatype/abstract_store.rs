/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::hash::Hash;

use crate::datatype::AbstractDomain;
use crate::datatype::SemanticError;

/*
 * An abstract store is a functional lattice: it maps the inner nodes of an
 * outer program node (e.g. the sub-expressions of a statement) to elements
 * of a common abstract domain. During the evaluation of a node, the transfer
 * function records in the store the abstract state computed for each inner
 * node it visits:
 *
 *   {x + 1 -> [0, 10], y * 2 -> [-4, 4], ...}
 *
 * The store is itself a lattice, ordered pointwise: a node that is not bound
 * carries the bottom state. The fixpoint engine merges and widens stores
 * exactly like post states, and at the end of a computation flattens every
 * binding into the final result map. Inner nodes are required to be disjoint
 * from outer nodes within a single graph, so the flattening cannot collide.
 */

/// A lattice-valued map from inner nodes to abstract states.
///
/// The three lattice operations obey the same laws as the corresponding
/// [`AbstractDomain`] operations.
pub trait AbstractStore<N>: Clone {
    type Domain: AbstractDomain;

    /// Pointwise least upper bound.
    fn lub(&self, rhs: &Self) -> Result<Self, SemanticError>;

    /// Pointwise widening, applied as `old.widening(new)`.
    fn widening(&self, rhs: &Self) -> Result<Self, SemanticError>;

    /// Pointwise partial order; a missing binding is bottom.
    fn leq(&self, rhs: &Self) -> bool;

    /// The state bound to `node`, if any.
    fn get(&self, node: &N) -> Option<&Self::Domain>;

    /// Bind `node` to `state`, replacing any previous binding.
    fn set(&mut self, node: N, state: Self::Domain);

    /// All (inner node, state) bindings, in no particular order.
    fn states<'a>(&'a self) -> impl Iterator<Item = (&'a N, &'a Self::Domain)>
    where
        N: 'a,
        Self::Domain: 'a;
}

/// An [`AbstractStore`] backed by a persistent hash map.
#[derive(Clone, Debug)]
pub struct HashMapAbstractStore<N: Clone + Eq + Hash, D: AbstractDomain> {
    states: im::HashMap<N, D>,
}

impl<N: Clone + Eq + Hash, D: AbstractDomain> Default for HashMapAbstractStore<N, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, D> HashMapAbstractStore<N, D>
where
    N: Clone + Eq + Hash,
    D: AbstractDomain,
{
    pub fn new() -> Self {
        Self {
            states: im::HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Pointwise merge: bindings present on both sides are combined with
    /// `op`, bindings present on one side only are kept as they are.
    fn merge_like_operation(
        &self,
        rhs: &Self,
        op: impl Fn(&D, &D) -> Result<D, SemanticError>,
    ) -> Result<Self, SemanticError> {
        let mut states = self.states.clone();
        for (node, rhs_state) in rhs.states.iter() {
            let merged = match self.states.get(node) {
                Some(lhs_state) => op(lhs_state, rhs_state)?,
                None => rhs_state.clone(),
            };
            states.insert(node.clone(), merged);
        }
        Ok(Self { states })
    }
}

impl<N, D> AbstractStore<N> for HashMapAbstractStore<N, D>
where
    N: Clone + Eq + Hash,
    D: AbstractDomain,
{
    type Domain = D;

    fn lub(&self, rhs: &Self) -> Result<Self, SemanticError> {
        self.merge_like_operation(rhs, |d1, d2| d1.lub(d2))
    }

    fn widening(&self, rhs: &Self) -> Result<Self, SemanticError> {
        self.merge_like_operation(rhs, |d1, d2| d1.widening(d2))
    }

    fn leq(&self, rhs: &Self) -> bool {
        self.states.iter().all(|(node, state)| match rhs.states.get(node) {
            Some(rhs_state) => state.leq(rhs_state),
            None => state.is_bottom(),
        })
    }

    fn get(&self, node: &N) -> Option<&D> {
        self.states.get(node)
    }

    fn set(&mut self, node: N, state: D) {
        self.states.insert(node, state);
    }

    fn states<'a>(&'a self) -> impl Iterator<Item = (&'a N, &'a D)>
    where
        N: 'a,
        D: 'a,
    {
        self.states.iter().map(|(node, state)| (node, state))
    }
}
