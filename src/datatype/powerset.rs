/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::hash::Hash;

use im::HashSet;

use crate::datatype::AbstractDomain;
use crate::datatype::SemanticError;

/// A powerset domain over the possible dataflow elements reaching a program
/// point: bottom is the empty set, lub is set union, and the order is set
/// inclusion. Widening gives up and jumps to `Top` as soon as the new value
/// is not contained in the old one, which bounds every ascending chain.
///
/// This is the prototypical "possible elements" dataflow lattice; it also
/// powers most of the crate's test suite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PowersetDomain<E: Clone + Eq + Hash> {
    Top,
    Value(HashSet<E>),
}

impl<E: Clone + Eq + Hash> PowersetDomain<E> {
    pub fn bottom() -> Self {
        Self::Value(HashSet::new())
    }

    pub fn top() -> Self {
        Self::Top
    }

    pub fn value_from_iter(elements: impl IntoIterator<Item = E>) -> Self {
        Self::Value(elements.into_iter().collect())
    }

    pub fn is_top(&self) -> bool {
        matches!(self, Self::Top)
    }

    pub fn add_element(&mut self, e: E) {
        if let Self::Value(set) = self {
            set.insert(e);
        }
    }

    pub fn remove_element(&mut self, e: &E) {
        if let Self::Value(set) = self {
            set.remove(e);
        }
    }

    pub fn contains(&self, e: &E) -> bool {
        match self {
            Self::Top => true,
            Self::Value(set) => set.contains(e),
        }
    }

    /// The elements of the underlying set. `Top` has no enumerable
    /// elements, so it yields nothing, like bottom.
    pub fn elements(&self) -> impl Iterator<Item = &E> {
        // NOTE: routing through Option lets both arms share one concrete
        // iterator type.
        let set = match self {
            Self::Value(set) => Some(set),
            Self::Top => None,
        };
        set.into_iter().flatten()
    }
}

impl<E: Clone + Eq + Hash> AbstractDomain for PowersetDomain<E> {
    fn lub(&self, rhs: &Self) -> Result<Self, SemanticError> {
        match (self, rhs) {
            (Self::Top, _) | (_, Self::Top) => Ok(Self::Top),
            (Self::Value(lset), Self::Value(rset)) => {
                let mut union = lset.clone();
                for e in rset {
                    union.insert(e.clone());
                }
                Ok(Self::Value(union))
            }
        }
    }

    fn widening(&self, rhs: &Self) -> Result<Self, SemanticError> {
        match (self, rhs) {
            (Self::Top, _) | (_, Self::Top) => Ok(Self::Top),
            (Self::Value(lset), Self::Value(rset)) => {
                if rset.is_subset(lset) {
                    Ok(self.clone())
                } else {
                    Ok(Self::Top)
                }
            }
        }
    }

    fn leq(&self, rhs: &Self) -> bool {
        match (self, rhs) {
            (_, Self::Top) => true,
            (Self::Top, _) => false,
            (Self::Value(lset), Self::Value(rset)) => lset.is_subset(rset),
        }
    }

    fn is_bottom(&self) -> bool {
        match self {
            Self::Top => false,
            Self::Value(set) => set.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lub_is_union() {
        let a = PowersetDomain::value_from_iter([1, 2]);
        let b = PowersetDomain::value_from_iter([2, 3]);
        let lub = a.lub(&b).unwrap();
        assert_eq!(lub, PowersetDomain::value_from_iter([1, 2, 3]));
        assert!(a.leq(&lub));
        assert!(b.leq(&lub));
    }

    #[test]
    fn test_widening_jumps_to_top_on_growth() {
        let old = PowersetDomain::value_from_iter([1, 2]);
        let shrunk = PowersetDomain::value_from_iter([1]);
        let grown = PowersetDomain::value_from_iter([1, 2, 3]);
        assert_eq!(old.widening(&shrunk).unwrap(), old);
        assert_eq!(old.widening(&grown).unwrap(), PowersetDomain::Top);
    }

    #[test]
    fn test_bottom_and_top_ordering() {
        let bottom = PowersetDomain::<u32>::bottom();
        let top = PowersetDomain::<u32>::top();
        let value = PowersetDomain::value_from_iter([7]);
        assert!(bottom.is_bottom());
        assert!(!value.is_bottom());
        assert!(bottom.leq(&value));
        assert!(value.leq(&top));
        assert!(!top.leq(&value));
    }
}
