/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::error::Error;

/// A failure raised while evaluating abstract semantics: a lub or widening
/// that cannot be computed, or a transfer function giving up on a node.
///
/// Client domains construct these with [`SemanticError::new`], or with
/// [`SemanticError::with_source`] when wrapping a lower-level error.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SemanticError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl SemanticError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Element of an abstract domain: a lattice with a widening operator.
///
/// Laws the fixpoint engine relies on:
/// - `lub` is commutative, associative, and idempotent;
/// - `widening` is an upper bound of both operands, and any ascending chain
///   accelerated by it stabilizes after finitely many steps;
/// - `leq` is the partial order inducing both.
///
/// The operations are fallible so that domains built on top of external
/// oracles can surface computation failures instead of guessing.
pub trait AbstractDomain: Clone {
    /// Least upper bound of `self` and `rhs`.
    fn lub(&self, rhs: &Self) -> Result<Self, SemanticError>;

    /// Widening, applied as `old.widening(new)`.
    fn widening(&self, rhs: &Self) -> Result<Self, SemanticError>;

    /// Partial order test: `self` is less than or equal to `rhs`.
    fn leq(&self, rhs: &Self) -> bool;

    fn is_bottom(&self) -> bool;
}
