/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

mod abstract_domain;
mod abstract_store;
mod powerset;

pub use abstract_domain::*;
pub use abstract_store::*;
pub use powerset::*;
