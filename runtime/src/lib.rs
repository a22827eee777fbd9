// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Runtime interface, error type and shared state adapters used by the EpiK builtin actors.

pub use self::actor_error::*;
pub use self::builtin::*;
pub use self::dispatch::*;
pub use self::runtime::*;
pub use self::util::*;

pub mod actor_error;
pub mod builtin;
pub mod dispatch;
pub mod runtime;
pub mod util;

#[cfg(feature = "test_utils")]
pub mod test_utils;

/// Hash function used by every HAMT in actor state.
pub type Hasher = fvm_ipld_hamt::Sha256;
