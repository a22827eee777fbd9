// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::{BTreeMap, BTreeSet};

use cid::Cid;
use fvm_shared::MethodNum;
use lazy_static::lazy_static;

use epik_actors_runtime::runtime::Type;

pub mod market {
    use super::MethodNum;

    pub const RESET_QUOTAS_METHOD: MethodNum = 8;
    pub const SET_INITIAL_QUOTA_METHOD: MethodNum = 9;
}

/// Privileged methods, keyed by the code of the actor exposing them.
pub type GovernedMethods = BTreeMap<Cid, BTreeSet<MethodNum>>;

lazy_static! {
    static ref GOVERNED_ACTORS: GovernedMethods = BTreeMap::from([(
        Type::Market.code_cid(),
        BTreeSet::from([market::RESET_QUOTAS_METHOD, market::SET_INITIAL_QUOTA_METHOD]),
    )]);
}

/// Every method whose callers must be granted by the govern actor.
pub fn governed_actors() -> &'static GovernedMethods {
    &GOVERNED_ACTORS
}
