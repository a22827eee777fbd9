// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::MethodNum;

/// Methods of one actor code that a governor may call.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct Authority {
    pub actor_code_id: Cid,
    pub methods: Vec<MethodNum>,
}

/// An empty `authorities` list means every governed method of every governed actor.
/// An authority with no methods means every governed method of that actor.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct GrantOrRevokeParams {
    pub governor: Address,
    pub authorities: Vec<Authority>,
}
