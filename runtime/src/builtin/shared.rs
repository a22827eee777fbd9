// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::MethodNum;
use num_traits::Zero;

use crate::runtime::Runtime;
use crate::{ActorError, GOVERN_ACTOR_ADDR};

pub const HAMT_BIT_WIDTH: u32 = 5;

/// Method number of `ValidateGranted` on the govern actor.
pub const GOVERN_VALIDATE_GRANTED_METHOD: MethodNum = 4;

/// Asks the govern actor whether `caller` holds the privilege for `method`
/// of the actor sending the query.
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct ValidateGrantedParams {
    pub caller: Address,
    pub method: MethodNum,
}

/// Checks with the govern actor that `caller` was granted `method` on the executing actor.
/// A refusal surfaces as forbidden "method not granted"; other failures keep the
/// callee's exit code.
pub fn validate_caller_granted(
    rt: &mut impl Runtime,
    caller: &Address,
    method: MethodNum,
) -> Result<(), ActorError> {
    let params = ValidateGrantedParams { caller: *caller, method };
    rt.send(
        &GOVERN_ACTOR_ADDR,
        GOVERN_VALIDATE_GRANTED_METHOD,
        IpldBlock::serialize_cbor(&params)?,
        TokenAmount::zero(),
    )
    .map_err(|e| {
        if e.exit_code() == ExitCode::USR_FORBIDDEN {
            e.wrap("method not granted")
        } else {
            e.wrap("failed to validate caller granted")
        }
    })?;
    Ok(())
}
