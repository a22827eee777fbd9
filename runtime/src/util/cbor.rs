// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::to_vec;
use serde::{de, ser};

use crate::ActorError;

/// Serializes a structure as a CBOR vector of bytes, returning a serialization error on failure.
/// `desc` is a noun phrase for the object being serialized, included in any error message.
pub fn serialize_vec<T>(value: &T, desc: &str) -> Result<Vec<u8>, ActorError>
where
    T: ser::Serialize + ?Sized,
{
    to_vec(value)
        .map_err(|e| ActorError::serialization(format!("failed to serialize {}: {}", desc, e)))
}

/// Decodes the return block of a send, failing if the callee returned nothing.
pub fn deserialize_block<O>(ret: Option<IpldBlock>, desc: &str) -> Result<O, ActorError>
where
    O: de::DeserializeOwned,
{
    ret.ok_or_else(|| ActorError::serialization(format!("missing return value for {}", desc)))?
        .deserialize()
        .map_err(|e| ActorError::serialization(format!("failed to deserialize {}: {}", desc, e)))
}
