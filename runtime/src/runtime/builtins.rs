// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;

use cid::Cid;
use lazy_static::lazy_static;
use multihash::Multihash;
use num_derive::FromPrimitive;

/// Codec of builtin actor code CIDs.
const RAW: u64 = 0x55;
/// Identity multihash code: the digest is the actor name itself.
const IDENTITY: u64 = 0x00;

/// Identifies the builtin actor types. The discriminants are stable and index the
/// code CID registry.
#[derive(PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash, FromPrimitive, Debug)]
#[repr(i32)]
pub enum Type {
    System = 1,
    Init = 2,
    Cron = 3,
    Account = 4,
    Power = 5,
    Miner = 6,
    Market = 7,
    PaymentChannel = 8,
    Multisig = 9,
    Reward = 10,
    Govern = 11,
    Expert = 12,
    ExpertFund = 13,
    Vote = 14,
    Retrieval = 15,
    Knowledge = 16,
}

impl Type {
    pub const ALL: [Type; 16] = [
        Type::System,
        Type::Init,
        Type::Cron,
        Type::Account,
        Type::Power,
        Type::Miner,
        Type::Market,
        Type::PaymentChannel,
        Type::Multisig,
        Type::Reward,
        Type::Govern,
        Type::Expert,
        Type::ExpertFund,
        Type::Vote,
        Type::Retrieval,
        Type::Knowledge,
    ];

    pub fn name(&self) -> &'static str {
        match *self {
            Type::System => "system",
            Type::Init => "init",
            Type::Cron => "cron",
            Type::Account => "account",
            Type::Power => "storagepower",
            Type::Miner => "storageminer",
            Type::Market => "storagemarket",
            Type::PaymentChannel => "paymentchannel",
            Type::Multisig => "multisig",
            Type::Reward => "reward",
            Type::Govern => "govern",
            Type::Expert => "expert",
            Type::ExpertFund => "expertfund",
            Type::Vote => "vote",
            Type::Retrieval => "retrieval",
            Type::Knowledge => "knowledge",
        }
    }

    /// Whether actors of this type can represent an external signing party.
    pub fn is_principal(&self) -> bool {
        matches!(self, Type::Account | Type::Multisig)
    }

    /// The code CID registered for this type.
    pub fn code_cid(&self) -> Cid {
        REGISTRY.codes[*self as usize - 1]
    }

    /// Looks up the builtin type of a code CID.
    pub fn from_code(code: &Cid) -> Option<Type> {
        REGISTRY.types.get(code).copied()
    }
}

/// Immutable mapping between builtin actor types and their code CIDs.
struct Registry {
    /// Indexed by `Type as usize - 1`.
    codes: Vec<Cid>,
    types: HashMap<Cid, Type>,
}

impl Registry {
    fn new() -> Self {
        let codes: Vec<Cid> = Type::ALL.iter().map(|t| builtin_code_cid(t.name())).collect();
        let types = Type::ALL.iter().zip(codes.iter()).map(|(t, c)| (*c, *t)).collect();
        Registry { codes, types }
    }
}

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

fn builtin_code_cid(name: &str) -> Cid {
    let id = format!("epk/1/{}", name);
    // Every builtin name is far shorter than the 64 byte digest limit.
    let hash = Multihash::wrap(IDENTITY, id.as_bytes())
        .expect("builtin actor name exceeds identity digest size");
    Cid::new_v1(RAW, hash)
}

/// Actor types that can represent external signing parties.
pub const CALLER_TYPES_SIGNABLE: &[Type] = &[Type::Account, Type::Multisig];

/// Actor types whose methods may be gated by the govern actor.
pub const CALLER_TYPES_GOVERNED: &[Type] = &[
    Type::Power,
    Type::Miner,
    Type::Market,
    Type::Expert,
    Type::ExpertFund,
    Type::Vote,
    Type::Retrieval,
    Type::Knowledge,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_cids_round_trip_through_registry() {
        for t in Type::ALL {
            let code = t.code_cid();
            assert_eq!(Some(t), Type::from_code(&code));
            assert_eq!(RAW, code.codec());
            assert_eq!(format!("epk/1/{}", t.name()).as_bytes(), code.hash().digest());
        }
    }

    #[test]
    fn unknown_code_is_not_builtin() {
        let other = builtin_code_cid("chaos");
        assert_eq!(None, Type::from_code(&other));
    }

    #[test]
    fn signable_types_are_principals() {
        for t in Type::ALL {
            assert_eq!(CALLER_TYPES_SIGNABLE.contains(&t), t.is_principal());
        }
        assert!(!CALLER_TYPES_GOVERNED.iter().any(|t| t.is_principal()));
    }
}
