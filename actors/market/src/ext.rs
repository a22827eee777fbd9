// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;

/// A piece CID wrapped the way the miner and expert fund actors expect it.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct CheckedCid {
    pub cid: Cid,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct BatchPieceCidParams {
    pub piece_cids: Vec<CheckedCid>,
}

impl BatchPieceCidParams {
    pub fn new<'a>(cids: impl IntoIterator<Item = &'a Cid>) -> Self {
        Self { piece_cids: cids.into_iter().map(|cid| CheckedCid { cid: *cid }).collect() }
    }
}

pub mod miner {
    use super::*;

    pub const CONTROL_ADDRESSES_METHOD: u64 = 2;
    pub const STORED_ANY_METHOD: u64 = 20;

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
    pub struct GetControlAddressesReturn {
        pub owner: Address,
        pub worker: Address,
        pub coinbase: Address,
        pub control_addresses: Vec<Address>,
    }
}

pub mod expertfund {
    use super::*;
    use fvm_shared::piece::PaddedPieceSize;

    pub const BATCH_CHECK_DATA_METHOD: u64 = 8;
    pub const BATCH_STORE_DATA_METHOD: u64 = 9;

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
    pub struct BatchCheckDataParams {
        pub checked_pieces: Vec<CheckedPiece>,
    }

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
    pub struct CheckedPiece {
        pub piece_cid: Cid,
        pub piece_size: PaddedPieceSize,
    }
}
