// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::piece::{PaddedPieceSize, PieceInfo};

/// DealProposal is the information a client and provider agree on for storing a piece.
/// There are no payments or collateral; retrieval incentives are handled elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct DealProposal {
    pub piece_cid: Cid,
    pub piece_size: PaddedPieceSize,
    pub client: Address,
    pub provider: Address,

    /// Arbitrary client chosen label to apply to the deal.
    pub label: String,

    /// Nominal start epoch. Deal activation must happen no later than this.
    pub start_epoch: ChainEpoch,
}

impl DealProposal {
    pub fn piece_info(&self) -> PieceInfo {
        PieceInfo { size: self.piece_size, cid: self.piece_cid }
    }
}

/// Reference to the data a piece was derived from, and the expert who registered it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct StorageDataRef {
    pub root_cid: Cid,
    pub expert: String,
}

/// ClientDealProposal is a DealProposal signed by a client
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ClientDealProposal {
    pub proposal: DealProposal,
    pub client_signature: Signature,
    pub data_ref: StorageDataRef,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct DealState {
    // -1 if not yet included in proven sector
    pub sector_start_epoch: ChainEpoch,
    // -1 if deal state never updated
    pub last_updated_epoch: ChainEpoch,
    // -1 if deal never slashed
    pub slash_epoch: ChainEpoch,
}

/// Marks a published proposal that has not yet been processed by cron.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct PendingProposal {
    /// Textual form of the data root CID the proposal was published with.
    pub root_cid: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct DataIndex {
    pub root_cid: String,
    pub piece_cid: Cid,
}

/// Pieces activated by one provider within a single epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ProviderDataIndex {
    pub provider: Address,
    pub indexes: Vec<DataIndex>,
}
