// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::{BTreeMap, BTreeSet};

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::{Address, Protocol};
use fvm_shared::clock::{ChainEpoch, EPOCH_UNDEFINED};
use fvm_shared::deal::DealID;
use multihash::{Code, MultihashDigest};
use num_traits::Zero;

use epik_actors_runtime::cbor::serialize_vec;
use epik_actors_runtime::{ActorError, MessageAccumulator};

use crate::balance_table::BalanceTable;
use crate::{DealProposal, State, DAG_CBOR};

#[derive(Clone, Debug)]
pub struct DealSummary {
    pub provider: Address,
    pub piece_cid: Cid,
    pub start_epoch: ChainEpoch,
    pub sector_start_epoch: ChainEpoch,
    pub last_update_epoch: ChainEpoch,
    pub slash_epoch: ChainEpoch,
}

impl Default for DealSummary {
    fn default() -> Self {
        Self {
            provider: Address::new_id(0),
            piece_cid: Cid::default(),
            start_epoch: 0,
            sector_start_epoch: EPOCH_UNDEFINED,
            last_update_epoch: EPOCH_UNDEFINED,
            slash_epoch: EPOCH_UNDEFINED,
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct StateSummary {
    pub deals: BTreeMap<DealID, DealSummary>,
    pub pending_proposal_count: u64,
    /// Pending proposals whose deal has already been removed.
    pub orphaned_pending_count: u64,
    pub provider_pending_count: u64,
    pub deal_state_count: u64,
    pub deal_op_epoch_count: u64,
    pub deal_op_count: u64,
    pub quota_count: u64,
    pub data_index_count: u64,
}

/// Checks internal invariants of market state.
pub fn check_state_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
    current_epoch: ChainEpoch,
) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();

    let mut proposal_cids = BTreeMap::<Cid, (Address, Cid)>::new();
    let mut max_deal_id = -1;
    let mut proposal_stats = BTreeMap::<DealID, DealSummary>::new();

    match state.load_proposals(store) {
        Ok(proposals) => {
            let ret = proposals.for_each(|deal_id, proposal| {
                let proposal_cid = deal_cid(proposal)?;

                if deal_id as i64 > max_deal_id {
                    max_deal_id = deal_id as i64;
                }

                proposal_stats.insert(
                    deal_id,
                    DealSummary {
                        provider: proposal.provider,
                        piece_cid: proposal.piece_cid,
                        start_epoch: proposal.start_epoch,
                        ..Default::default()
                    },
                );
                proposal_cids.insert(proposal_cid, (proposal.provider, proposal.piece_cid));

                acc.require(
                    proposal.client.protocol() == Protocol::ID,
                    format!("client address for deal {deal_id} is not an ID address"),
                );
                acc.require(
                    proposal.provider.protocol() == Protocol::ID,
                    format!("provider address for deal {deal_id} is not an ID address"),
                );
                Ok(())
            });
            acc.require_no_error(ret, "error iterating proposals");
        }
        Err(e) => acc.add(format!("error loading proposals: {e}")),
    };

    acc.require(
        state.next_id as i64 > max_deal_id,
        format!(
            "next id, {}, is not greater than highest id in proposals, {max_deal_id}",
            state.next_id
        ),
    );

    // deal states
    let mut deal_state_count = 0;
    match state.load_deal_states(store) {
        Ok(deal_states) => {
            let ret = deal_states.for_each(|deal_id, deal_state| {
                acc.require(
                    deal_state.sector_start_epoch >= 0,
                    format!("deal {deal_id} state start epoch undefined: {deal_state:?}"),
                );
                acc.require(
                    deal_state.sector_start_epoch <= current_epoch,
                    format!("deal {deal_id} activated after current epoch {current_epoch}"),
                );
                acc.require(
                    deal_state.last_updated_epoch == EPOCH_UNDEFINED
                        || deal_state.last_updated_epoch >= deal_state.sector_start_epoch,
                    format!(
                        "deal {deal_id} state last updated before sector start: {deal_state:?}"
                    ),
                );
                acc.require(
                    deal_state.last_updated_epoch == EPOCH_UNDEFINED
                        || deal_state.last_updated_epoch <= current_epoch,
                    format!(
                        "deal {deal_id} last updated epoch {} after current {current_epoch}",
                        deal_state.last_updated_epoch
                    ),
                );
                acc.require(
                    deal_state.slash_epoch == EPOCH_UNDEFINED
                        || deal_state.slash_epoch >= deal_state.sector_start_epoch,
                    format!("deal {deal_id} state slashed before sector start: {deal_state:?}"),
                );
                acc.require(
                    deal_state.slash_epoch == EPOCH_UNDEFINED
                        || deal_state.slash_epoch <= current_epoch,
                    format!(
                        "deal {deal_id} state slashed after current epoch {current_epoch}: {deal_state:?}"
                    ),
                );

                match proposal_stats.get_mut(&deal_id) {
                    Some(stats) => {
                        stats.sector_start_epoch = deal_state.sector_start_epoch;
                        stats.last_update_epoch = deal_state.last_updated_epoch;
                        stats.slash_epoch = deal_state.slash_epoch;
                    }
                    None => acc.add(format!("no deal proposal for deal state {deal_id}")),
                }

                deal_state_count += 1;
                Ok(())
            });
            acc.require_no_error(ret, "error iterating deal states");
        }
        Err(e) => acc.add(format!("error loading deal states: {e}")),
    };

    // pending proposals
    let mut pending_proposal_count = 0;
    let mut orphaned_pending_count = 0;
    let mut pending_pieces = BTreeSet::<(Address, Cid)>::new();
    match state.load_pending_deals(store) {
        Ok(pending_proposals) => {
            let ret = pending_proposals.for_each(|proposal_cid, pending| {
                acc.require(
                    !pending.root_cid.is_empty(),
                    format!("pending proposal {proposal_cid} has no root cid"),
                );
                match proposal_cids.get(&proposal_cid) {
                    Some(piece) => {
                        pending_pieces.insert(*piece);
                    }
                    None => orphaned_pending_count += 1,
                }
                pending_proposal_count += 1;
                Ok(())
            });
            acc.require_no_error(ret, "error iterating pending proposals");
        }
        Err(e) => acc.add(format!("error loading pending proposals: {e}")),
    };

    // provider pendings
    let mut provider_pending_count = 0;
    match state.load_provider_pendings(store) {
        Ok(provider_pendings) => {
            let mut providers = Vec::new();
            let ret = provider_pendings.for_each(|provider, _| {
                providers.push(provider);
                Ok(())
            });
            acc.require_no_error(ret, "error iterating provider pendings");

            for provider in providers {
                let ret = provider_pendings.for_each_in(&provider, |piece_cid: Cid| {
                    acc.require(
                        pending_pieces.contains(&(provider, piece_cid)),
                        format!(
                            "provider {provider} pending piece {piece_cid} has no pending proposal"
                        ),
                    );
                    provider_pending_count += 1;
                    Ok(())
                });
                acc.require_no_error(ret, "error iterating provider pending pieces");
            }
        }
        Err(e) => acc.add(format!("error loading provider pendings: {e}")),
    };

    // quotas
    let mut quota_count = 0;
    match state.load_quotas(store) {
        Ok(quotas) => {
            let ret = quotas.for_each(|piece_cid, quota| {
                acc.require(*quota >= 0, format!("negative quota {quota} for piece {piece_cid}"));
                quota_count += 1;
                Ok(())
            });
            acc.require_no_error(ret, "error iterating quotas");
        }
        Err(e) => acc.add(format!("error loading quotas: {e}")),
    };
    acc.require(
        state.initial_quota > 0,
        format!("initial quota {} is not positive", state.initial_quota),
    );

    // data index
    let mut data_index_count = 0;
    match state.load_data_index(store) {
        Ok(data_index) => {
            let ret = data_index.for_each(|epoch, indexes| {
                acc.require(
                    epoch <= current_epoch,
                    format!("data index recorded at future epoch {epoch}"),
                );
                let mut seen = BTreeSet::new();
                for pdi in indexes {
                    acc.require(
                        seen.insert(pdi.provider),
                        format!("provider {} listed twice in data index at {epoch}", pdi.provider),
                    );
                    data_index_count += pdi.indexes.len() as u64;
                }
                Ok(())
            });
            acc.require_no_error(ret, "error iterating data index");
        }
        Err(e) => acc.add(format!("error loading data index: {e}")),
    };

    // escrow and locked tables are never funded
    for (root, name) in
        [(&state.escrow_table, "escrow table"), (&state.locked_table, "locked table")]
    {
        match BalanceTable::from_root(store, root, name).and_then(|t| t.total()) {
            Ok(total) => acc.require(total.is_zero(), format!("{name} total {total} is not zero")),
            Err(e) => acc.add(format!("error loading {name}: {e}")),
        }
    }

    // deals by epoch
    let (mut deal_op_epoch_count, mut deal_op_count) = (0, 0);
    match state.load_deals_by_epoch(store) {
        Ok(deals_by_epoch) => {
            let mut epochs = Vec::new();
            let ret = deals_by_epoch.for_each(|epoch, _| {
                epochs.push(epoch);
                Ok(())
            });
            acc.require_no_error(ret, "error iterating deals by epoch");

            for epoch in epochs {
                deal_op_epoch_count += 1;
                let ret = deals_by_epoch.for_each_in(&epoch, |deal_id: DealID| {
                    acc.require(
                        deal_id < state.next_id,
                        format!("deal op {deal_id} at {epoch} not below next id {}", state.next_id),
                    );
                    deal_op_count += 1;
                    Ok(())
                });
                acc.require_no_error(ret, "error iterating deal ops");
            }
        }
        Err(e) => acc.add(format!("error loading deals by epoch: {e}")),
    };

    (
        StateSummary {
            deals: proposal_stats,
            pending_proposal_count,
            orphaned_pending_count,
            provider_pending_count,
            deal_state_count,
            deal_op_epoch_count,
            deal_op_count,
            quota_count,
            data_index_count,
        },
        acc,
    )
}

/// Compute a deal CID directly, without a runtime.
pub fn deal_cid(proposal: &DealProposal) -> Result<Cid, ActorError> {
    let data = serialize_vec(proposal, "deal proposal")?;
    let hash = Code::Blake2b256.digest(&data);
    Ok(Cid::new_v1(DAG_CBOR, hash))
}
