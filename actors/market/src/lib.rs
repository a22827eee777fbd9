// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeSet;

use byteorder::{BigEndian, ByteOrder};
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::address::Address;
use fvm_shared::clock::{ChainEpoch, EPOCH_UNDEFINED};
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::sector::RegisteredSealProof;
use fvm_shared::METHOD_CONSTRUCTOR;
use log::info;
use multihash::{Code, Multihash};
use num_derive::FromPrimitive;
use num_traits::Zero;

use epik_actors_runtime::cbor::{deserialize_block, serialize_vec};
use epik_actors_runtime::runtime::{
    ActorCode, DomainSeparationTag, Runtime, Type, CALLER_TYPES_SIGNABLE,
};
use epik_actors_runtime::{
    actor_dispatch, actor_error, validate_caller_granted, ActorContext, ActorError,
    AsActorError, CRON_ACTOR_ADDR, EXPERT_FUND_ACTOR_ADDR, SYSTEM_ACTOR_ADDR,
};

pub use self::deal::*;
use self::policy::*;
pub use self::state::*;
pub use self::types::*;

// exports for testing
pub mod balance_table;
#[doc(hidden)]
pub mod ext;
pub mod policy;
pub mod testing;

mod deal;
mod state;
mod types;

/// Market actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    PublishStorageDeals = 2,
    VerifyDealsForActivation = 3,
    ActivateDeals = 4,
    OnMinerSectorsTerminate = 5,
    ComputeDataCommitment = 6,
    CronTick = 7,
    ResetQuotas = 8,
    SetInitialQuota = 9,
}

/// Market Actor
pub struct Actor;

impl Actor {
    pub fn constructor(rt: &mut impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;

        let st = State::new(rt.store())?;
        rt.create(&st)?;
        Ok(())
    }

    /// Publish a new set of storage deals (not yet included in a sector).
    /// The batch is accepted or rejected as a whole.
    fn publish_storage_deals(
        rt: &mut impl Runtime,
        params: PublishStorageDealsParams,
    ) -> Result<PublishStorageDealsReturn, ActorError> {
        rt.validate_immediate_caller_type(CALLER_TYPES_SIGNABLE)?;
        if params.deals.is_empty() {
            return Err(actor_error!(illegal_argument, "empty deals parameter"));
        }

        // All deals should have the same provider so get worker once
        let provider_raw = params.deals[0].proposal.provider;
        let provider = rt.resolve_address(&provider_raw).ok_or_else(|| {
            actor_error!(not_found, "failed to resolve provider address {}", provider_raw)
        })?;

        let code_id = rt
            .get_actor_code_cid(&provider)
            .ok_or_else(|| actor_error!(illegal_argument, "no code ID for address {}", provider))?;

        if rt.resolve_builtin_actor_type(&code_id) != Some(Type::Miner) {
            return Err(actor_error!(
                illegal_argument,
                "deal provider is not a StorageMinerActor"
            ));
        }

        let control = request_miner_control_addrs(rt, &provider)?;
        let caller = rt.message().caller();
        if caller != control.worker && !control.control_addresses.contains(&caller) {
            return Err(actor_error!(
                forbidden,
                "caller {} is not worker or control address of provider {}",
                caller,
                provider
            ));
        }

        let checked_pieces = params
            .deals
            .iter()
            .map(|d| ext::expertfund::CheckedPiece {
                piece_cid: d.proposal.piece_cid,
                piece_size: d.proposal.piece_size,
            })
            .collect();
        rt.send(
            &EXPERT_FUND_ACTOR_ADDR,
            ext::expertfund::BATCH_CHECK_DATA_METHOD,
            IpldBlock::serialize_cbor(&ext::expertfund::BatchCheckDataParams { checked_pieces })?,
            TokenAmount::zero(),
        )
        .context("failed to batch check expert data")?;

        let piece_cids: Vec<Cid> = params.deals.iter().map(|d| d.proposal.piece_cid).collect();
        if request_miner_stored_any(rt, &provider, &piece_cids)? {
            return Err(actor_error!(illegal_state, "one or more files already stored"));
        }

        let curr_epoch = rt.curr_epoch();
        let new_deal_ids = rt.transaction(|st: &mut State, rt| {
            let mut batch_pieces: Vec<Cid> = Vec::with_capacity(params.deals.len());
            let mut batch_cids: BTreeSet<Cid> = BTreeSet::new();
            let mut pending_deals: Vec<(Cid, PendingProposal)> = vec![];
            let mut deal_proposals: Vec<(DealID, DealProposal)> = vec![];
            let mut deals_by_epoch: Vec<(ChainEpoch, DealID)> = vec![];
            let mut new_deal_ids = Vec::with_capacity(params.deals.len());

            for (di, mut deal) in params.deals.into_iter().enumerate() {
                validate_deal(rt, &deal).with_context(|| format!("invalid deal {}", di))?;

                if deal.proposal.provider != provider && deal.proposal.provider != provider_raw {
                    return Err(actor_error!(
                        illegal_argument,
                        "cannot publish deals from different providers at the same time"
                    ));
                }

                let client = rt.resolve_address(&deal.proposal.client).ok_or_else(|| {
                    actor_error!(
                        not_found,
                        "failed to resolve client address {}",
                        deal.proposal.client
                    )
                })?;

                let piece_cid = deal.proposal.piece_cid;
                if batch_pieces.contains(&piece_cid) {
                    return Err(actor_error!(illegal_argument, "params contain duplicate pieces"));
                }
                if st.has_provider_pending(rt.store(), &provider, &piece_cid)? {
                    return Err(actor_error!(
                        illegal_argument,
                        "cannot publish duplicate pieces {}",
                        piece_cid
                    ));
                }

                // Normalise provider and client addresses in the proposal stored on chain.
                // Must happen after signature verification and before taking cid.
                deal.proposal.provider = provider;
                deal.proposal.client = client;

                let deal_id = st.generate_storage_deal_id();

                let pcid = rt_deal_cid(rt, &deal.proposal).with_context_code(
                    ExitCode::USR_ILLEGAL_ARGUMENT,
                    || format!("failed to take cid of proposal {}", di),
                )?;
                if batch_cids.contains(&pcid) || st.has_pending_deal(rt.store(), &pcid)? {
                    return Err(actor_error!(illegal_argument, "cannot publish duplicate deals"));
                }

                let process_epoch = gen_rand_next_epoch(rt, &deal.proposal)?;

                batch_pieces.push(piece_cid);
                batch_cids.insert(pcid);
                pending_deals
                    .push((pcid, PendingProposal { root_cid: deal.data_ref.root_cid.to_string() }));
                deals_by_epoch.push((process_epoch, deal_id));
                deal_proposals.push((deal_id, deal.proposal));
                new_deal_ids.push(deal_id);
            }

            st.put_pending_deals(rt.store(), &pending_deals)?;
            st.put_deal_proposals(rt.store(), &deal_proposals)?;
            st.put_deals_by_epoch(rt.store(), &deals_by_epoch)?;
            st.put_provider_pendings(rt.store(), &provider, &batch_pieces)?;

            Ok(new_deal_ids)
        })?;

        info!(
            "published {} deals for provider {} at epoch {}",
            new_deal_ids.len(),
            provider,
            curr_epoch
        );
        Ok(PublishStorageDealsReturn { ids: new_deal_ids })
    }

    /// Verify that a given set of storage deals is valid for a sector currently being PreCommitted
    /// and return the pieces of each sector's deals.
    fn verify_deals_for_activation(
        rt: &mut impl Runtime,
        params: VerifyDealsForActivationParams,
    ) -> Result<VerifyDealsForActivationReturn, ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;
        let miner_addr = rt.message().caller();
        let curr_epoch = rt.curr_epoch();

        let st: State = rt.state()?;
        let proposals = st.load_proposals(rt.store())?;

        let mut sectors = Vec::with_capacity(params.sectors.len());
        for sector in params.sectors.iter() {
            let deals =
                validate_deals_for_activation(&proposals, &sector.deal_ids, &miner_addr, curr_epoch)
                    .context("failed to validate deal proposals for activation")?;
            let (piece_cids, piece_sizes): (Vec<_>, Vec<_>) =
                deals.iter().map(|(_, d)| (d.piece_cid, d.piece_size)).unzip();
            sectors.push(SectorDealInfos { piece_cids, piece_sizes });
        }

        Ok(VerifyDealsForActivationReturn { sectors })
    }

    /// Activate a set of deals, recording which of them won a unit of their piece's quota.
    fn activate_deals(
        rt: &mut impl Runtime,
        params: ActivateDealsParams,
    ) -> Result<ActivateDealsReturn, ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;
        let miner_addr = rt.message().caller();
        let curr_epoch = rt.curr_epoch();

        let (deal_wins, piece_cids) = rt.transaction(|st: &mut State, rt| {
            let deals = {
                let proposals = st.load_proposals(rt.store())?;
                validate_deals_for_activation(&proposals, &params.deal_ids, &miner_addr, curr_epoch)
                    .context("failed to validate deal proposals for activation")?
            };

            let states = st.load_deal_states(rt.store())?;
            let pending_deals = st.load_pending_deals(rt.store())?;
            let quotas = st.load_quotas(rt.store())?;

            let mut deal_states: Vec<(DealID, DealState)> = vec![];
            let mut quota_updates: Vec<(Cid, i64)> = vec![];
            let mut data_indexes: Vec<(Address, DataIndex)> = vec![];
            let mut deal_wins = Vec::with_capacity(deals.len());
            let mut piece_cids = Vec::with_capacity(deals.len());

            for (deal_id, proposal) in deals {
                if find_deal_state(&states, deal_id)?.is_some() {
                    return Err(actor_error!(
                        illegal_argument,
                        "deal {} already included in another sector",
                        deal_id
                    ));
                }

                // Confirm the deal is in the pending proposals queue.
                // It will be removed from this queue later, during cron.
                let propc = rt_deal_cid(rt, &proposal)?;
                let pending = pending_deals.get(&propc)?.cloned().ok_or_else(|| {
                    actor_error!(
                        illegal_state,
                        "tried to activate deal that was not in the pending set ({})",
                        propc
                    )
                })?;

                deal_states.push((
                    deal_id,
                    DealState {
                        sector_start_epoch: curr_epoch,
                        last_updated_epoch: EPOCH_UNDEFINED,
                        slash_epoch: EPOCH_UNDEFINED,
                    },
                ));

                // A piece activated twice in one call sees the quota left by the first.
                let quota = match quota_updates.iter().rev().find(|(c, _)| *c == proposal.piece_cid)
                {
                    Some((_, q)) => *q,
                    None => quotas.get(&proposal.piece_cid)?.copied().unwrap_or(st.initial_quota),
                };
                deal_wins.push(quota > 0);
                if quota > 0 {
                    quota_updates.push((proposal.piece_cid, quota - 1));
                }

                data_indexes.push((
                    proposal.provider,
                    DataIndex { root_cid: pending.root_cid, piece_cid: proposal.piece_cid },
                ));
                piece_cids.push(proposal.piece_cid);
            }

            st.put_deal_states(rt.store(), &deal_states)?;
            st.put_quotas(rt.store(), &quota_updates)?;
            st.append_data_index(rt.store(), curr_epoch, data_indexes)?;

            Ok((deal_wins, piece_cids))
        })?;

        rt.send(
            &EXPERT_FUND_ACTOR_ADDR,
            ext::expertfund::BATCH_STORE_DATA_METHOD,
            IpldBlock::serialize_cbor(&ext::BatchPieceCidParams::new(&piece_cids))?,
            TokenAmount::zero(),
        )
        .context("failed to batch store expert data")?;

        Ok(ActivateDealsReturn { deal_wins })
    }

    /// Terminate a set of deals in response to their containing sector being terminated.
    /// The deals are marked slashed here and removed by a later cron tick.
    fn on_miner_sectors_terminate(
        rt: &mut impl Runtime,
        params: OnMinerSectorsTerminateParams,
    ) -> Result<(), ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;
        let miner_addr = rt.message().caller();
        let curr_epoch = rt.curr_epoch();

        if params.epoch > curr_epoch {
            return Err(actor_error!(
                illegal_state,
                "future termination epoch {} at {}",
                params.epoch,
                curr_epoch
            ));
        }

        rt.transaction(|st: &mut State, rt| {
            let proposals = st.load_proposals(rt.store())?;
            let states = st.load_deal_states(rt.store())?;

            let mut deal_states: Vec<(DealID, DealState)> = vec![];
            let mut deals_by_epoch: Vec<(ChainEpoch, DealID)> = vec![];

            for id in params.deal_ids {
                // The deal may have been cleaned up before the sector is terminated.
                // Nothing to do, but continue execution for the other deals.
                let deal = match find_proposal(&proposals, id)? {
                    Some(deal) => deal,
                    None => {
                        info!("couldn't find deal {}", id);
                        continue;
                    }
                };

                if deal.provider != miner_addr {
                    return Err(actor_error!(
                        illegal_state,
                        "caller {} is not the provider {} of deal {}",
                        miner_addr,
                        deal.provider,
                        id
                    ));
                }

                let mut state: DealState = find_deal_state(&states, id)?
                    // A deal with a proposal but no state is not activated, but then it should not be
                    // part of a sector that is terminating.
                    .ok_or_else(|| actor_error!(illegal_argument, "no state for deal {}", id))?;

                // If a deal is already slashed, don't need to do anything
                if state.slash_epoch != EPOCH_UNDEFINED {
                    info!("deal {}, already slashed", id);
                    continue;
                }

                // Mark the deal for slashing here. Removal happens in cron_tick.
                state.slash_epoch = params.epoch;
                deal_states.push((id, state));
                deals_by_epoch.push((termination_process_epoch(curr_epoch, id), id));
            }

            st.put_deal_states(rt.store(), &deal_states)?;
            st.put_deals_by_epoch(rt.store(), &deals_by_epoch)?;
            Ok(())
        })
    }

    fn compute_data_commitment(
        rt: &mut impl Runtime,
        params: ComputeDataCommitmentParams,
    ) -> Result<Cid, ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;

        let st: State = rt.state()?;
        let proposals = st.load_proposals(rt.store())?;
        compute_data_commitment(rt, &proposals, params.sector_type, &params.deal_ids)
    }

    fn cron_tick(rt: &mut impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&CRON_ACTOR_ADDR))?;
        let curr_epoch = rt.curr_epoch();

        rt.transaction(|st: &mut State, rt| {
            let store = rt.store();
            let mut proposals = st.load_proposals(store)?;
            let mut states = st.load_deal_states(store)?;
            let mut pending_deals = st.load_pending_deals(store)?;
            let mut provider_pendings = st.load_provider_pendings(store)?;
            let mut deals_by_epoch = st.load_deals_by_epoch(store)?;

            for i in (st.last_cron + 1)..=curr_epoch {
                let deal_ids = deals_by_epoch
                    .values_of(&i)
                    .with_context(|| format!("failed to iterate deals for epoch {}", i))?;

                for deal_id in deal_ids {
                    // The deal may have been removed by an earlier tick.
                    let deal = match find_proposal(&proposals, deal_id)? {
                        Some(deal) => deal,
                        None => {
                            info!("couldn't find deal {}", deal_id);
                            continue;
                        }
                    };

                    let dcid = rt_deal_cid(rt, &deal)?;

                    let mut state = match find_deal_state(&states, deal_id)? {
                        Some(state) => state,
                        None => {
                            // Published but never activated: it has timed out.
                            if curr_epoch < deal.start_epoch {
                                return Err(actor_error!(
                                    illegal_state,
                                    "deal {} processed before start epoch {}",
                                    deal_id,
                                    deal.start_epoch
                                ));
                            }

                            proposals.delete(deal_id).with_context(|| {
                                format!("failed to delete deal proposal {}", deal_id)
                            })?;
                            remove_pending_markers(
                                &mut pending_deals,
                                &mut provider_pendings,
                                &dcid,
                                &deal,
                            )?;
                            continue;
                        }
                    };

                    if state.last_updated_epoch == EPOCH_UNDEFINED {
                        remove_pending_markers(
                            &mut pending_deals,
                            &mut provider_pendings,
                            &dcid,
                            &deal,
                        )?;
                    } else if curr_epoch < state.last_updated_epoch {
                        return Err(actor_error!(
                            illegal_state,
                            "current epoch {} less than last update epoch {} of deal {}",
                            curr_epoch,
                            state.last_updated_epoch,
                            deal_id
                        ));
                    }

                    if state.slash_epoch != EPOCH_UNDEFINED {
                        if curr_epoch < state.slash_epoch {
                            return Err(actor_error!(
                                illegal_state,
                                "current epoch {} less than slash epoch {} of deal {}",
                                curr_epoch,
                                state.slash_epoch,
                                deal_id
                            ));
                        }

                        // Delete proposal and state simultaneously.
                        states.delete(deal_id)?.ok_or_else(|| {
                            actor_error!(illegal_state, "failed to delete deal state: does not exist")
                        })?;
                        proposals.delete(deal_id)?.ok_or_else(|| {
                            actor_error!(
                                illegal_state,
                                "failed to delete deal proposal: does not exist"
                            )
                        })?;
                    } else {
                        state.last_updated_epoch = curr_epoch;
                        states
                            .set(deal_id, state)
                            .with_context(|| format!("failed to set deal state {}", deal_id))?;
                    }
                }

                deals_by_epoch
                    .remove_all(&i)
                    .with_context(|| format!("failed to delete deals for epoch {}", i))?;
            }

            st.proposals = proposals.flush()?;
            st.states = states.flush()?;
            st.pending_proposals = pending_deals.flush()?;
            st.provider_pendings = provider_pendings.flush()?;
            st.deals_by_epoch = deals_by_epoch.flush()?;
            st.last_cron = curr_epoch;

            Ok(())
        })
    }

    /// Overwrites the remaining quota of pieces that have been activated before.
    fn reset_quotas(rt: &mut impl Runtime, params: ResetQuotasParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_type(CALLER_TYPES_SIGNABLE)?;
        let caller = rt.message().caller();
        validate_caller_granted(rt, &caller, Method::ResetQuotas as u64)?;

        if params.new_quotas.is_empty() {
            return Err(actor_error!(illegal_argument, "empty params"));
        }

        rt.transaction(|st: &mut State, rt| {
            let mut updates = Vec::with_capacity(params.new_quotas.len());
            for new_quota in params.new_quotas {
                if st.get_quota(rt.store(), &new_quota.piece_cid)?.is_none() {
                    return Err(actor_error!(
                        illegal_argument,
                        "piece cid not found {}",
                        new_quota.piece_cid
                    ));
                }
                if new_quota.quota < 0 {
                    return Err(actor_error!(
                        illegal_argument,
                        "negative quota not allowed {}",
                        new_quota.quota
                    ));
                }
                updates.push((new_quota.piece_cid, new_quota.quota));
            }
            st.put_quotas(rt.store(), &updates)
        })
    }

    /// Sets the quota granted to pieces on their first activation.
    fn set_initial_quota(
        rt: &mut impl Runtime,
        params: SetInitialQuotaParams,
    ) -> Result<(), ActorError> {
        rt.validate_immediate_caller_type(CALLER_TYPES_SIGNABLE)?;

        if params.quota <= 0 {
            return Err(actor_error!(
                illegal_argument,
                "non-positive quota to set {}",
                params.quota
            ));
        }

        let caller = rt.message().caller();
        validate_caller_granted(rt, &caller, Method::SetInitialQuota as u64)?;

        rt.transaction(|st: &mut State, _| {
            st.initial_quota = params.quota;
            Ok(())
        })
    }
}

/// Removes the markers that keep a published proposal from being published again.
fn remove_pending_markers<BS: Blockstore + Clone>(
    pending_deals: &mut PendingProposalsMap<BS>,
    provider_pendings: &mut ProviderPendings<BS>,
    dcid: &Cid,
    deal: &DealProposal,
) -> Result<(), ActorError> {
    pending_deals.delete(dcid)?.ok_or_else(|| {
        actor_error!(illegal_state, "failed to delete pending proposal {}: does not exist", dcid)
    })?;
    provider_pendings
        .remove(&deal.provider, &deal.piece_cid)
        .with_context(|| format!("failed to delete provider pending {}", deal.piece_cid))
}

fn compute_data_commitment<BS: Blockstore>(
    rt: &impl Runtime,
    proposals: &DealArray<BS>,
    sector_type: RegisteredSealProof,
    deal_ids: &[DealID],
) -> Result<Cid, ActorError> {
    let mut pieces = Vec::with_capacity(deal_ids.len());

    for deal_id in deal_ids {
        let deal = find_proposal(proposals, *deal_id)?
            .ok_or_else(|| actor_error!(not_found, "proposal doesn't exist ({})", deal_id))?;

        pieces.push(deal.piece_info());
    }
    rt.compute_unsealed_sector_cid(sector_type, &pieces)
        .context_code(ExitCode::USR_ILLEGAL_ARGUMENT, "failed to compute unsealed sector CID")
}

/// Checks that each deal is known, belongs to the miner and has not passed its start epoch.
/// Returns the proposals in the order of `deal_ids`.
pub fn validate_deals_for_activation<BS: Blockstore>(
    proposals: &DealArray<BS>,
    deal_ids: &[DealID],
    miner_addr: &Address,
    curr_epoch: ChainEpoch,
) -> Result<Vec<(DealID, DealProposal)>, ActorError> {
    let mut seen_deal_ids = BTreeSet::new();
    let mut deals = Vec::with_capacity(deal_ids.len());

    for deal_id in deal_ids {
        if !seen_deal_ids.insert(deal_id) {
            return Err(actor_error!(
                illegal_argument,
                "deal id {} present multiple times",
                deal_id
            ));
        }

        let proposal = find_proposal(proposals, *deal_id)?
            .ok_or_else(|| actor_error!(not_found, "no such deal {}", deal_id))?;

        validate_deal_can_activate(&proposal, miner_addr, curr_epoch)
            .with_context(|| format!("cannot activate deal {}", deal_id))?;

        deals.push((*deal_id, proposal));
    }

    Ok(deals)
}

/// Picks the epoch of a new deal's first cron processing, drawn from the randomness beacon
/// within `DEAL_UPDATES_INTERVAL` epochs of its start.
fn gen_rand_next_epoch(
    rt: &impl Runtime,
    proposal: &DealProposal,
) -> Result<ChainEpoch, ActorError> {
    let entropy = serialize_vec(proposal, "deal proposal")?;
    let rb = rt.get_randomness_from_beacon(
        DomainSeparationTag::MarketDealCronSeed,
        rt.curr_epoch() - 1,
        &entropy,
    )?;
    let offset = BigEndian::read_u64(&rb[..8]);
    Ok(proposal.start_epoch + (offset % DEAL_UPDATES_INTERVAL as u64) as ChainEpoch)
}

////////////////////////////////////////////////////////////////////////////////
// Checks
////////////////////////////////////////////////////////////////////////////////
fn validate_deal_can_activate(
    proposal: &DealProposal,
    miner_addr: &Address,
    curr_epoch: ChainEpoch,
) -> Result<(), ActorError> {
    if &proposal.provider != miner_addr {
        return Err(actor_error!(
            forbidden,
            "proposal has provider {}, must be {}",
            proposal.provider,
            miner_addr
        ));
    };

    if curr_epoch > proposal.start_epoch {
        return Err(actor_error!(
            illegal_argument,
            "proposal start epoch {} has already elapsed at {}",
            proposal.start_epoch,
            curr_epoch
        ));
    };

    Ok(())
}

fn validate_deal(rt: &impl Runtime, deal: &ClientDealProposal) -> Result<(), ActorError> {
    deal_proposal_is_internally_valid(rt, deal)?;

    let proposal = &deal.proposal;

    if proposal.label.len() > detail::DEAL_MAX_LABEL_SIZE {
        return Err(actor_error!(
            illegal_argument,
            "deal label can be at most {} bytes, is {}",
            detail::DEAL_MAX_LABEL_SIZE,
            proposal.label.len()
        ));
    }

    proposal
        .piece_size
        .validate()
        .map_err(|e| actor_error!(illegal_argument, "proposal piece size is invalid: {}", e))?;

    if proposal.piece_cid == Cid::default() {
        return Err(actor_error!(illegal_argument, "proposal PieceCID undefined"));
    }

    if !is_piece_cid(&proposal.piece_cid) {
        return Err(actor_error!(illegal_argument, "proposal PieceCID had wrong prefix"));
    }

    if rt.curr_epoch() > proposal.start_epoch {
        return Err(actor_error!(illegal_argument, "Deal start epoch has already elapsed."));
    };

    Ok(())
}

fn deal_proposal_is_internally_valid(
    rt: &impl Runtime,
    proposal: &ClientDealProposal,
) -> Result<(), ActorError> {
    // Generate unsigned bytes
    let proposal_bytes = serialize_vec(&proposal.proposal, "deal proposal")?;

    rt.verify_signature(&proposal.client_signature, &proposal.proposal.client, &proposal_bytes)
        .context_code(ExitCode::USR_ILLEGAL_ARGUMENT, "signature proposal invalid")
}

pub const DAG_CBOR: u64 = 0x71;

/// Compute a deal CID using the runtime.
pub fn rt_deal_cid(rt: &impl Runtime, proposal: &DealProposal) -> Result<Cid, ActorError> {
    let data = serialize_vec(proposal, "deal proposal")?;
    let hash = Multihash::wrap(Code::Blake2b256.into(), &rt.hash_blake2b(&data))
        .map_err(|e| actor_error!(illegal_argument; "failed to take cid of proposal {}", e))?;
    Ok(Cid::new_v1(DAG_CBOR, hash))
}

fn request_miner_control_addrs(
    rt: &mut impl Runtime,
    miner: &Address,
) -> Result<ext::miner::GetControlAddressesReturn, ActorError> {
    let ret = rt.send(
        miner,
        ext::miner::CONTROL_ADDRESSES_METHOD,
        None,
        TokenAmount::zero(),
    )?;
    deserialize_block(ret, "control addresses")
}

/// Asks the provider whether it already stores any of the pieces.
fn request_miner_stored_any(
    rt: &mut impl Runtime,
    miner: &Address,
    piece_cids: &[Cid],
) -> Result<bool, ActorError> {
    let ret = rt
        .send(
            miner,
            ext::miner::STORED_ANY_METHOD,
            IpldBlock::serialize_cbor(&ext::BatchPieceCidParams::new(piece_cids))?,
            TokenAmount::zero(),
        )
        .and_then(|ret| deserialize_block::<bool>(ret, "stored any"))
        .map_err(|e| {
            ActorError::illegal_argument(format!("failed to check miner stored pieces: {}", e))
        })?;
    Ok(ret)
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "StorageMarket"
    }

    actor_dispatch! {
        Constructor => constructor,
        PublishStorageDeals => publish_storage_deals,
        VerifyDealsForActivation => verify_deals_for_activation,
        ActivateDeals => activate_deals,
        OnMinerSectorsTerminate => on_miner_sectors_terminate,
        ComputeDataCommitment => compute_data_commitment,
        CronTick => cron_tick,
        ResetQuotas => reset_quotas,
        SetInitialQuota => set_initial_quota,
    }
}
