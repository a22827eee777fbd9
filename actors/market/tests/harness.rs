// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

#![allow(dead_code)]

use std::collections::HashMap;

use cid::Cid;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PaddedPieceSize;
use fvm_shared::METHOD_CONSTRUCTOR;
use multihash::{Code, MultihashDigest};
use num_traits::Zero;
use regex::Regex;

use epik_actor_market::ext::expertfund::{
    BatchCheckDataParams, CheckedPiece, BATCH_CHECK_DATA_METHOD, BATCH_STORE_DATA_METHOD,
};
use epik_actor_market::ext::miner::{
    GetControlAddressesReturn, CONTROL_ADDRESSES_METHOD, STORED_ANY_METHOD,
};
use epik_actor_market::ext::BatchPieceCidParams;
use epik_actor_market::policy::DEAL_UPDATES_INTERVAL;
use epik_actor_market::testing::check_state_invariants;
use epik_actor_market::{
    ActivateDealsParams, ActivateDealsReturn, Actor as MarketActor, ClientDealProposal,
    DealProposal, DealState, Method, OnMinerSectorsTerminateParams, PublishStorageDealsParams,
    PublishStorageDealsReturn, State, StorageDataRef, DAG_CBOR,
};
use epik_actors_runtime::cbor::serialize_vec;
use epik_actors_runtime::runtime::{DomainSeparationTag, Runtime, Type, CALLER_TYPES_SIGNABLE};
use epik_actors_runtime::test_utils::*;
use epik_actors_runtime::{
    ActorError, ValidateGrantedParams, CRON_ACTOR_ADDR, EXPERT_FUND_ACTOR_ADDR,
    GOVERN_ACTOR_ADDR, GOVERN_VALIDATE_GRANTED_METHOD, STORAGE_MARKET_ACTOR_ADDR,
    SYSTEM_ACTOR_ADDR,
};

// Define common set of actor ids that will be used across all tests.
pub const OWNER_ID: u64 = 101;
pub const PROVIDER_ID: u64 = 102;
pub const WORKER_ID: u64 = 103;
pub const CLIENT_ID: u64 = 104;
pub const CONTROL_ID: u64 = 200;
pub const ADMIN_ID: u64 = 300;

pub const OWNER_ADDR: Address = Address::new_id(OWNER_ID);
pub const PROVIDER_ADDR: Address = Address::new_id(PROVIDER_ID);
pub const WORKER_ADDR: Address = Address::new_id(WORKER_ID);
pub const CLIENT_ADDR: Address = Address::new_id(CLIENT_ID);
pub const CONTROL_ADDR: Address = Address::new_id(CONTROL_ID);
pub const ADMIN_ADDR: Address = Address::new_id(ADMIN_ID);

pub const PIECE_SIZE: PaddedPieceSize = PaddedPieceSize(2048);

/// Randomness whose first eight bytes reduce to offset zero.
pub const ZERO_RANDOMNESS: [u8; 32] = [0u8; 32];

pub struct MinerAddresses {
    pub owner: Address,
    pub worker: Address,
    pub provider: Address,
    pub control: Vec<Address>,
}

// Use the predefined actor addresses by default
impl Default for MinerAddresses {
    fn default() -> Self {
        MinerAddresses {
            owner: OWNER_ADDR,
            worker: WORKER_ADDR,
            provider: PROVIDER_ADDR,
            control: vec![CONTROL_ADDR],
        }
    }
}

pub fn setup() -> MockRuntime {
    init_logging();
    let actor_code_cids = HashMap::from([
        (OWNER_ADDR, *ACCOUNT_ACTOR_CODE_ID),
        (WORKER_ADDR, *ACCOUNT_ACTOR_CODE_ID),
        (PROVIDER_ADDR, *MINER_ACTOR_CODE_ID),
        (CLIENT_ADDR, *ACCOUNT_ACTOR_CODE_ID),
        (CONTROL_ADDR, *ACCOUNT_ACTOR_CODE_ID),
        (ADMIN_ADDR, *ACCOUNT_ACTOR_CODE_ID),
    ]);

    let mut rt = MockRuntime {
        receiver: STORAGE_MARKET_ACTOR_ADDR,
        caller: SYSTEM_ACTOR_ADDR,
        caller_type: *INIT_ACTOR_CODE_ID,
        actor_code_cids,
        ..Default::default()
    };

    construct_and_verify(&mut rt);
    rt
}

/// Checks internal invariants of market state asserting none of them are broken.
pub fn check_state(rt: &MockRuntime) {
    let (_, acc) = check_state_invariants(&rt.get_state::<State>(), rt.store(), rt.epoch);
    acc.assert_empty();
}

/// Checks state, allowing expected invariants to fail. The invariants *must* fail in the
/// provided order.
pub fn check_state_with_expected(rt: &MockRuntime, expected_patterns: &[Regex]) {
    let (_, acc) = check_state_invariants(&rt.get_state::<State>(), rt.store(), rt.epoch);
    acc.assert_expected(expected_patterns);
}

pub fn construct_and_verify(rt: &mut MockRuntime) {
    rt.set_caller(*SYSTEM_ACTOR_CODE_ID, SYSTEM_ACTOR_ADDR);
    rt.expect_validate_caller_addr(vec![SYSTEM_ACTOR_ADDR]);
    assert!(rt.call::<MarketActor>(METHOD_CONSTRUCTOR, None).unwrap().is_none());
    rt.verify();
}

/// A data root for the piece derived from `seed`.
pub fn make_root_cid(seed: &[u8]) -> Cid {
    Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(seed))
}

pub fn generate_deal_proposal(
    client: Address,
    provider: Address,
    piece_seed: &str,
    start_epoch: ChainEpoch,
) -> DealProposal {
    DealProposal {
        piece_cid: make_piece_cid(piece_seed.as_bytes()),
        piece_size: PIECE_SIZE,
        client,
        provider,
        label: format!("label-{}", piece_seed),
        start_epoch,
    }
}

pub fn sign_proposal(proposal: &DealProposal) -> ClientDealProposal {
    ClientDealProposal {
        proposal: proposal.clone(),
        client_signature: Signature::new_bls(b"signed by client".to_vec()),
        data_ref: StorageDataRef {
            root_cid: make_root_cid(proposal.piece_cid.to_bytes().as_slice()),
            expert: "expert-1".to_string(),
        },
    }
}

/// The epoch at which cron first processes a deal published with `randomness`.
pub fn process_epoch(start_epoch: ChainEpoch, randomness: &[u8; 32]) -> ChainEpoch {
    let mut offset = [0u8; 8];
    offset.copy_from_slice(&randomness[..8]);
    start_epoch + (u64::from_be_bytes(offset) % DEAL_UPDATES_INTERVAL as u64) as ChainEpoch
}

/// Randomness that delays a deal's first processing by `offset` epochs.
pub fn randomness_for_offset(offset: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..8].copy_from_slice(&offset.to_be_bytes());
    out
}

pub fn expect_provider_control_address(rt: &mut MockRuntime, addrs: &MinerAddresses) {
    let ret = GetControlAddressesReturn {
        owner: addrs.owner,
        worker: addrs.worker,
        coinbase: addrs.owner,
        control_addresses: addrs.control.clone(),
    };
    rt.expect_send(
        addrs.provider,
        CONTROL_ADDRESSES_METHOD,
        None,
        TokenAmount::zero(),
        IpldBlock::serialize_cbor(&ret).unwrap(),
        ExitCode::OK,
    );
}

pub fn expect_batch_check_data(
    rt: &mut MockRuntime,
    deals: &[ClientDealProposal],
    exit_code: ExitCode,
) {
    let checked_pieces = deals
        .iter()
        .map(|d| CheckedPiece { piece_cid: d.proposal.piece_cid, piece_size: d.proposal.piece_size })
        .collect();
    rt.expect_send(
        EXPERT_FUND_ACTOR_ADDR,
        BATCH_CHECK_DATA_METHOD,
        IpldBlock::serialize_cbor(&BatchCheckDataParams { checked_pieces }).unwrap(),
        TokenAmount::zero(),
        None,
        exit_code,
    );
}

pub fn expect_stored_any(
    rt: &mut MockRuntime,
    provider: Address,
    deals: &[ClientDealProposal],
    stored: bool,
    exit_code: ExitCode,
) {
    let pieces: Vec<Cid> = deals.iter().map(|d| d.proposal.piece_cid).collect();
    rt.expect_send(
        provider,
        STORED_ANY_METHOD,
        IpldBlock::serialize_cbor(&BatchPieceCidParams::new(&pieces)).unwrap(),
        TokenAmount::zero(),
        IpldBlock::serialize_cbor(&stored).unwrap(),
        exit_code,
    );
}

pub fn expect_verify_deal_signature(rt: &MockRuntime, deal: &ClientDealProposal) {
    rt.expect_verify_signature(ExpectedVerifySig {
        sig: deal.client_signature.clone(),
        signer: deal.proposal.client,
        plaintext: serialize_vec(&deal.proposal, "deal proposal").unwrap(),
        result: Ok(()),
    });
}

pub fn expect_deal_randomness(rt: &mut MockRuntime, proposal: &DealProposal, out: [u8; 32]) {
    let epoch = rt.epoch - 1;
    rt.expect_get_randomness_from_beacon(
        DomainSeparationTag::MarketDealCronSeed,
        epoch,
        serialize_vec(proposal, "deal proposal").unwrap(),
        out,
    );
}

/// Sets up every expectation a fully successful publish from the worker meets, and publishes.
pub fn publish_deals(
    rt: &mut MockRuntime,
    addrs: &MinerAddresses,
    proposals: &[DealProposal],
    randomness: [u8; 32],
) -> Vec<DealID> {
    let deals: Vec<ClientDealProposal> = proposals.iter().map(sign_proposal).collect();
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, addrs.worker);
    rt.expect_validate_caller_type(CALLER_TYPES_SIGNABLE.to_vec());
    expect_provider_control_address(rt, addrs);
    expect_batch_check_data(rt, &deals, ExitCode::OK);
    expect_stored_any(rt, addrs.provider, &deals, false, ExitCode::OK);
    for deal in &deals {
        expect_verify_deal_signature(rt, deal);
        expect_deal_randomness(rt, &deal.proposal, randomness);
    }

    let ret: PublishStorageDealsReturn = rt
        .call::<MarketActor>(
            Method::PublishStorageDeals as u64,
            IpldBlock::serialize_cbor(&PublishStorageDealsParams { deals }).unwrap(),
        )
        .unwrap()
        .unwrap()
        .deserialize()
        .unwrap();
    rt.verify();

    assert_eq!(proposals.len(), ret.ids.len());
    for (id, proposal) in ret.ids.iter().zip(proposals) {
        assert_eq!(Some(proposal.clone()), get_deal_proposal(rt, *id));
    }
    ret.ids
}

/// Publishes signed deals from the worker, expecting the call to fail after the
/// external checks have passed. The first `verified` deals have their signature checked
/// and the first `scheduled` of them draw a process epoch before the failure.
pub fn publish_deals_expect_abort(
    rt: &mut MockRuntime,
    addrs: &MinerAddresses,
    deals: Vec<ClientDealProposal>,
    verified: usize,
    scheduled: usize,
    exit_code: ExitCode,
    msg: &str,
) {
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, addrs.worker);
    rt.expect_validate_caller_type(CALLER_TYPES_SIGNABLE.to_vec());
    expect_provider_control_address(rt, addrs);
    expect_batch_check_data(rt, &deals, ExitCode::OK);
    expect_stored_any(rt, addrs.provider, &deals, false, ExitCode::OK);
    for deal in deals.iter().take(verified) {
        expect_verify_deal_signature(rt, deal);
    }
    for deal in deals.iter().take(scheduled) {
        expect_deal_randomness(rt, &deal.proposal, ZERO_RANDOMNESS);
    }

    let res = rt.call::<MarketActor>(
        Method::PublishStorageDeals as u64,
        IpldBlock::serialize_cbor(&PublishStorageDealsParams { deals }).unwrap(),
    );
    expect_abort_contains_message(exit_code, msg, res);
    rt.reset();
}

pub fn activate_deals(
    rt: &mut MockRuntime,
    epoch: ChainEpoch,
    provider: Address,
    deal_ids: &[DealID],
) -> ActivateDealsReturn {
    rt.set_epoch(epoch);
    rt.set_caller(*MINER_ACTOR_CODE_ID, provider);
    rt.expect_validate_caller_type(vec![Type::Miner]);

    expect_batch_store_data(rt, deal_ids, ExitCode::OK);

    let ret: ActivateDealsReturn = rt
        .call::<MarketActor>(
            Method::ActivateDeals as u64,
            IpldBlock::serialize_cbor(&ActivateDealsParams { deal_ids: deal_ids.to_vec() })
                .unwrap(),
        )
        .unwrap()
        .unwrap()
        .deserialize()
        .unwrap();
    rt.verify();

    for id in deal_ids {
        let state = get_deal_state(rt, *id).unwrap();
        assert_eq!(epoch, state.sector_start_epoch);
    }
    ret
}

/// Queues the expert fund notification for the pieces of the activated deals.
pub fn expect_batch_store_data(rt: &mut MockRuntime, deal_ids: &[DealID], exit_code: ExitCode) {
    let pieces: Vec<Cid> =
        deal_ids.iter().map(|id| get_deal_proposal(rt, *id).unwrap().piece_cid).collect();
    rt.expect_send(
        EXPERT_FUND_ACTOR_ADDR,
        BATCH_STORE_DATA_METHOD,
        IpldBlock::serialize_cbor(&BatchPieceCidParams::new(&pieces)).unwrap(),
        TokenAmount::zero(),
        None,
        exit_code,
    );
}

pub fn activate_deals_raw(
    rt: &mut MockRuntime,
    epoch: ChainEpoch,
    provider: Address,
    deal_ids: &[DealID],
) -> Result<Option<IpldBlock>, ActorError> {
    rt.set_epoch(epoch);
    rt.set_caller(*MINER_ACTOR_CODE_ID, provider);
    rt.expect_validate_caller_type(vec![Type::Miner]);
    let ret = rt.call::<MarketActor>(
        Method::ActivateDeals as u64,
        IpldBlock::serialize_cbor(&ActivateDealsParams { deal_ids: deal_ids.to_vec() }).unwrap(),
    );
    rt.verify();
    ret
}

pub fn terminate_deals(
    rt: &mut MockRuntime,
    provider: Address,
    epoch: ChainEpoch,
    deal_ids: &[DealID],
) -> Result<Option<IpldBlock>, ActorError> {
    rt.set_caller(*MINER_ACTOR_CODE_ID, provider);
    rt.expect_validate_caller_type(vec![Type::Miner]);
    let params = OnMinerSectorsTerminateParams { epoch, deal_ids: deal_ids.to_vec() };
    let ret = rt.call::<MarketActor>(
        Method::OnMinerSectorsTerminate as u64,
        IpldBlock::serialize_cbor(&params).unwrap(),
    );
    rt.verify();
    ret
}

pub fn cron_tick(rt: &mut MockRuntime) {
    rt.set_caller(*CRON_ACTOR_CODE_ID, CRON_ACTOR_ADDR);
    rt.expect_validate_caller_addr(vec![CRON_ACTOR_ADDR]);
    assert!(rt.call::<MarketActor>(Method::CronTick as u64, None).unwrap().is_none());
    rt.verify();
}

pub fn cron_tick_at(rt: &mut MockRuntime, epoch: ChainEpoch) {
    rt.set_epoch(epoch);
    cron_tick(rt);
}

/// Queues the govern actor's answer to whether `caller` holds `method`.
pub fn expect_validate_granted(
    rt: &mut MockRuntime,
    caller: Address,
    method: Method,
    exit_code: ExitCode,
) {
    rt.expect_send(
        GOVERN_ACTOR_ADDR,
        GOVERN_VALIDATE_GRANTED_METHOD,
        IpldBlock::serialize_cbor(&ValidateGrantedParams { caller, method: method as u64 })
            .unwrap(),
        TokenAmount::zero(),
        None,
        exit_code,
    );
}

pub fn get_deal_proposal(rt: &MockRuntime, deal_id: DealID) -> Option<DealProposal> {
    let st: State = rt.get_state();
    st.find_proposal(rt.store(), deal_id).unwrap()
}

pub fn get_deal_state(rt: &MockRuntime, deal_id: DealID) -> Option<DealState> {
    let st: State = rt.get_state();
    st.find_deal_state(rt.store(), deal_id).unwrap()
}

pub fn get_quota(rt: &MockRuntime, piece_cid: &Cid) -> Option<i64> {
    let st: State = rt.get_state();
    st.get_quota(rt.store(), piece_cid).unwrap()
}

pub fn has_pending_proposal(rt: &MockRuntime, proposal: &DealProposal) -> bool {
    let st: State = rt.get_state();
    let pcid = epik_actor_market::testing::deal_cid(proposal).unwrap();
    st.has_pending_deal(rt.store(), &pcid).unwrap()
}

pub fn has_provider_pending(rt: &MockRuntime, provider: &Address, piece_cid: &Cid) -> bool {
    let st: State = rt.get_state();
    st.has_provider_pending(rt.store(), provider, piece_cid).unwrap()
}

pub fn deals_scheduled_at(rt: &MockRuntime, epoch: ChainEpoch) -> Vec<DealID> {
    let st: State = rt.get_state();
    let mut ids = st.get_deals_for_epoch(rt.store(), epoch).unwrap();
    ids.sort();
    ids
}
