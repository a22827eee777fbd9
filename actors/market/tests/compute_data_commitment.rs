// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::deal::DealID;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PieceInfo;
use fvm_shared::sector::RegisteredSealProof;

use epik_actor_market::{Actor as MarketActor, ComputeDataCommitmentParams, Method};
use epik_actors_runtime::runtime::Type;
use epik_actors_runtime::test_utils::*;
use epik_actors_runtime::ActorError;

mod harness;
use harness::*;

const SECTOR_TYPE: RegisteredSealProof = RegisteredSealProof::StackedDRG2KiBV1P1;

fn compute(rt: &mut MockRuntime, deal_ids: Vec<DealID>) -> Result<Cid, ActorError> {
    rt.set_caller(*MINER_ACTOR_CODE_ID, PROVIDER_ADDR);
    rt.expect_validate_caller_type(vec![Type::Miner]);
    let params = ComputeDataCommitmentParams { deal_ids, sector_type: SECTOR_TYPE };
    let ret = rt.call::<MarketActor>(
        Method::ComputeDataCommitment as u64,
        IpldBlock::serialize_cbor(&params).unwrap(),
    );
    rt.verify();
    ret.map(|r| r.unwrap().deserialize().unwrap())
}

fn publish_two(rt: &mut MockRuntime) -> (Vec<DealID>, Vec<PieceInfo>) {
    let addrs = MinerAddresses::default();
    rt.set_epoch(1);
    let p1 = generate_deal_proposal(CLIENT_ADDR, PROVIDER_ADDR, "cd1", 100);
    let p2 = generate_deal_proposal(CLIENT_ADDR, PROVIDER_ADDR, "cd2", 100);
    let ids = publish_deals(rt, &addrs, &[p1.clone(), p2.clone()], ZERO_RANDOMNESS);
    (ids, vec![p1.piece_info(), p2.piece_info()])
}

#[test]
fn commitment_covers_pieces_in_deal_order() {
    let mut rt = setup();
    let (ids, pieces) = publish_two(&mut rt);
    let comm_d = make_piece_cid(b"unsealed sector");

    rt.expect_compute_unsealed_sector_cid(
        SECTOR_TYPE,
        vec![pieces[1].clone(), pieces[0].clone()],
        comm_d,
        ExitCode::OK,
    );
    assert_eq!(comm_d, compute(&mut rt, vec![ids[1], ids[0]]).unwrap());
    check_state(&rt);
}

#[test]
fn commitment_of_no_deals_still_asks_the_host() {
    let mut rt = setup();
    let comm_d = make_piece_cid(b"zero sector");
    rt.expect_compute_unsealed_sector_cid(SECTOR_TYPE, vec![], comm_d, ExitCode::OK);
    assert_eq!(comm_d, compute(&mut rt, vec![]).unwrap());
}

#[test]
fn fails_for_missing_deal() {
    let mut rt = setup();
    let (ids, _) = publish_two(&mut rt);
    expect_abort_contains_message(
        ExitCode::USR_NOT_FOUND,
        "proposal doesn't exist",
        compute(&mut rt, vec![ids[0], 77]),
    );
}

#[test]
fn fails_when_syscall_fails() {
    let mut rt = setup();
    let (ids, pieces) = publish_two(&mut rt);
    rt.expect_compute_unsealed_sector_cid(
        SECTOR_TYPE,
        pieces,
        make_piece_cid(b"unused"),
        ExitCode::USR_ILLEGAL_STATE,
    );
    expect_abort_contains_message(
        ExitCode::USR_ILLEGAL_ARGUMENT,
        "failed to compute unsealed sector CID",
        compute(&mut rt, ids),
    );
}
