// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::error::ExitCode;

use epik_actor_market::policy::DEFAULT_INITIAL_QUOTA;
use epik_actor_market::{
    Actor as MarketActor, Method, NewQuota, ResetQuotasParams, SetInitialQuotaParams, State,
};
use epik_actors_runtime::runtime::CALLER_TYPES_SIGNABLE;
use epik_actors_runtime::test_utils::*;
use epik_actors_runtime::ActorError;

mod harness;
use harness::*;

/// Publishes and activates a deal so that its piece has a quota entry.
fn activated_piece(rt: &mut MockRuntime) -> Cid {
    let addrs = MinerAddresses::default();
    rt.set_epoch(1);
    let proposal = generate_deal_proposal(CLIENT_ADDR, PROVIDER_ADDR, "quota", 100);
    let ids = publish_deals(rt, &addrs, &[proposal.clone()], ZERO_RANDOMNESS);
    activate_deals(rt, 2, PROVIDER_ADDR, &ids);
    proposal.piece_cid
}

fn reset_quotas(
    rt: &mut MockRuntime,
    new_quotas: Vec<NewQuota>,
    granted: ExitCode,
) -> Result<(), ActorError> {
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, ADMIN_ADDR);
    rt.expect_validate_caller_type(CALLER_TYPES_SIGNABLE.to_vec());
    expect_validate_granted(rt, ADMIN_ADDR, Method::ResetQuotas, granted);
    let ret = rt.call::<MarketActor>(
        Method::ResetQuotas as u64,
        IpldBlock::serialize_cbor(&ResetQuotasParams { new_quotas }).unwrap(),
    );
    rt.verify();
    ret.map(|_| ())
}

fn set_initial_quota(rt: &mut MockRuntime, quota: i64, granted: Option<ExitCode>) -> Result<(), ActorError> {
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, ADMIN_ADDR);
    rt.expect_validate_caller_type(CALLER_TYPES_SIGNABLE.to_vec());
    if let Some(code) = granted {
        expect_validate_granted(rt, ADMIN_ADDR, Method::SetInitialQuota, code);
    }
    let ret = rt.call::<MarketActor>(
        Method::SetInitialQuota as u64,
        IpldBlock::serialize_cbor(&SetInitialQuotaParams { quota }).unwrap(),
    );
    rt.verify();
    ret.map(|_| ())
}

#[test]
fn reset_overwrites_known_quotas() {
    let mut rt = setup();
    let piece = activated_piece(&mut rt);
    assert_eq!(Some(DEFAULT_INITIAL_QUOTA - 1), get_quota(&rt, &piece));

    reset_quotas(&mut rt, vec![NewQuota { piece_cid: piece, quota: 0 }], ExitCode::OK).unwrap();
    assert_eq!(Some(0), get_quota(&rt, &piece));

    reset_quotas(&mut rt, vec![NewQuota { piece_cid: piece, quota: 25 }], ExitCode::OK).unwrap();
    assert_eq!(Some(25), get_quota(&rt, &piece));
    check_state(&rt);
}

#[test]
fn reset_requires_grant() {
    let mut rt = setup();
    let piece = activated_piece(&mut rt);

    expect_abort_contains_message(
        ExitCode::USR_FORBIDDEN,
        "method not granted",
        reset_quotas(
            &mut rt,
            vec![NewQuota { piece_cid: piece, quota: 1 }],
            ExitCode::USR_FORBIDDEN,
        ),
    );
    expect_abort_contains_message(
        ExitCode::USR_ILLEGAL_STATE,
        "failed to validate caller granted",
        reset_quotas(
            &mut rt,
            vec![NewQuota { piece_cid: piece, quota: 1 }],
            ExitCode::USR_ILLEGAL_STATE,
        ),
    );
    assert_eq!(Some(DEFAULT_INITIAL_QUOTA - 1), get_quota(&rt, &piece));
}

#[test]
fn reset_rejects_bad_params() {
    let mut rt = setup();
    let piece = activated_piece(&mut rt);

    expect_abort_contains_message(
        ExitCode::USR_ILLEGAL_ARGUMENT,
        "empty params",
        reset_quotas(&mut rt, vec![], ExitCode::OK),
    );

    let unknown = make_piece_cid(b"never activated");
    expect_abort_contains_message(
        ExitCode::USR_ILLEGAL_ARGUMENT,
        "piece cid not found",
        reset_quotas(
            &mut rt,
            vec![NewQuota { piece_cid: piece, quota: 3 }, NewQuota { piece_cid: unknown, quota: 3 }],
            ExitCode::OK,
        ),
    );

    expect_abort_contains_message(
        ExitCode::USR_ILLEGAL_ARGUMENT,
        "negative quota not allowed",
        reset_quotas(&mut rt, vec![NewQuota { piece_cid: piece, quota: -1 }], ExitCode::OK),
    );

    // a failed batch applies none of its entries
    assert_eq!(Some(DEFAULT_INITIAL_QUOTA - 1), get_quota(&rt, &piece));
    check_state(&rt);
}

#[test]
fn reset_requires_signable_caller() {
    let mut rt = setup();
    rt.set_caller(*MINER_ACTOR_CODE_ID, PROVIDER_ADDR);
    rt.expect_validate_caller_type(CALLER_TYPES_SIGNABLE.to_vec());
    let params = ResetQuotasParams { new_quotas: vec![] };
    expect_abort(
        ExitCode::USR_FORBIDDEN,
        rt.call::<MarketActor>(
            Method::ResetQuotas as u64,
            IpldBlock::serialize_cbor(&params).unwrap(),
        ),
    );
    rt.verify();
}

#[test]
fn initial_quota_applies_to_new_pieces() {
    let mut rt = setup();
    set_initial_quota(&mut rt, 3, Some(ExitCode::OK)).unwrap();
    let st: State = rt.get_state();
    assert_eq!(3, st.initial_quota);

    let piece = activated_piece(&mut rt);
    assert_eq!(Some(2), get_quota(&rt, &piece));
    check_state(&rt);
}

#[test]
fn initial_quota_must_be_positive() {
    let mut rt = setup();
    for quota in [0, -4] {
        expect_abort_contains_message(
            ExitCode::USR_ILLEGAL_ARGUMENT,
            "non-positive quota to set",
            set_initial_quota(&mut rt, quota, None),
        );
    }
    let st: State = rt.get_state();
    assert_eq!(DEFAULT_INITIAL_QUOTA, st.initial_quota);
}

#[test]
fn initial_quota_requires_grant() {
    let mut rt = setup();
    expect_abort_contains_message(
        ExitCode::USR_FORBIDDEN,
        "method not granted",
        set_initial_quota(&mut rt, 5, Some(ExitCode::USR_FORBIDDEN)),
    );
    let st: State = rt.get_state();
    assert_eq!(DEFAULT_INITIAL_QUOTA, st.initial_quota);
}
