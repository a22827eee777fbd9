// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use anyhow::anyhow;
use cid::Cid;
use fvm_ipld_blockstore::MemoryBlockstore;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::CborStore;
use fvm_shared::address::{Address, Protocol};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::commcid::{FIL_COMMITMENT_UNSEALED, SHA2_256_TRUNC254_PADDED};
use fvm_shared::crypto::signature::Signature;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PieceInfo;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::sector::RegisteredSealProof;
use fvm_shared::MethodNum;
use multihash::{Code, Multihash};
use rand::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::runtime::{ActorCode, DomainSeparationTag, MessageInfo, Primitives, Runtime, Type};
use crate::{actor_error, ActorError};

lazy_static::lazy_static! {
    pub static ref SYSTEM_ACTOR_CODE_ID: Cid = Type::System.code_cid();
    pub static ref INIT_ACTOR_CODE_ID: Cid = Type::Init.code_cid();
    pub static ref CRON_ACTOR_CODE_ID: Cid = Type::Cron.code_cid();
    pub static ref ACCOUNT_ACTOR_CODE_ID: Cid = Type::Account.code_cid();
    pub static ref POWER_ACTOR_CODE_ID: Cid = Type::Power.code_cid();
    pub static ref MINER_ACTOR_CODE_ID: Cid = Type::Miner.code_cid();
    pub static ref MARKET_ACTOR_CODE_ID: Cid = Type::Market.code_cid();
    pub static ref PAYCH_ACTOR_CODE_ID: Cid = Type::PaymentChannel.code_cid();
    pub static ref MULTISIG_ACTOR_CODE_ID: Cid = Type::Multisig.code_cid();
    pub static ref REWARD_ACTOR_CODE_ID: Cid = Type::Reward.code_cid();
    pub static ref GOVERN_ACTOR_CODE_ID: Cid = Type::Govern.code_cid();
    pub static ref EXPERT_ACTOR_CODE_ID: Cid = Type::Expert.code_cid();
    pub static ref EXPERTFUND_ACTOR_CODE_ID: Cid = Type::ExpertFund.code_cid();
    pub static ref VOTE_ACTOR_CODE_ID: Cid = Type::Vote.code_cid();
    pub static ref RETRIEVAL_ACTOR_CODE_ID: Cid = Type::Retrieval.code_cid();
    pub static ref KNOWLEDGE_ACTOR_CODE_ID: Cid = Type::Knowledge.code_cid();
}

pub struct MockRuntime {
    pub epoch: ChainEpoch,
    pub id_addresses: HashMap<Address, Address>,
    pub actor_code_cids: HashMap<Address, Cid>,
    pub receiver: Address,
    pub caller: Address,
    pub caller_type: Cid,
    pub value_received: TokenAmount,
    #[allow(clippy::type_complexity)]
    pub hash_func: Box<dyn Fn(&[u8]) -> [u8; 32]>,

    // Actor State
    pub state: Option<Cid>,
    pub balance: RefCell<TokenAmount>,

    // VM Impl
    pub in_call: bool,
    pub store: Rc<MemoryBlockstore>,
    pub in_transaction: bool,

    // Expectations
    pub expectations: RefCell<Expectations>,
}

#[derive(Default)]
pub struct Expectations {
    pub expect_validate_caller_any: bool,
    pub expect_validate_caller_addr: Option<Vec<Address>>,
    pub expect_validate_caller_type: Option<Vec<Type>>,
    pub expect_sends: VecDeque<ExpectedMessage>,
    pub expect_verify_sigs: VecDeque<ExpectedVerifySig>,
    pub expect_compute_unsealed_sector_cid: VecDeque<ExpectComputeUnsealedSectorCid>,
    pub expect_get_randomness_beacon: VecDeque<ExpectRandomness>,
}

impl Expectations {
    fn reset(&mut self) {
        *self = Default::default();
    }

    fn verify(&mut self) {
        assert!(!self.expect_validate_caller_any, "expected ValidateCallerAny, not received");
        assert!(
            self.expect_validate_caller_addr.is_none(),
            "expected ValidateCallerAddr {:?}, not received",
            self.expect_validate_caller_addr
        );
        assert!(
            self.expect_validate_caller_type.is_none(),
            "expected ValidateCallerType {:?}, not received",
            self.expect_validate_caller_type
        );
        assert!(
            self.expect_sends.is_empty(),
            "expected all message to be send, unsent messages {:?}",
            self.expect_sends
        );
        assert!(
            self.expect_verify_sigs.is_empty(),
            "expect_verify_sigs: {:?}, not received",
            self.expect_verify_sigs
        );
        assert!(
            self.expect_compute_unsealed_sector_cid.is_empty(),
            "expect_compute_unsealed_sector_cid: {:?}, not received",
            self.expect_compute_unsealed_sector_cid
        );
        assert!(
            self.expect_get_randomness_beacon.is_empty(),
            "expect_get_randomness_beacon {:?}, not received",
            self.expect_get_randomness_beacon
        );
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self {
            epoch: Default::default(),
            id_addresses: Default::default(),
            actor_code_cids: Default::default(),
            receiver: Address::new_id(0),
            caller: Address::new_id(0),
            caller_type: Default::default(),
            value_received: Default::default(),
            hash_func: Box::new(blake2b_256),
            state: Default::default(),
            balance: Default::default(),
            in_call: Default::default(),
            store: Default::default(),
            in_transaction: Default::default(),
            expectations: Default::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExpectedMessage {
    pub to: Address,
    pub method: MethodNum,
    pub params: Option<IpldBlock>,
    pub value: TokenAmount,

    // returns from applying expectedMessage
    pub send_return: Option<IpldBlock>,
    pub exit_code: ExitCode,
}

#[derive(Debug)]
pub struct ExpectedVerifySig {
    pub sig: Signature,
    pub signer: Address,
    pub plaintext: Vec<u8>,
    pub result: Result<(), anyhow::Error>,
}

#[derive(Clone, Debug)]
pub struct ExpectComputeUnsealedSectorCid {
    reg: RegisteredSealProof,
    pieces: Vec<PieceInfo>,
    cid: Cid,
    exit_code: ExitCode,
}

#[derive(Clone, Debug)]
pub struct ExpectRandomness {
    tag: DomainSeparationTag,
    epoch: ChainEpoch,
    entropy: Vec<u8>,
    out: [u8; RANDOMNESS_LENGTH],
}

pub fn expect_empty(res: Option<IpldBlock>) {
    assert!(res.is_none(), "expected empty return, got {:?}", res);
}

#[track_caller]
pub fn expect_abort_contains_message<T: fmt::Debug>(
    expect_exit_code: ExitCode,
    expect_msg: &str,
    res: Result<T, ActorError>,
) {
    let err = res.expect_err(&format!(
        "expected abort with exit code {}, but call succeeded",
        expect_exit_code
    ));
    assert_eq!(
        err.exit_code(),
        expect_exit_code,
        "expected failure with exit code {}, but failed with exit code {}; error message: {}",
        expect_exit_code,
        err.exit_code(),
        err.msg(),
    );
    assert!(
        err.msg().contains(expect_msg),
        "expected err message '{}' to contain '{}'",
        err.msg(),
        expect_msg,
    );
}

#[track_caller]
pub fn expect_abort<T: fmt::Debug>(exit_code: ExitCode, res: Result<T, ActorError>) {
    expect_abort_contains_message(exit_code, "", res);
}

impl MockRuntime {
    ///// Runtime access for tests /////

    pub fn get_state<T: DeserializeOwned>(&self) -> T {
        self.store_get(self.state.as_ref().unwrap())
    }

    pub fn replace_state<T: Serialize>(&mut self, obj: &T) {
        self.state = Some(self.store_put(obj));
    }

    pub fn set_balance(&mut self, amount: TokenAmount) {
        *self.balance.get_mut() = amount;
    }

    pub fn set_value(&mut self, value: TokenAmount) {
        self.value_received = value;
    }

    pub fn set_caller(&mut self, code_id: Cid, address: Address) {
        self.caller = address;
        self.caller_type = code_id;
        self.actor_code_cids.insert(address, code_id);
    }

    pub fn set_address_actor_type(&mut self, address: Address, actor_type: Cid) {
        self.actor_code_cids.insert(address, actor_type);
    }

    /// Registers `id` as the ID address that `source` resolves to.
    pub fn add_id_address(&mut self, source: Address, id: Address) {
        assert_eq!(id.protocol(), Protocol::ID, "target must use ID address protocol");
        self.id_addresses.insert(source, id);
    }

    pub fn get_id_address(&self, address: &Address) -> Option<Address> {
        if address.protocol() == Protocol::ID {
            return Some(*address);
        }
        self.id_addresses.get(address).cloned()
    }

    pub fn call<A: ActorCode>(
        &mut self,
        method_num: MethodNum,
        params: Option<IpldBlock>,
    ) -> Result<Option<IpldBlock>, ActorError> {
        self.in_call = true;
        let prev_state = self.state;
        let res = A::invoke_method(self, method_num, params);

        if res.is_err() {
            self.state = prev_state;
        }
        self.in_call = false;
        res
    }

    /// Verifies that all mock expectations have been met.
    #[track_caller]
    pub fn verify(&mut self) {
        self.expectations.borrow_mut().verify()
    }

    /// Clears all mock expectations.
    pub fn reset(&mut self) {
        self.expectations.borrow_mut().reset();
    }

    ///// Mock expectations /////

    pub fn expect_validate_caller_addr(&mut self, addr: Vec<Address>) {
        assert!(!addr.is_empty(), "addrs must be non-empty");
        self.expectations.get_mut().expect_validate_caller_addr = Some(addr);
    }

    pub fn expect_validate_caller_type(&mut self, types: Vec<Type>) {
        assert!(!types.is_empty(), "types must be non-empty");
        self.expectations.get_mut().expect_validate_caller_type = Some(types);
    }

    pub fn expect_validate_caller_any(&self) {
        self.expectations.borrow_mut().expect_validate_caller_any = true;
    }

    pub fn expect_verify_signature(&self, exp: ExpectedVerifySig) {
        self.expectations.borrow_mut().expect_verify_sigs.push_back(exp);
    }

    pub fn expect_compute_unsealed_sector_cid(
        &self,
        reg: RegisteredSealProof,
        pieces: Vec<PieceInfo>,
        cid: Cid,
        exit_code: ExitCode,
    ) {
        let exp = ExpectComputeUnsealedSectorCid { reg, pieces, cid, exit_code };
        self.expectations.borrow_mut().expect_compute_unsealed_sector_cid.push_back(exp);
    }

    pub fn expect_send(
        &mut self,
        to: Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
        send_return: Option<IpldBlock>,
        exit_code: ExitCode,
    ) {
        self.expectations.borrow_mut().expect_sends.push_back(ExpectedMessage {
            to,
            method,
            params,
            value,
            send_return,
            exit_code,
        })
    }

    pub fn expect_get_randomness_from_beacon(
        &mut self,
        tag: DomainSeparationTag,
        epoch: ChainEpoch,
        entropy: Vec<u8>,
        out: [u8; RANDOMNESS_LENGTH],
    ) {
        let a = ExpectRandomness { tag, epoch, entropy, out };
        self.expectations.borrow_mut().expect_get_randomness_beacon.push_back(a);
    }

    pub fn set_epoch(&mut self, epoch: ChainEpoch) {
        self.epoch = epoch;
    }

    fn require_in_call(&self) {
        assert!(self.in_call, "invalid runtime invocation outside of method call")
    }

    fn store_put<T: Serialize>(&self, o: &T) -> Cid {
        self.store.put_cbor(&o, Code::Blake2b256).unwrap()
    }

    fn store_get<T: DeserializeOwned>(&self, cid: &Cid) -> T {
        self.store.get_cbor(cid).unwrap().unwrap()
    }
}

impl MessageInfo for MockRuntime {
    fn caller(&self) -> Address {
        self.caller
    }
    fn receiver(&self) -> Address {
        self.receiver
    }
    fn value_received(&self) -> TokenAmount {
        self.value_received.clone()
    }
}

impl Runtime for MockRuntime {
    type Blockstore = Rc<MemoryBlockstore>;

    fn message(&self) -> &dyn MessageInfo {
        self.require_in_call();
        self
    }

    fn curr_epoch(&self) -> ChainEpoch {
        self.require_in_call();
        self.epoch
    }

    fn validate_immediate_caller_accept_any(&mut self) -> Result<(), ActorError> {
        self.require_in_call();
        assert!(
            self.expectations.borrow_mut().expect_validate_caller_any,
            "unexpected validate-caller-any"
        );
        self.expectations.borrow_mut().expect_validate_caller_any = false;
        Ok(())
    }

    fn validate_immediate_caller_is<'a, I>(&mut self, addresses: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Address>,
    {
        self.require_in_call();

        let addrs: Vec<Address> = addresses.into_iter().cloned().collect();

        let expected_addrs = self
            .expectations
            .borrow_mut()
            .expect_validate_caller_addr
            .take()
            .expect("unexpected validate caller addrs");
        assert_eq!(
            &addrs, &expected_addrs,
            "unexpected validate caller addrs {:?}, expected {:?}",
            addrs, expected_addrs
        );

        if addrs.contains(&self.caller) {
            return Ok(());
        }
        Err(actor_error!(forbidden;
                "caller address {:?} forbidden, allowed: {:?}",
                self.caller, &addrs
        ))
    }

    fn validate_immediate_caller_type<'a, I>(&mut self, types: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Type>,
    {
        self.require_in_call();

        let types: Vec<Type> = types.into_iter().cloned().collect();
        let expected_caller_type = self
            .expectations
            .borrow_mut()
            .expect_validate_caller_type
            .take()
            .expect("unexpected validate caller code");
        assert_eq!(
            &types, &expected_caller_type,
            "unexpected validate caller code {:?}, expected {:?}",
            types, expected_caller_type,
        );

        if types.iter().any(|t| t.code_cid() == self.caller_type) {
            return Ok(());
        }
        Err(actor_error!(forbidden; "caller type {:?} forbidden, allowed: {:?}",
                self.caller_type, types))
    }

    fn current_balance(&self) -> TokenAmount {
        self.require_in_call();
        self.balance.borrow().clone()
    }

    fn resolve_address(&self, address: &Address) -> Option<Address> {
        self.require_in_call();
        self.get_id_address(address)
    }

    fn get_actor_code_cid(&self, addr: &Address) -> Option<Cid> {
        self.require_in_call();
        self.actor_code_cids.get(addr).cloned()
    }

    fn get_randomness_from_beacon(
        &self,
        tag: DomainSeparationTag,
        epoch: ChainEpoch,
        entropy: &[u8],
    ) -> Result<[u8; RANDOMNESS_LENGTH], ActorError> {
        let expected = self
            .expectations
            .borrow_mut()
            .expect_get_randomness_beacon
            .pop_front()
            .expect("unexpected call to get_randomness_from_beacon");

        assert!(epoch <= self.epoch, "attempt to get randomness from future");
        assert_eq!(
            expected.tag, tag,
            "unexpected domain separation tag, expected: {:?}, actual: {:?}",
            expected.tag, tag
        );
        assert_eq!(
            expected.epoch, epoch,
            "unexpected epoch, expected: {:?}, actual: {:?}",
            expected.epoch, epoch
        );
        assert_eq!(
            expected.entropy, *entropy,
            "unexpected entropy, expected {:?}, actual: {:?}",
            expected.entropy, entropy
        );

        Ok(expected.out)
    }

    fn create<T: Serialize>(&mut self, obj: &T) -> Result<(), ActorError> {
        if self.state.is_some() {
            return Err(actor_error!(illegal_state; "state already constructed"));
        }
        self.state = Some(self.store_put(obj));
        Ok(())
    }

    fn state<T: DeserializeOwned>(&self) -> Result<T, ActorError> {
        let root = self.state.as_ref().ok_or_else(|| actor_error!(illegal_state; "no state"))?;
        Ok(self.store_get(root))
    }

    fn transaction<S, RT, F>(&mut self, f: F) -> Result<RT, ActorError>
    where
        S: Serialize + DeserializeOwned,
        F: FnOnce(&mut S, &mut Self) -> Result<RT, ActorError>,
    {
        if self.in_transaction {
            return Err(actor_error!(assertion_failed; "nested transaction"));
        }
        let mut read_only = self.state()?;
        self.in_transaction = true;
        let ret = f(&mut read_only, self);
        if ret.is_ok() {
            self.state = Some(self.store_put(&read_only));
        }
        self.in_transaction = false;
        ret
    }

    fn store(&self) -> &Rc<MemoryBlockstore> {
        &self.store
    }

    fn send(
        &mut self,
        to: &Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
    ) -> Result<Option<IpldBlock>, ActorError> {
        self.require_in_call();
        if self.in_transaction {
            return Err(actor_error!(assertion_failed; "side-effect within transaction"));
        }

        let expected_msg =
            self.expectations.borrow_mut().expect_sends.pop_front().unwrap_or_else(|| {
                panic!(
                    "unexpected message to: {:?} method: {:?}, value: {:?}, params: {:?}",
                    to, method, value, params
                )
            });

        assert!(
            expected_msg.to == *to
                && expected_msg.method == method
                && expected_msg.params == params
                && expected_msg.value == value,
            "message being sent does not match expectation.\n\
             Message  - to: {:?}, method: {:?}, value: {:?}, params: {:?}\n\
             Expected - to: {:?}, method: {:?}, value: {:?}, params: {:?}",
            to,
            method,
            value,
            params,
            expected_msg.to,
            expected_msg.method,
            expected_msg.value,
            expected_msg.params,
        );

        {
            let mut balance = self.balance.borrow_mut();
            if value > *balance {
                return Err(ActorError::unchecked(
                    ExitCode::SYS_SENDER_STATE_INVALID,
                    format!("cannot send value: {:?} exceeds balance: {:?}", value, *balance),
                ));
            }
            *balance -= value;
        }

        match expected_msg.exit_code {
            ExitCode::OK => Ok(expected_msg.send_return),
            x => Err(ActorError::unchecked(x, "expected message fail".to_string())),
        }
    }

    fn resolve_builtin_actor_type(&self, code_id: &Cid) -> Option<Type> {
        self.require_in_call();
        Type::from_code(code_id)
    }

    fn get_code_cid_for_type(&self, typ: Type) -> Cid {
        self.require_in_call();
        typ.code_cid()
    }
}

impl Primitives for MockRuntime {
    fn hash_blake2b(&self, data: &[u8]) -> [u8; 32] {
        (*self.hash_func)(data)
    }

    fn compute_unsealed_sector_cid(
        &self,
        reg: RegisteredSealProof,
        pieces: &[PieceInfo],
    ) -> anyhow::Result<Cid> {
        let exp = self
            .expectations
            .borrow_mut()
            .expect_compute_unsealed_sector_cid
            .pop_front()
            .expect("Unexpected syscall to ComputeUnsealedSectorCID");

        assert_eq!(exp.reg, reg, "Unexpected compute_unsealed_sector_cid : reg mismatch");
        assert!(
            exp.pieces[..].eq(pieces),
            "Unexpected compute_unsealed_sector_cid : pieces mismatch"
        );

        if exp.exit_code != ExitCode::OK {
            return Err(anyhow!(ActorError::unchecked(
                exp.exit_code,
                "Expected Failure".to_string(),
            )));
        }
        Ok(exp.cid)
    }

    fn verify_signature(
        &self,
        signature: &Signature,
        signer: &Address,
        plaintext: &[u8],
    ) -> anyhow::Result<()> {
        let exp = self.expectations.borrow_mut().expect_verify_sigs.pop_front();
        match exp {
            Some(exp) => {
                if exp.sig != *signature || exp.signer != *signer || exp.plaintext[..] != *plaintext
                {
                    panic!(
                        "unexpected signature verification\n\
                        sig: {:?}, signer: {}, plaintext: {}\n\
                        expected sig: {:?}, signer: {}, plaintext: {}",
                        signature,
                        signer,
                        hex::encode(plaintext),
                        exp.sig,
                        exp.signer,
                        hex::encode(exp.plaintext)
                    )
                }
                exp.result
            }
            None => panic!(
                "unexpected syscall to verify signature: {:?}, signer: {}, plaintext: {}",
                signature,
                signer,
                hex::encode(plaintext)
            ),
        }
    }
}

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_simd::Params::new()
        .hash_length(32)
        .to_state()
        .update(data)
        .finalize()
        .as_bytes()
        .try_into()
        .unwrap()
}

/// A piece commitment CID over a sha256 digest of `input`, standing in for a real CommP.
pub fn make_piece_cid(input: &[u8]) -> Cid {
    let digest = Sha256::digest(input);
    let hash = Multihash::wrap(SHA2_256_TRUNC254_PADDED, &digest).unwrap();
    Cid::new_v1(FIL_COMMITMENT_UNSEALED, hash)
}

pub fn new_bls_addr(s: u8) -> Address {
    let seed = [s; 32];
    let mut rng: StdRng = SeedableRng::from_seed(seed);
    let mut key = [0u8; 48];
    rng.fill_bytes(&mut key);
    Address::new_bls(&key).unwrap()
}

/// Installs the env-filtered logger once per test binary.
pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvm_shared::piece::PaddedPieceSize;

    #[test]
    fn piece_cids_carry_commitment_prefix() {
        let c = make_piece_cid(b"knowledge graph shard");
        assert_eq!(FIL_COMMITMENT_UNSEALED, c.codec());
        assert_eq!(SHA2_256_TRUNC254_PADDED, c.hash().code());
        assert_eq!(32, c.hash().size());
        assert_ne!(c, make_piece_cid(b"another shard"));
    }

    #[test]
    fn bls_addresses_are_deterministic() {
        assert_eq!(new_bls_addr(7), new_bls_addr(7));
        assert_ne!(new_bls_addr(7), new_bls_addr(8));
        assert_eq!(Protocol::BLS, new_bls_addr(1).protocol());
    }

    #[test]
    fn unsealed_cid_expectation_is_consumed() {
        let rt = MockRuntime::default();
        let piece = PieceInfo { size: PaddedPieceSize(2048), cid: make_piece_cid(b"1") };
        let out = make_piece_cid(b"commd");
        rt.expect_compute_unsealed_sector_cid(
            RegisteredSealProof::StackedDRG2KiBV1P1,
            vec![piece.clone()],
            out,
            ExitCode::OK,
        );
        let got =
            rt.compute_unsealed_sector_cid(RegisteredSealProof::StackedDRG2KiBV1P1, &[piece]);
        assert_eq!(out, got.unwrap());
        rt.expectations.borrow_mut().verify();
    }
}
