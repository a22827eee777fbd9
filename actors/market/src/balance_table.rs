// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;

use epik_actors_runtime::{ActorError, Config, Map2, DEFAULT_HAMT_CONFIG};

pub const BALANCE_TABLE_CONFIG: Config = Config { bit_width: 6, ..DEFAULT_HAMT_CONFIG };

/// Token amounts indexed by address.
/// Deals carry no payments, so the market only ever reads these tables.
pub struct BalanceTable<BS: Blockstore>(Map2<BS, Address, TokenAmount>);

impl<BS> BalanceTable<BS>
where
    BS: Blockstore,
{
    /// Initializes a new empty balance table
    pub fn new(bs: BS, name: &'static str) -> Self {
        Self(Map2::empty(bs, BALANCE_TABLE_CONFIG, name))
    }

    /// Initializes a balance table from a root Cid
    pub fn from_root(bs: BS, cid: &Cid, name: &'static str) -> Result<Self, ActorError> {
        Ok(Self(Map2::load(bs, cid, BALANCE_TABLE_CONFIG, name)?))
    }

    /// Retrieve root from balance table
    pub fn root(&mut self) -> Result<Cid, ActorError> {
        self.0.flush()
    }

    /// Gets token amount for given address in balance table
    pub fn get(&self, key: &Address) -> Result<TokenAmount, ActorError> {
        Ok(self.0.get(key)?.cloned().unwrap_or_else(TokenAmount::zero))
    }

    /// Returns total balance held by this balance table
    pub fn total(&self) -> Result<TokenAmount, ActorError> {
        let mut total = TokenAmount::zero();
        self.0.for_each(|_, v| {
            total += v;
            Ok(())
        })?;
        Ok(total)
    }
}
