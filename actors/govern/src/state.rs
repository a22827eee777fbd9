// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::{BTreeMap, BTreeSet};

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::MethodNum;

use epik_actors_runtime::{ActorContext, ActorError, Config, Map2, DEFAULT_HAMT_CONFIG};

use crate::{Authority, GovernedMethods};

pub type GovernorsMap<BS> = Map2<BS, Address, Vec<Authority>>;
pub const GOVERNORS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

/// Govern actor state
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone)]
pub struct State {
    /// The only address allowed to grant and revoke privileges.
    pub supervisor: Address,
    /// Authorities held by each governor, sorted by actor code with ascending methods.
    /// HAMT[Address][]Authority
    pub governors: Cid,
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS, supervisor: Address) -> Result<State, ActorError> {
        let governors = GovernorsMap::flush_empty(store, GOVERNORS_CONFIG)
            .context("failed to create empty governors map")?;
        Ok(State { supervisor, governors })
    }

    pub fn load_governors<BS: Blockstore>(&self, store: BS) -> Result<GovernorsMap<BS>, ActorError> {
        GovernorsMap::load(store, &self.governors, GOVERNORS_CONFIG, "governors")
    }

    pub fn get_authorities<BS: Blockstore>(
        &self,
        store: &BS,
        governor: &Address,
    ) -> Result<Vec<Authority>, ActorError> {
        Ok(self.load_governors(store)?.get(governor)?.cloned().unwrap_or_default())
    }

    pub fn is_granted<BS: Blockstore>(
        &self,
        store: &BS,
        governor: &Address,
        code_id: &Cid,
        method: MethodNum,
    ) -> Result<bool, ActorError> {
        let authorities = self.get_authorities(store, governor)?;
        Ok(authorities
            .iter()
            .find(|a| a.actor_code_id == *code_id)
            .map_or(false, |a| a.methods.binary_search(&method).is_ok()))
    }

    /// Adds (`grant`) or removes the `targets` privileges of `governor`.
    /// A governor left without privileges is dropped from the map.
    pub fn grant_or_revoke<BS: Blockstore>(
        &mut self,
        store: &BS,
        governor: &Address,
        targets: &GovernedMethods,
        grant: bool,
    ) -> Result<(), ActorError> {
        let mut governors = self.load_governors(store)?;

        let mut held: BTreeMap<Cid, BTreeSet<MethodNum>> = governors
            .get(governor)?
            .map(|authorities| {
                authorities
                    .iter()
                    .map(|a| (a.actor_code_id, a.methods.iter().copied().collect()))
                    .collect()
            })
            .unwrap_or_default();

        for (code, methods) in targets {
            if grant {
                held.entry(*code).or_default().extend(methods.iter().copied());
            } else if let Some(current) = held.get_mut(code) {
                current.retain(|m| !methods.contains(m));
                if current.is_empty() {
                    held.remove(code);
                }
            }
        }

        if held.is_empty() {
            governors.delete(governor)?;
        } else {
            let authorities = held
                .into_iter()
                .map(|(actor_code_id, methods)| Authority {
                    actor_code_id,
                    methods: methods.into_iter().collect(),
                })
                .collect();
            governors
                .set(governor, authorities)
                .with_context(|| format!("failed to set authorities of {}", governor))?;
        }

        self.governors = governors.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epik_actors_runtime::runtime::Type;
    use fvm_ipld_blockstore::MemoryBlockstore;

    fn market_methods(methods: &[MethodNum]) -> GovernedMethods {
        BTreeMap::from([(Type::Market.code_cid(), methods.iter().copied().collect())])
    }

    #[test]
    fn grant_then_revoke_drops_governor() {
        let store = MemoryBlockstore::default();
        let mut st = State::new(&store, Address::new_id(100)).unwrap();
        let empty_root = st.governors;
        let governor = Address::new_id(200);
        let market = Type::Market.code_cid();

        st.grant_or_revoke(&store, &governor, &market_methods(&[9, 8]), true).unwrap();
        assert_eq!(
            vec![Authority { actor_code_id: market, methods: vec![8, 9] }],
            st.get_authorities(&store, &governor).unwrap()
        );
        assert!(st.is_granted(&store, &governor, &market, 8).unwrap());
        assert!(!st.is_granted(&store, &governor, &Type::Miner.code_cid(), 8).unwrap());

        st.grant_or_revoke(&store, &governor, &market_methods(&[8]), false).unwrap();
        assert!(!st.is_granted(&store, &governor, &market, 8).unwrap());
        assert!(st.is_granted(&store, &governor, &market, 9).unwrap());

        st.grant_or_revoke(&store, &governor, &market_methods(&[9]), false).unwrap();
        assert!(st.get_authorities(&store, &governor).unwrap().is_empty());
        assert_eq!(empty_root, st.governors);
    }

    #[test]
    fn revoking_ungranted_methods_is_a_no_op() {
        let store = MemoryBlockstore::default();
        let mut st = State::new(&store, Address::new_id(100)).unwrap();
        let governor = Address::new_id(200);

        st.grant_or_revoke(&store, &governor, &market_methods(&[8]), false).unwrap();
        assert!(st.get_authorities(&store, &governor).unwrap().is_empty());
    }
}
