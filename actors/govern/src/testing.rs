// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;

use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::{Address, Protocol};

use epik_actors_runtime::MessageAccumulator;

use crate::{governed_actors, Authority, State};

pub struct StateSummary {
    pub governors: BTreeMap<Address, Vec<Authority>>,
}

/// Checks internal invariants of govern state.
pub fn check_state_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();
    let mut governors = BTreeMap::new();

    acc.require(
        state.supervisor.protocol() == Protocol::ID,
        format!("supervisor {} should have ID protocol", state.supervisor),
    );

    match state.load_governors(store) {
        Ok(map) => {
            let ret = map.for_each(|governor, authorities| {
                acc.require(
                    governor.protocol() == Protocol::ID,
                    format!("governor {governor} should have ID protocol"),
                );
                acc.require(!authorities.is_empty(), format!("governor {governor} has no authority"));
                acc.require(
                    authorities.windows(2).all(|w| w[0].actor_code_id < w[1].actor_code_id),
                    format!("authorities of {governor} not sorted by code or duplicated"),
                );
                for authority in authorities {
                    let code = authority.actor_code_id;
                    acc.require(
                        !authority.methods.is_empty(),
                        format!("governor {governor} holds no method of {code}"),
                    );
                    acc.require(
                        authority.methods.windows(2).all(|w| w[0] < w[1]),
                        format!("methods of {governor} on {code} not ascending"),
                    );
                    match governed_actors().get(&code) {
                        Some(governed) => acc.require(
                            authority.methods.iter().all(|m| governed.contains(m)),
                            format!("governor {governor} holds ungoverned method of {code}"),
                        ),
                        None => acc.add(format!("governor {governor} holds ungoverned code {code}")),
                    }
                }
                governors.insert(governor, authorities.clone());
                Ok(())
            });
            acc.require_no_error(ret, "error iterating governors");
        }
        Err(e) => acc.add(format!("error loading governors: {e}")),
    }

    (StateSummary { governors }, acc)
}
