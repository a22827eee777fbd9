// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeSet;

use fvm_shared::address::Address;
use fvm_shared::METHOD_CONSTRUCTOR;
use log::info;
use num_derive::FromPrimitive;

use epik_actors_runtime::runtime::{ActorCode, Runtime, CALLER_TYPES_GOVERNED};
use epik_actors_runtime::{
    actor_dispatch, actor_error, ActorError, ValidateGrantedParams, SYSTEM_ACTOR_ADDR,
};

pub use self::governed::*;
pub use self::state::*;
pub use self::types::*;

pub mod testing;

mod governed;
mod state;
mod types;

/// Govern actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    Grant = 2,
    Revoke = 3,
    ValidateGranted = 4,
}

/// Govern Actor
pub struct Actor;

impl Actor {
    /// Constructor for the govern actor, naming the supervisor of all grants.
    pub fn constructor(rt: &mut impl Runtime, supervisor: Address) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;

        let supervisor = rt.resolve_address(&supervisor).ok_or_else(|| {
            actor_error!(illegal_argument, "failed to resolve supervisor address {}", supervisor)
        })?;

        let st = State::new(rt.store(), supervisor)?;
        rt.create(&st)?;
        Ok(())
    }

    pub fn grant(rt: &mut impl Runtime, params: GrantOrRevokeParams) -> Result<(), ActorError> {
        grant_or_revoke(rt, params, true)
    }

    pub fn revoke(rt: &mut impl Runtime, params: GrantOrRevokeParams) -> Result<(), ActorError> {
        grant_or_revoke(rt, params, false)
    }

    /// Succeeds when `params.caller` holds `params.method` of the calling actor.
    pub fn validate_granted(
        rt: &mut impl Runtime,
        params: ValidateGrantedParams,
    ) -> Result<(), ActorError> {
        rt.validate_immediate_caller_type(CALLER_TYPES_GOVERNED)?;

        let governor = rt.resolve_address(&params.caller).ok_or_else(|| {
            actor_error!(illegal_argument, "failed to resolve governor address {}", params.caller)
        })?;

        let actor = rt.message().caller();
        let code_id = rt
            .get_actor_code_cid(&actor)
            .ok_or_else(|| actor_error!(illegal_argument, "no code ID for address {}", actor))?;

        let st: State = rt.state()?;
        if !st.is_granted(rt.store(), &governor, &code_id, params.method)? {
            return Err(actor_error!(
                forbidden,
                "method {} not granted to {}",
                params.method,
                governor
            ));
        }
        Ok(())
    }
}

fn grant_or_revoke(
    rt: &mut impl Runtime,
    params: GrantOrRevokeParams,
    grant: bool,
) -> Result<(), ActorError> {
    let governor = rt.resolve_address(&params.governor).ok_or_else(|| {
        actor_error!(illegal_argument, "failed to resolve governor address {}", params.governor)
    })?;

    let targets = check_grant_or_revoke_params(&params.authorities)?;
    if targets.values().all(|methods| methods.is_empty()) {
        return Err(actor_error!(
            illegal_argument,
            "no privilege to {}",
            if grant { "grant" } else { "revoke" }
        ));
    }

    let st: State = rt.state()?;
    rt.validate_immediate_caller_is(std::iter::once(&st.supervisor))?;

    rt.transaction(|st: &mut State, rt| {
        st.grant_or_revoke(rt.store(), &governor, &targets, grant)
    })?;

    info!(
        "{} {} governed actors to {}",
        if grant { "granted" } else { "revoked" },
        targets.len(),
        governor
    );
    Ok(())
}

/// Expands the requested authorities into the governed methods they name.
/// No authorities means everything governed; an authority without methods
/// means every governed method of that actor.
fn check_grant_or_revoke_params(authorities: &[Authority]) -> Result<GovernedMethods, ActorError> {
    let governed = governed_actors();
    if authorities.is_empty() {
        return Ok(governed.clone());
    }

    let mut targets = GovernedMethods::new();
    let mut seen_methods = BTreeSet::new();
    for authority in authorities {
        let code = authority.actor_code_id;
        if targets.contains_key(&code) {
            return Err(actor_error!(illegal_argument, "duplicated code {}", code));
        }
        let methods = governed
            .get(&code)
            .ok_or_else(|| actor_error!(illegal_argument, "code {} not governed", code))?;

        if authority.methods.is_empty() {
            targets.insert(code, methods.clone());
            continue;
        }

        let mut picked = BTreeSet::new();
        for method in &authority.methods {
            if !seen_methods.insert(*method) {
                return Err(actor_error!(illegal_argument, "duplicated method {}", method));
            }
            if !methods.contains(method) {
                return Err(actor_error!(
                    illegal_argument,
                    "method {} of code {} not governed",
                    method,
                    code
                ));
            }
            picked.insert(*method);
        }
        targets.insert(code, picked);
    }
    Ok(targets)
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "Govern"
    }

    actor_dispatch! {
        Constructor => constructor,
        Grant => grant,
        Revoke => revoke,
        ValidateGranted => validate_granted,
    }
}
