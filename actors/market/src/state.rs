// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::clock::{ChainEpoch, EPOCH_UNDEFINED};
use fvm_shared::deal::DealID;

use epik_actors_runtime::{
    ActorContext, ActorError, Array, Config, Map2, SetMultimap, SetMultimapConfig,
    DEFAULT_HAMT_CONFIG,
};

use crate::balance_table::BalanceTable;

use super::policy::*;
use super::{DataIndex, DealProposal, DealState, PendingProposal, ProviderDataIndex};

/// Market actor state
#[derive(Clone, Default, Serialize_tuple, Deserialize_tuple, Debug)]
pub struct State {
    /// Proposals are deals that have been proposed and not yet cleaned up after expiry or termination.
    /// Array<DealID, DealProposal>
    pub proposals: Cid,

    // States contains state for deals that have been activated and not yet cleaned up after termination.
    // Invariant: keys(States) ⊆ keys(Proposals).
    /// Array<DealID, DealState>
    pub states: Cid,

    /// PendingProposals tracks dealProposals that have not yet been processed by cron.
    /// We track them here to ensure that miners can't publish the same deal proposal twice.
    /// HAMT[Cid]PendingProposal
    pub pending_proposals: Cid,

    /// Pieces each provider has in pending proposals.
    /// SetMultimap<Address, Cid>
    pub provider_pendings: Cid,

    /// Escrow and locked funds. Deals are free, so both stay empty.
    pub escrow_table: Cid,
    pub locked_table: Cid,

    /// Deal id state sequential incrementer
    pub next_id: DealID,

    /// Metadata cached for efficient iteration over deals.
    /// SetMultimap<ChainEpoch, DealID>
    pub deals_by_epoch: Cid,
    pub last_cron: ChainEpoch,

    /// Remaining winning activations per piece.
    /// HAMT[Cid]i64
    pub quotas: Cid,

    /// Pieces activated in each epoch, grouped by provider.
    /// HAMT[ChainEpoch][]ProviderDataIndex
    pub data_index: Cid,

    /// Quota assigned to a piece on its first activation.
    pub initial_quota: i64,
}

pub type DealArray<BS> = Array<BS, DealProposal>;
pub type DealMetaArray<BS> = Array<BS, DealState>;

pub type PendingProposalsMap<BS> = Map2<BS, Cid, PendingProposal>;
pub const PENDING_PROPOSALS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

pub type ProviderPendings<BS> = SetMultimap<BS, Address, Cid>;
pub const PROVIDER_PENDINGS_CONFIG: SetMultimapConfig =
    SetMultimapConfig { outer: DEFAULT_HAMT_CONFIG, inner: DEFAULT_HAMT_CONFIG };

pub type DealsByEpoch<BS> = SetMultimap<BS, ChainEpoch, DealID>;
pub const DEALS_BY_EPOCH_CONFIG: SetMultimapConfig =
    SetMultimapConfig { outer: DEFAULT_HAMT_CONFIG, inner: DEFAULT_HAMT_CONFIG };

pub type QuotasMap<BS> = Map2<BS, Cid, i64>;
pub const QUOTAS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

pub type DataIndexMap<BS> = Map2<BS, ChainEpoch, Vec<ProviderDataIndex>>;
pub const DATA_INDEX_CONFIG: Config = DEFAULT_HAMT_CONFIG;

impl State {
    pub fn new<BS: Blockstore>(store: &BS) -> Result<Self, ActorError> {
        let empty_proposals_array = DealArray::flush_empty(store, PROPOSALS_AMT_BITWIDTH)
            .context("failed to create empty proposals array")?;
        let empty_states_array = DealMetaArray::flush_empty(store, STATES_AMT_BITWIDTH)
            .context("failed to create empty states array")?;

        let empty_pending_proposals =
            PendingProposalsMap::flush_empty(store, PENDING_PROPOSALS_CONFIG)?;
        let empty_provider_pendings =
            ProviderPendings::empty(store, PROVIDER_PENDINGS_CONFIG, "provider pendings")
                .flush()?;
        let empty_balance_table = BalanceTable::new(store, "balance table").root()?;
        let empty_deals_by_epoch =
            DealsByEpoch::empty(store, DEALS_BY_EPOCH_CONFIG, "deals by epoch").flush()?;
        let empty_quotas = QuotasMap::flush_empty(store, QUOTAS_CONFIG)?;
        let empty_data_index = DataIndexMap::flush_empty(store, DATA_INDEX_CONFIG)?;

        Ok(Self {
            proposals: empty_proposals_array,
            states: empty_states_array,
            pending_proposals: empty_pending_proposals,
            provider_pendings: empty_provider_pendings,
            escrow_table: empty_balance_table,
            locked_table: empty_balance_table,
            next_id: 0,
            deals_by_epoch: empty_deals_by_epoch,
            last_cron: EPOCH_UNDEFINED,
            quotas: empty_quotas,
            data_index: empty_data_index,
            initial_quota: DEFAULT_INITIAL_QUOTA,
        })
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Deal proposals and states
    ////////////////////////////////////////////////////////////////////////////////

    pub fn load_proposals<BS: Blockstore>(&self, store: BS) -> Result<DealArray<BS>, ActorError> {
        DealArray::load(store, &self.proposals, "deal proposals")
    }

    pub fn find_proposal<BS: Blockstore>(
        &self,
        store: &BS,
        deal_id: DealID,
    ) -> Result<Option<DealProposal>, ActorError> {
        let proposals = self.load_proposals(store)?;
        find_proposal(&proposals, deal_id)
    }

    pub fn put_deal_proposals<BS: Blockstore>(
        &mut self,
        store: &BS,
        new_deal_proposals: &[(DealID, DealProposal)],
    ) -> Result<(), ActorError> {
        if new_deal_proposals.is_empty() {
            return Ok(());
        }
        let mut proposals = self.load_proposals(store)?;
        for (deal_id, proposal) in new_deal_proposals {
            proposals
                .set(*deal_id, proposal.clone())
                .with_context(|| format!("failed to set deal proposal {}", deal_id))?;
        }
        self.proposals = proposals.flush()?;
        Ok(())
    }

    pub fn load_deal_states<BS: Blockstore>(
        &self,
        store: BS,
    ) -> Result<DealMetaArray<BS>, ActorError> {
        DealMetaArray::load(store, &self.states, "deal states")
    }

    pub fn find_deal_state<BS: Blockstore>(
        &self,
        store: &BS,
        deal_id: DealID,
    ) -> Result<Option<DealState>, ActorError> {
        let states = self.load_deal_states(store)?;
        find_deal_state(&states, deal_id)
    }

    pub fn put_deal_states<BS: Blockstore>(
        &mut self,
        store: &BS,
        new_deal_states: &[(DealID, DealState)],
    ) -> Result<(), ActorError> {
        if new_deal_states.is_empty() {
            return Ok(());
        }
        let mut states = self.load_deal_states(store)?;
        for (deal_id, deal_state) in new_deal_states {
            states
                .set(*deal_id, *deal_state)
                .with_context(|| format!("failed to set deal state {}", deal_id))?;
        }
        self.states = states.flush()?;
        Ok(())
    }

    pub fn generate_storage_deal_id(&mut self) -> DealID {
        let ret = self.next_id;
        self.next_id += 1;
        ret
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Pending proposals
    ////////////////////////////////////////////////////////////////////////////////

    pub fn load_pending_deals<BS: Blockstore>(
        &self,
        store: BS,
    ) -> Result<PendingProposalsMap<BS>, ActorError> {
        PendingProposalsMap::load(
            store,
            &self.pending_proposals,
            PENDING_PROPOSALS_CONFIG,
            "pending proposals",
        )
    }

    pub fn has_pending_deal<BS: Blockstore>(
        &self,
        store: &BS,
        key: &Cid,
    ) -> Result<bool, ActorError> {
        self.load_pending_deals(store)?.contains_key(key)
    }

    pub fn get_pending_deal<BS: Blockstore>(
        &self,
        store: &BS,
        key: &Cid,
    ) -> Result<Option<PendingProposal>, ActorError> {
        Ok(self.load_pending_deals(store)?.get(key)?.cloned())
    }

    pub fn put_pending_deals<BS: Blockstore>(
        &mut self,
        store: &BS,
        new_pending_deals: &[(Cid, PendingProposal)],
    ) -> Result<(), ActorError> {
        if new_pending_deals.is_empty() {
            return Ok(());
        }
        let mut pending_deals = self.load_pending_deals(store)?;
        for (key, pending) in new_pending_deals {
            pending_deals.set(key, pending.clone())?;
        }
        self.pending_proposals = pending_deals.flush()?;
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Provider pendings
    ////////////////////////////////////////////////////////////////////////////////

    pub fn load_provider_pendings<BS: Blockstore + Clone>(
        &self,
        store: BS,
    ) -> Result<ProviderPendings<BS>, ActorError> {
        ProviderPendings::load(
            store,
            &self.provider_pendings,
            PROVIDER_PENDINGS_CONFIG,
            "provider pendings",
        )
    }

    pub fn has_provider_pending<BS: Blockstore>(
        &self,
        store: &BS,
        provider: &Address,
        piece_cid: &Cid,
    ) -> Result<bool, ActorError> {
        self.load_provider_pendings(store)?.has(provider, piece_cid)
    }

    pub fn put_provider_pendings<BS: Blockstore>(
        &mut self,
        store: &BS,
        provider: &Address,
        piece_cids: &[Cid],
    ) -> Result<(), ActorError> {
        if piece_cids.is_empty() {
            return Ok(());
        }
        let mut pendings = self.load_provider_pendings(store)?;
        pendings
            .put_many(provider, piece_cids)
            .with_context(|| format!("failed to put pending pieces of provider {}", provider))?;
        self.provider_pendings = pendings.flush()?;
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Deals by epoch
    ////////////////////////////////////////////////////////////////////////////////

    pub fn load_deals_by_epoch<BS: Blockstore + Clone>(
        &self,
        store: BS,
    ) -> Result<DealsByEpoch<BS>, ActorError> {
        DealsByEpoch::load(store, &self.deals_by_epoch, DEALS_BY_EPOCH_CONFIG, "deals by epoch")
    }

    pub fn put_deals_by_epoch<BS: Blockstore>(
        &mut self,
        store: &BS,
        new_deals_by_epoch: &[(ChainEpoch, DealID)],
    ) -> Result<(), ActorError> {
        if new_deals_by_epoch.is_empty() {
            return Ok(());
        }
        let mut deals_by_epoch = self.load_deals_by_epoch(store)?;
        for (epoch, id) in new_deals_by_epoch {
            deals_by_epoch
                .put(epoch, *id)
                .with_context(|| format!("failed to schedule deal {} at {}", id, epoch))?;
        }
        self.deals_by_epoch = deals_by_epoch.flush()?;
        Ok(())
    }

    pub fn get_deals_for_epoch<BS: Blockstore>(
        &self,
        store: &BS,
        key: ChainEpoch,
    ) -> Result<Vec<DealID>, ActorError> {
        self.load_deals_by_epoch(store)?
            .values_of(&key)
            .with_context(|| format!("failed to iterate deals for epoch {}", key))
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Quotas
    ////////////////////////////////////////////////////////////////////////////////

    pub fn load_quotas<BS: Blockstore>(&self, store: BS) -> Result<QuotasMap<BS>, ActorError> {
        QuotasMap::load(store, &self.quotas, QUOTAS_CONFIG, "quotas")
    }

    pub fn get_quota<BS: Blockstore>(
        &self,
        store: &BS,
        piece_cid: &Cid,
    ) -> Result<Option<i64>, ActorError> {
        Ok(self.load_quotas(store)?.get(piece_cid)?.copied())
    }

    pub fn put_quotas<BS: Blockstore>(
        &mut self,
        store: &BS,
        new_quotas: &[(Cid, i64)],
    ) -> Result<(), ActorError> {
        if new_quotas.is_empty() {
            return Ok(());
        }
        let mut quotas = self.load_quotas(store)?;
        for (piece_cid, quota) in new_quotas {
            quotas.set(piece_cid, *quota)?;
        }
        self.quotas = quotas.flush()?;
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Data index
    ////////////////////////////////////////////////////////////////////////////////

    pub fn load_data_index<BS: Blockstore>(
        &self,
        store: BS,
    ) -> Result<DataIndexMap<BS>, ActorError> {
        DataIndexMap::load(store, &self.data_index, DATA_INDEX_CONFIG, "data index")
    }

    /// Returns the pieces activated at `epoch`, grouped by provider.
    pub fn get_data_index<BS: Blockstore>(
        &self,
        store: &BS,
        epoch: ChainEpoch,
    ) -> Result<Vec<ProviderDataIndex>, ActorError> {
        Ok(self.load_data_index(store)?.get(&epoch)?.cloned().unwrap_or_default())
    }

    /// Appends `(provider, index)` entries to those already recorded at `epoch`.
    /// Providers keep the order in which they first appear.
    pub fn append_data_index<BS: Blockstore>(
        &mut self,
        store: &BS,
        epoch: ChainEpoch,
        entries: Vec<(Address, DataIndex)>,
    ) -> Result<(), ActorError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut data_index = self.load_data_index(store)?;
        let mut merged = data_index.get(&epoch)?.cloned().unwrap_or_default();
        for (provider, index) in entries {
            match merged.iter_mut().find(|pdi| pdi.provider == provider) {
                Some(pdi) => pdi.indexes.push(index),
                None => merged.push(ProviderDataIndex { provider, indexes: vec![index] }),
            }
        }
        data_index.set(&epoch, merged)?;
        self.data_index = data_index.flush()?;
        Ok(())
    }
}

pub fn find_proposal<BS>(
    proposals: &DealArray<BS>,
    deal_id: DealID,
) -> Result<Option<DealProposal>, ActorError>
where
    BS: Blockstore,
{
    let proposal = proposals
        .get(deal_id)
        .with_context(|| format!("failed to load deal proposal {}", deal_id))?;
    Ok(proposal.cloned())
}

pub fn find_deal_state<BS>(
    states: &DealMetaArray<BS>,
    deal_id: DealID,
) -> Result<Option<DealState>, ActorError>
where
    BS: Blockstore,
{
    let state =
        states.get(deal_id).with_context(|| format!("failed to load deal state {}", deal_id))?;
    Ok(state.copied())
}
