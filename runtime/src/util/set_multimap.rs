// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::marker::PhantomData;

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;

use crate::{ActorError, Config, Map2, MapKey};

use super::Set;

pub struct SetMultimapConfig {
    pub outer: Config,
    pub inner: Config,
}

/// SetMultimap is a hamt with values that are also a hamt but are of the set variant.
/// An outer key whose set becomes empty is removed, so a present key always has members.
pub struct SetMultimap<BS, K, V>
where
    BS: Blockstore,
    K: MapKey,
    V: MapKey,
{
    outer: Map2<BS, K, Cid>,
    inner_config: Config,
    value_type: PhantomData<V>,
}

impl<BS, K, V> SetMultimap<BS, K, V>
where
    BS: Blockstore + Clone,
    K: MapKey,
    V: MapKey,
{
    pub fn empty(bs: BS, config: SetMultimapConfig, name: &'static str) -> Self {
        Self {
            outer: Map2::empty(bs, config.outer, name),
            inner_config: config.inner,
            value_type: Default::default(),
        }
    }

    /// Initializes a SetMultimap from a root Cid.
    pub fn load(
        bs: BS,
        root: &Cid,
        config: SetMultimapConfig,
        name: &'static str,
    ) -> Result<Self, ActorError> {
        Ok(Self {
            outer: Map2::load(bs, root, config.outer, name)?,
            inner_config: config.inner,
            value_type: Default::default(),
        })
    }

    #[inline]
    pub fn flush(&mut self) -> Result<Cid, ActorError> {
        self.outer.flush()
    }

    /// Adds a value to the set under `key`.
    pub fn put(&mut self, key: &K, value: V) -> Result<(), ActorError> {
        self.put_many(key, std::slice::from_ref(&value))
    }

    /// Adds every value to the set under `key`, writing the set root once.
    pub fn put_many(&mut self, key: &K, values: &[V]) -> Result<(), ActorError> {
        let mut set = match self.get(key)? {
            Some(s) => s,
            None => Set::empty(self.outer.store().clone(), self.inner_config.clone(), "multimap inner"),
        };
        for v in values {
            set.put(v)?;
        }
        let new_root = set.flush()?;
        self.outer.set(key, new_root)?;
        Ok(())
    }

    /// Gets the set at the given index of the `SetMultimap`
    #[inline]
    pub fn get(&self, key: &K) -> Result<Option<Set<BS, V>>, ActorError> {
        match self.outer.get(key)? {
            Some(cid) => Ok(Some(Set::load(
                self.outer.store().clone(),
                cid,
                self.inner_config.clone(),
                "multimap inner",
            )?)),
            None => Ok(None),
        }
    }

    /// Checks whether `value` is a member of the set under `key`.
    pub fn has(&self, key: &K, value: &V) -> Result<bool, ActorError> {
        match self.get(key)? {
            Some(set) => set.has(value),
            None => Ok(false),
        }
    }

    /// Removes a value from the set under `key`.
    /// The key itself is dropped once its set is empty.
    pub fn remove(&mut self, key: &K, v: &V) -> Result<(), ActorError> {
        let mut set = match self.get(key)? {
            Some(s) => s,
            None => return Ok(()),
        };
        if !set.delete(v)? {
            return Ok(());
        }
        if set.is_empty() {
            self.outer.delete(key)?;
        } else {
            let new_root = set.flush()?;
            self.outer.set(key, new_root)?;
        }
        Ok(())
    }

    /// Removes the whole set under `key`.
    #[inline]
    pub fn remove_all(&mut self, key: &K) -> Result<(), ActorError> {
        self.outer.delete(key)?;
        Ok(())
    }

    /// Iterates over all keys and their set roots.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), ActorError>
    where
        F: FnMut(K, &Cid) -> Result<(), ActorError>,
    {
        self.outer.for_each(|k, v| f(k, v))
    }

    /// Iterates values for a key.
    pub fn for_each_in<F>(&self, key: &K, f: F) -> Result<(), ActorError>
    where
        F: FnMut(V) -> Result<(), ActorError>,
    {
        match self.get(key)? {
            Some(set) => set.for_each(f),
            None => Ok(()),
        }
    }

    /// Collects the values under `key`.
    pub fn values_of(&self, key: &K) -> Result<Vec<V>, ActorError> {
        match self.get(key)? {
            Some(set) => set.collect_keys(),
            None => Ok(Vec::new()),
        }
    }
}
