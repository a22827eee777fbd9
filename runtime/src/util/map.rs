// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::builtin::HAMT_BIT_WIDTH;
use crate::{ActorError, AsActorError, Hasher};
use anyhow::anyhow;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_hamt as hamt;
use fvm_shared::address::Address;
use fvm_shared::error::ExitCode;
use integer_encoding::VarInt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;

/// Wraps a HAMT to provide a convenient map API.
/// Any errors are returned with exit code indicating illegal state.
/// The name is not persisted in state, but adorns any error messages.
pub struct Map2<BS, K, V>
where
    BS: Blockstore,
    K: MapKey,
    V: DeserializeOwned + Serialize,
{
    hamt: hamt::Hamt<BS, V, hamt::BytesKey, Hasher>,
    name: &'static str,
    key_type: PhantomData<K>,
}

/// A type usable as a HAMT key, with a canonical byte encoding.
pub trait MapKey: Sized + Debug {
    fn from_bytes(b: &[u8]) -> Result<Self, String>;
    fn to_bytes(&self) -> Result<Vec<u8>, String>;
}

pub type Config = hamt::Config;

pub const DEFAULT_HAMT_CONFIG: Config =
    Config { bit_width: HAMT_BIT_WIDTH, min_data_depth: 0, max_array_width: 3 };

impl<BS, K, V> Map2<BS, K, V>
where
    BS: Blockstore,
    K: MapKey,
    V: DeserializeOwned + Serialize,
{
    /// Creates a new, empty map.
    pub fn empty(store: BS, config: Config, name: &'static str) -> Self {
        Self {
            hamt: hamt::Hamt::new_with_config(store, config),
            name,
            key_type: Default::default(),
        }
    }

    /// Creates a new empty map and flushes it to the store.
    /// Returns the CID of the empty map root.
    pub fn flush_empty(store: BS, config: Config) -> Result<Cid, ActorError> {
        Self::empty(store, config, "empty").flush()
    }

    /// Loads a map from the store.
    /// The caller must supply the configuration the map was written with.
    pub fn load(
        store: BS,
        root: &Cid,
        config: Config,
        name: &'static str,
    ) -> Result<Self, ActorError> {
        Ok(Self {
            hamt: hamt::Hamt::load_with_config(root, store, config)
                .with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
                    format!("failed to load HAMT '{}'", name)
                })?,
            name,
            key_type: Default::default(),
        })
    }

    /// Flushes the map's contents to the store.
    /// Returns the root node CID.
    pub fn flush(&mut self) -> Result<Cid, ActorError> {
        self.hamt.flush().with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to flush HAMT '{}'", self.name)
        })
    }

    /// Returns a reference to the underlying blockstore.
    pub fn store(&self) -> &BS {
        self.hamt.store()
    }

    pub fn is_empty(&self) -> bool {
        self.hamt.is_empty()
    }

    /// Returns a reference to the value associated with a key, if present.
    pub fn get(&self, key: &K) -> Result<Option<&V>, ActorError> {
        let k = encode_key(key)?;
        self.hamt.get(&k).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to get key {key:?} from HAMT '{}'", self.name)
        })
    }

    pub fn contains_key(&self, key: &K) -> Result<bool, ActorError> {
        let k = encode_key(key)?;
        self.hamt.contains_key(&k).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to check key {key:?} in HAMT '{}'", self.name)
        })
    }

    /// Inserts a key-value pair into the map.
    /// Returns any value previously associated with the key.
    pub fn set(&mut self, key: &K, value: V) -> Result<Option<V>, ActorError>
    where
        V: PartialEq,
    {
        let k = encode_key(key)?;
        self.hamt.set(k.into(), value).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to set key {key:?} in HAMT '{}'", self.name)
        })
    }

    /// Inserts a key-value pair only if the key does not already exist.
    /// Returns whether the map was modified.
    pub fn set_if_absent(&mut self, key: &K, value: V) -> Result<bool, ActorError>
    where
        V: PartialEq,
    {
        let k = encode_key(key)?;
        self.hamt
            .set_if_absent(k.into(), value)
            .with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
                format!("failed to set key {key:?} in HAMT '{}'", self.name)
            })
    }

    /// Removes a key, returning the value it held.
    pub fn delete(&mut self, key: &K) -> Result<Option<V>, ActorError> {
        let k = encode_key(key)?;
        self.hamt
            .delete(&k)
            .map(|deleted| deleted.map(|(_k, v)| v))
            .with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
                format!("failed to delete key {key:?} from HAMT '{}'", self.name)
            })
    }

    /// Iterates over all key-value pairs in the map.
    /// An `ActorError` returned by the callback is propagated unchanged.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), ActorError>
    where
        F: FnMut(K, &V) -> Result<(), ActorError>,
    {
        self.hamt
            .for_each(|k, v| {
                let key =
                    K::from_bytes(k).context_code(ExitCode::USR_ILLEGAL_STATE, "invalid key")?;
                f(key, v).map_err(|e| anyhow!(e))
            })
            .map_err(|hamt_err| match hamt_err {
                hamt::Error::Dynamic(e) => match e.downcast::<ActorError>() {
                    Ok(ae) => ae,
                    Err(e) => ActorError::illegal_state(format!(
                        "error in callback traversing HAMT {}: {}",
                        self.name, e
                    )),
                },
                e => {
                    ActorError::illegal_state(format!("error traversing HAMT {}: {}", self.name, e))
                }
            })
    }

    /// Collects every key in the map, in iteration order.
    pub fn keys(&self) -> Result<Vec<K>, ActorError> {
        let mut keys = Vec::new();
        self.for_each(|k, _| {
            keys.push(k);
            Ok(())
        })?;
        Ok(keys)
    }
}

fn encode_key<K: MapKey>(key: &K) -> Result<Vec<u8>, ActorError> {
    key.to_bytes().with_context_code(ExitCode::USR_ASSERTION_FAILED, || format!("invalid key {key:?}"))
}

fn decode_varint<T: VarInt>(b: &[u8]) -> Result<T, String> {
    match T::decode_var(b) {
        Some((result, size)) if size == b.len() => Ok(result),
        Some(_) => Err(format!("trailing bytes after varint in {:?}", b)),
        None => Err(format!("failed to decode varint in {:?}", b)),
    }
}

impl MapKey for Vec<u8> {
    fn from_bytes(b: &[u8]) -> Result<Self, String> {
        Ok(b.to_vec())
    }

    fn to_bytes(&self) -> Result<Vec<u8>, String> {
        Ok(self.clone())
    }
}

impl MapKey for u64 {
    fn from_bytes(b: &[u8]) -> Result<Self, String> {
        decode_varint(b)
    }

    fn to_bytes(&self) -> Result<Vec<u8>, String> {
        Ok(self.encode_var_vec())
    }
}

impl MapKey for i64 {
    fn from_bytes(b: &[u8]) -> Result<Self, String> {
        decode_varint(b)
    }

    fn to_bytes(&self) -> Result<Vec<u8>, String> {
        Ok(self.encode_var_vec())
    }
}

impl MapKey for Address {
    fn from_bytes(b: &[u8]) -> Result<Self, String> {
        Address::from_bytes(b).map_err(|e| e.to_string())
    }

    fn to_bytes(&self) -> Result<Vec<u8>, String> {
        Ok(Address::to_bytes(*self))
    }
}

impl MapKey for Cid {
    fn from_bytes(b: &[u8]) -> Result<Self, String> {
        Cid::try_from(b).map_err(|e| e.to_string())
    }

    fn to_bytes(&self) -> Result<Vec<u8>, String> {
        Ok(self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvm_ipld_blockstore::MemoryBlockstore;

    #[test]
    fn basic_put_get() {
        let bs = MemoryBlockstore::new();
        let mut m = Map2::<_, u64, String>::empty(bs, DEFAULT_HAMT_CONFIG, "quotas");
        m.set(&1234, "1234".to_string()).unwrap();
        assert!(m.get(&2222).unwrap().is_none());
        assert_eq!(&"1234".to_string(), m.get(&1234).unwrap().unwrap());
    }

    #[test]
    fn set_if_absent_keeps_first_value() {
        let bs = MemoryBlockstore::new();
        let mut m = Map2::<_, i64, i64>::empty(&bs, DEFAULT_HAMT_CONFIG, "quotas");
        assert!(m.set_if_absent(&-3, 10).unwrap());
        assert!(!m.set_if_absent(&-3, 11).unwrap());
        assert_eq!(Some(&10), m.get(&-3).unwrap());
        assert_eq!(Some(10), m.delete(&-3).unwrap());
        assert!(m.is_empty());
    }

    #[test]
    fn reload_from_root() {
        let bs = MemoryBlockstore::new();
        let mut m = Map2::<_, Address, u64>::empty(&bs, DEFAULT_HAMT_CONFIG, "pendings");
        m.set(&Address::new_id(101), 1).unwrap();
        m.set(&Address::new_id(102), 2).unwrap();
        let root = m.flush().unwrap();

        let loaded = Map2::<_, Address, u64>::load(&bs, &root, DEFAULT_HAMT_CONFIG, "pendings")
            .unwrap();
        assert_eq!(Some(&2), loaded.get(&Address::new_id(102)).unwrap());
        let mut keys = loaded.keys().unwrap();
        keys.sort();
        assert_eq!(vec![Address::new_id(101), Address::new_id(102)], keys);
    }

    #[test]
    fn for_each_callback_exitcode_propagates() {
        let bs = MemoryBlockstore::new();
        let mut m = Map2::<_, u64, String>::empty(bs, DEFAULT_HAMT_CONFIG, "empty");
        m.set(&1234, "1234".to_string()).unwrap();
        let res = m.for_each(|_, _| Err(ActorError::forbidden("test".to_string())));
        assert!(res.is_err());
        assert_eq!(res.unwrap_err(), ActorError::forbidden("test".to_string()));
    }
}
