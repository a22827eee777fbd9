// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::anyhow;
use cid::Cid;
use fvm_ipld_amt::Amt;
use fvm_ipld_blockstore::Blockstore;
use fvm_shared::error::ExitCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{ActorError, AsActorError};

/// Wraps an AMT to provide an index-addressed array API.
/// Errors carry the array's name and an illegal state exit code.
pub struct Array<BS, V>
where
    BS: Blockstore,
    V: DeserializeOwned + Serialize,
{
    amt: Amt<V, BS>,
    name: &'static str,
}

impl<BS, V> Array<BS, V>
where
    BS: Blockstore,
    V: DeserializeOwned + Serialize,
{
    pub fn empty(store: BS, bit_width: u32, name: &'static str) -> Self {
        Self { amt: Amt::new_with_bit_width(store, bit_width), name }
    }

    /// Creates a new empty array and flushes it to the store.
    pub fn flush_empty(store: BS, bit_width: u32) -> Result<Cid, ActorError> {
        Self::empty(store, bit_width, "empty").flush()
    }

    pub fn load(store: BS, root: &Cid, name: &'static str) -> Result<Self, ActorError> {
        Ok(Self {
            amt: Amt::load(root, store).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
                format!("failed to load AMT '{}'", name)
            })?,
            name,
        })
    }

    pub fn flush(&mut self) -> Result<Cid, ActorError> {
        self.amt.flush().with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to flush AMT '{}'", self.name)
        })
    }

    /// Number of elements in the array.
    pub fn count(&self) -> u64 {
        self.amt.count()
    }

    pub fn get(&self, index: u64) -> Result<Option<&V>, ActorError> {
        self.amt.get(index).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to get index {} from AMT '{}'", index, self.name)
        })
    }

    pub fn set(&mut self, index: u64, value: V) -> Result<(), ActorError> {
        self.amt.set(index, value).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to set index {} in AMT '{}'", index, self.name)
        })
    }

    /// Removes the element at `index`, returning it if present.
    pub fn delete(&mut self, index: u64) -> Result<Option<V>, ActorError> {
        self.amt.delete(index).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to delete index {} from AMT '{}'", index, self.name)
        })
    }

    /// Iterates over the populated indices in ascending order.
    /// An `ActorError` returned by the callback is propagated unchanged.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), ActorError>
    where
        F: FnMut(u64, &V) -> Result<(), ActorError>,
    {
        let mut cb_err: Option<ActorError> = None;
        let res = self.amt.for_each(|i, v| {
            f(i, v).map_err(|e| {
                let msg = e.to_string();
                cb_err = Some(e);
                anyhow!(msg)
            })
        });
        match (cb_err, res) {
            (Some(e), _) => Err(e),
            (None, Ok(())) => Ok(()),
            (None, Err(e)) => Err(ActorError::illegal_state(format!(
                "error traversing AMT {}: {}",
                self.name, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvm_ipld_blockstore::MemoryBlockstore;

    #[test]
    fn set_get_delete() {
        let bs = MemoryBlockstore::new();
        let mut arr = Array::<_, String>::empty(&bs, 5, "proposals");
        arr.set(3, "three".to_string()).unwrap();
        arr.set(40, "forty".to_string()).unwrap();
        assert_eq!(2, arr.count());
        assert_eq!(Some(&"three".to_string()), arr.get(3).unwrap());
        assert_eq!(None, arr.get(4).unwrap());

        let root = arr.flush().unwrap();
        let mut arr = Array::<_, String>::load(&bs, &root, "proposals").unwrap();
        assert_eq!(Some("forty".to_string()), arr.delete(40).unwrap());
        assert_eq!(None, arr.delete(40).unwrap());
        assert_eq!(1, arr.count());
    }

    #[test]
    fn for_each_visits_in_order_and_propagates_errors() {
        let bs = MemoryBlockstore::new();
        let mut arr = Array::<_, u64>::empty(&bs, 6, "states");
        for i in [9u64, 2, 5] {
            arr.set(i, i * 10).unwrap();
        }
        let mut seen = Vec::new();
        arr.for_each(|i, v| {
            seen.push((i, *v));
            Ok(())
        })
        .unwrap();
        assert_eq!(vec![(2, 20), (5, 50), (9, 90)], seen);

        let err = arr
            .for_each(|i, _| {
                if i == 5 {
                    return Err(ActorError::not_found("stop".to_string()));
                }
                Ok(())
            })
            .unwrap_err();
        assert_eq!(ActorError::not_found("stop".to_string()), err);
    }
}
