// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Callback, Engine, Error, Iterator, Modify, Result, Snapshot};
use crate::storage::types::{Key, Value};
use crate::storage::{CfName, Context, ALL_CFS};

type CfMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// An in-memory ordered engine over B-tree maps, one per column family.
///
/// Batches are applied while holding the write guards of every column
/// family, and snapshots collect the read guards in the same order, so a
/// snapshot observes either none or all of a batch. This engine backs tests
/// and standalone deployments; a replicated engine plugs in behind the same
/// `Engine` trait.
#[derive(Clone)]
pub struct BTreeEngine {
    cf_names: Vec<CfName>,
    cf_contents: Vec<Arc<RwLock<CfMap>>>,
}

impl BTreeEngine {
    pub fn new(cfs: &[CfName]) -> BTreeEngine {
        info!("BTreeEngine: creating with cfs {:?}", cfs);
        BTreeEngine {
            cf_names: cfs.to_vec(),
            cf_contents: cfs.iter().map(|_| Default::default()).collect(),
        }
    }

    fn cf_index(&self, cf: CfName) -> usize {
        self.cf_names
            .iter()
            .position(|c| *c == cf)
            .unwrap_or_else(|| panic!("unknown cf {}", cf))
    }
}

impl Default for BTreeEngine {
    fn default() -> BTreeEngine {
        BTreeEngine::new(ALL_CFS)
    }
}

impl Debug for BTreeEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "BTreeEngine")
    }
}

impl Engine for BTreeEngine {
    type Snap = BTreeEngineSnapshot;

    fn async_write(&self, _ctx: &Context, batch: Vec<Modify>, callback: Callback<()>) -> Result<()> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        {
            let mut guards: Vec<_> = self.cf_contents.iter().map(|cf| cf.write()).collect();
            for m in batch {
                match m {
                    Modify::Put(cf, key, value) => {
                        let index = self.cf_index(cf);
                        guards[index].insert(key.into_encoded(), value);
                    }
                    Modify::Delete(cf, key) => {
                        let index = self.cf_index(cf);
                        guards[index].remove(key.as_encoded());
                    }
                }
            }
        }
        callback(Ok(()));
        Ok(())
    }

    fn async_snapshot(&self, _ctx: &Context, callback: Callback<Self::Snap>) -> Result<()> {
        callback(Ok(BTreeEngineSnapshot::new(self)));
        Ok(())
    }
}

#[derive(Clone)]
pub struct BTreeEngineSnapshot {
    cf_names: Vec<CfName>,
    cf_contents: Vec<Arc<CfMap>>,
}

impl BTreeEngineSnapshot {
    fn new(engine: &BTreeEngine) -> BTreeEngineSnapshot {
        let guards: Vec<_> = engine.cf_contents.iter().map(|cf| cf.read()).collect();
        let cf_contents = guards.iter().map(|g| Arc::new((**g).clone())).collect();
        BTreeEngineSnapshot {
            cf_names: engine.cf_names.clone(),
            cf_contents,
        }
    }

    fn map_of(&self, cf: CfName) -> &Arc<CfMap> {
        let index = self
            .cf_names
            .iter()
            .position(|c| *c == cf)
            .unwrap_or_else(|| panic!("unknown cf {}", cf));
        &self.cf_contents[index]
    }
}

impl Snapshot for BTreeEngineSnapshot {
    type Iter = BTreeEngineIterator;

    fn get_cf(&self, cf: CfName, key: &Key) -> Result<Option<Value>> {
        Ok(self.map_of(cf).get(key.as_encoded()).cloned())
    }

    fn iter_cf(&self, cf: CfName) -> Result<Self::Iter> {
        Ok(BTreeEngineIterator::new(self.map_of(cf).clone()))
    }
}

pub struct BTreeEngineIterator {
    tree: Arc<CfMap>,
    cur_key: Option<Vec<u8>>,
    cur_value: Option<Vec<u8>>,
}

impl BTreeEngineIterator {
    fn new(tree: Arc<CfMap>) -> BTreeEngineIterator {
        BTreeEngineIterator {
            tree,
            cur_key: None,
            cur_value: None,
        }
    }

    fn set_cur(&mut self, pair: Option<(Vec<u8>, Vec<u8>)>) -> bool {
        match pair {
            Some((k, v)) => {
                self.cur_key = Some(k);
                self.cur_value = Some(v);
                true
            }
            None => {
                self.cur_key = None;
                self.cur_value = None;
                false
            }
        }
    }
}

impl Iterator for BTreeEngineIterator {
    fn seek(&mut self, key: &Key) -> Result<bool> {
        let pair = self
            .tree
            .range::<[u8], _>((Included(key.as_encoded().as_slice()), Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()));
        Ok(self.set_cur(pair))
    }

    fn seek_to_first(&mut self) -> bool {
        let pair = self.tree.iter().next().map(|(k, v)| (k.clone(), v.clone()));
        self.set_cur(pair)
    }

    fn next(&mut self) -> bool {
        let cur = match self.cur_key.take() {
            Some(k) => k,
            None => return false,
        };
        let pair = self
            .tree
            .range::<[u8], _>((Excluded(cur.as_slice()), Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()));
        self.set_cur(pair)
    }

    fn valid(&self) -> bool {
        self.cur_key.is_some()
    }

    fn key(&self) -> &[u8] {
        self.cur_key.as_ref().unwrap()
    }

    fn value(&self) -> &[u8] {
        self.cur_value.as_ref().unwrap()
    }
}
