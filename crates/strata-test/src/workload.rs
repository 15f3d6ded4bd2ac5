use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata_common::{StrataError, StrataResult};
use strata_engine::{KeyRange, Store, Transaction};

use crate::utils::key;

/// One store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Insert or overwrite a key.
    Insert(Vec<u8>, Vec<u8>),
    /// Delete a key.
    Delete(Vec<u8>),
}

impl Op {
    /// Applies the operation inside a transaction. Missing keys on delete
    /// are not errors.
    pub fn apply(&self, txn: &mut Transaction<'_>) -> StrataResult<()> {
        match self {
            Op::Insert(k, v) => txn.insert(k, v).map(|_| ()),
            Op::Delete(k) => match txn.delete(k) {
                Ok(_) | Err(StrataError::KeyNotFound) => Ok(()),
                Err(err) => Err(err),
            },
        }
    }

    /// Applies the operation to a model.
    pub fn apply_to_model(&self, model: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
        match self {
            Op::Insert(k, v) => {
                model.insert(k.clone(), v.clone());
            }
            Op::Delete(k) => {
                model.remove(k);
            }
        }
    }
}

/// Seeded random mix of inserts and deletes over a bounded key space.
///
/// Inserts overwrite, so stores driven by a workload must be opened with
/// `allow_overwrite`.
#[derive(Debug)]
pub struct Workload {
    rng: StdRng,
    key_space: u64,
    delete_ratio: f64,
    value_len: usize,
}

impl Workload {
    /// Creates a workload over `key_space` keys.
    pub fn new(seed: u64, key_space: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            key_space: key_space.max(1),
            delete_ratio: 0.3,
            value_len: 16,
        }
    }

    /// Sets the fraction of operations that are deletes.
    pub fn with_delete_ratio(mut self, ratio: f64) -> Self {
        self.delete_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Sets the value length.
    pub fn with_value_len(mut self, len: usize) -> Self {
        self.value_len = len;
        self
    }

    /// Produces the next operation.
    pub fn next_op(&mut self) -> Op {
        let k = key(self.rng.gen_range(0..self.key_space));
        if self.rng.gen_bool(self.delete_ratio) {
            Op::Delete(k)
        } else {
            let value = (0..self.value_len).map(|_| self.rng.gen()).collect();
            Op::Insert(k, value)
        }
    }

    /// Produces `n` operations.
    pub fn ops(&mut self, n: usize) -> Vec<Op> {
        (0..n).map(|_| self.next_op()).collect()
    }

    /// Commits `ops` in one transaction and mirrors them in `model`.
    pub fn commit_batch(
        store: &Store,
        ops: &[Op],
        model: &mut BTreeMap<Vec<u8>, Vec<u8>>,
    ) -> StrataResult<()> {
        let mut txn = store.begin_transaction()?;
        for op in ops {
            op.apply(&mut txn)?;
        }
        txn.commit()?;
        for op in ops {
            op.apply_to_model(model);
        }
        Ok(())
    }
}

/// Reads every committed pair from a store.
pub fn dump(store: &Store) -> StrataResult<BTreeMap<Vec<u8>, Vec<u8>>> {
    Ok(store
        .scan(&KeyRange::all())?
        .into_iter()
        .map(|(k, v)| (k.to_vec(), v.to_vec()))
        .collect())
}
