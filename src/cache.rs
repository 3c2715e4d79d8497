// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Process-wide cache of precomputed tables.
//!
//! Waveform, filter and resampling tables are expensive to compute and never change
//! once built, so every instance with the same configuration shares one
//! copy. The map itself is guarded by a mutex that is only held while a
//! slot is looked up; the table is then built outside the lock, exactly
//! once per key, with concurrent callers for the same key waiting on the
//! slot until it is ready.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::filter::model::{FilterModelConfig6581, FilterModelConfig8580};
use crate::sampler::{FirKey, FirTable};
use crate::voice::VoiceDac;
use crate::wave::WaveformTables;
use crate::{ChipModel, CombinedWaveforms};

struct Slot<V> {
    value: OnceLock<Arc<V>>,
    builds: AtomicUsize,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Slot {
            value: OnceLock::new(),
            builds: AtomicUsize::new(0),
        }
    }
}

/// Lock-guarded key/value store of shared immutable tables.
pub struct TableCache<K, V> {
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K: Eq + Hash, V> Default for TableCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> TableCache<K, V> {
    /// Empty cache.
    pub fn new() -> Self {
        TableCache {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the table for `key`, running `build` if it does not exist yet.
    pub fn get_or_build<F>(&self, key: K, build: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key).or_default())
        };
        let value = slot.value.get_or_init(|| {
            slot.builds.fetch_add(1, Ordering::Relaxed);
            Arc::new(build())
        });
        Arc::clone(value)
    }

    /// Return the table for `key` if it has been built.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let slots = self.slots.lock();
        slots.get(key).and_then(|slot| slot.value.get().cloned())
    }

    /// How many times the table for `key` has been built.
    pub fn build_count(&self, key: &K) -> usize {
        let slots = self.slots.lock();
        slots
            .get(key)
            .map_or(0, |slot| slot.builds.load(Ordering::Relaxed))
    }

    /// Number of keys seen.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// True if no table was ever requested.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type WaveformKey = (ChipModel, CombinedWaveforms);

fn waveform_cache() -> &'static TableCache<WaveformKey, WaveformTables> {
    static CACHE: OnceLock<TableCache<WaveformKey, WaveformTables>> = OnceLock::new();
    CACHE.get_or_init(TableCache::new)
}

fn filter_6581_cache() -> &'static TableCache<ChipModel, FilterModelConfig6581> {
    static CACHE: OnceLock<TableCache<ChipModel, FilterModelConfig6581>> = OnceLock::new();
    CACHE.get_or_init(TableCache::new)
}

fn filter_8580_cache() -> &'static TableCache<ChipModel, FilterModelConfig8580> {
    static CACHE: OnceLock<TableCache<ChipModel, FilterModelConfig8580>> = OnceLock::new();
    CACHE.get_or_init(TableCache::new)
}

/// Shared waveform tables for a chip model and combined waveform strength.
pub fn waveform_tables(chip_model: ChipModel, strength: CombinedWaveforms) -> Arc<WaveformTables> {
    waveform_cache().get_or_build((chip_model, strength), || {
        WaveformTables::build(chip_model, strength)
    })
}

/// Number of times the waveform tables for this key were computed.
pub fn waveform_table_builds(chip_model: ChipModel, strength: CombinedWaveforms) -> usize {
    waveform_cache().build_count(&(chip_model, strength))
}

/// Shared waveform and envelope DAC levels of a chip model.
pub fn voice_dac(chip_model: ChipModel) -> Arc<VoiceDac> {
    static CACHE: OnceLock<TableCache<ChipModel, VoiceDac>> = OnceLock::new();
    CACHE
        .get_or_init(TableCache::new)
        .get_or_build(chip_model, || VoiceDac::new(chip_model))
}

/// Shared 6581 filter model.
pub fn filter_model_6581() -> Arc<FilterModelConfig6581> {
    filter_6581_cache().get_or_build(ChipModel::Mos6581, FilterModelConfig6581::new)
}

/// Shared 8580 filter model.
pub fn filter_model_8580() -> Arc<FilterModelConfig8580> {
    filter_8580_cache().get_or_build(ChipModel::Mos8580, FilterModelConfig8580::new)
}

/// Number of times a chip's filter model was computed.
pub fn filter_model_builds(chip_model: ChipModel) -> usize {
    match chip_model {
        ChipModel::Mos6581 => filter_6581_cache().build_count(&chip_model),
        ChipModel::Mos8580 => filter_8580_cache().build_count(&chip_model),
    }
}

fn fir_cache() -> &'static TableCache<FirKey, FirTable> {
    static CACHE: OnceLock<TableCache<FirKey, FirTable>> = OnceLock::new();
    CACHE.get_or_init(TableCache::new)
}

/// Shared resampling filter bank.
pub fn fir_table(key: FirKey) -> Arc<FirTable> {
    fir_cache().get_or_build(key, || FirTable::design(&key))
}

/// Number of times the resampling filter for `key` was designed.
pub fn fir_table_builds(key: &FirKey) -> usize {
    fir_cache().build_count(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn builds_once_per_key() {
        let cache: TableCache<u32, Vec<u32>> = TableCache::new();
        let a = cache.get_or_build(1, || vec![1, 2, 3]);
        let b = cache.get_or_build(1, || unreachable!("already built"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.build_count(&1), 1);
        assert_eq!(cache.build_count(&2), 0);
        assert!(cache.get(&2).is_none());

        cache.get_or_build(2, Vec::new);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_callers_share_one_build() {
        let cache: Arc<TableCache<&'static str, usize>> = Arc::new(TableCache::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    *cache.get_or_build("key", || {
                        thread::sleep(std::time::Duration::from_millis(20));
                        42
                    })
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(cache.build_count(&"key"), 1);
    }
}
