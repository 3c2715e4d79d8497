// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Pool of emulation instances handed out to host contexts.

use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;

use crate::emu::{EventClock, SidEmu};
use crate::{BuilderError, ChipModel, CombinedWaveforms};

/// Shared handle to a pooled instance.
pub type SidHandle = Arc<Mutex<SidEmu>>;

/// Parameters applied to every instance of a builder. `None` leaves the
/// instance default in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuilderConfig {
    /// Internal filter enable.
    pub filter_enabled: Option<bool>,
    /// 6581 filter curve.
    pub filter_6581_curve: Option<f64>,
    /// 6581 filter range.
    pub filter_6581_range: Option<f64>,
    /// 8580 filter curve.
    pub filter_8580_curve: Option<f64>,
    /// Combined waveform strength.
    pub combined_waveforms: Option<CombinedWaveforms>,
}

impl BuilderConfig {
    fn apply(&self, emu: &mut SidEmu) {
        if let Some(curve) = self.filter_6581_curve {
            emu.filter_6581_curve(curve);
        }
        if let Some(curve) = self.filter_8580_curve {
            emu.filter_8580_curve(curve);
        }
        if let Some(range) = self.filter_6581_range {
            emu.filter_6581_range(range);
        }
        if let Some(strength) = self.combined_waveforms {
            emu.combined_waveforms(strength);
        }
        if let Some(enabled) = self.filter_enabled {
            emu.filter(enabled);
        }
    }
}

/// Creates instances on demand and assigns them to host contexts.
pub struct SidBuilder {
    name: String,
    config: BuilderConfig,
    max_instances: Option<usize>,
    sids: Vec<SidHandle>,
}

impl SidBuilder {
    /// Unbounded pool.
    pub fn new(name: &str) -> Self {
        SidBuilder {
            name: name.to_string(),
            config: BuilderConfig::default(),
            max_instances: None,
            sids: Vec::new(),
        }
    }

    /// Pool holding at most `max_instances` instances.
    pub fn with_limit(name: &str, max_instances: usize) -> Self {
        SidBuilder {
            max_instances: Some(max_instances),
            ..SidBuilder::new(name)
        }
    }

    /// Builder name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters applied to new instances.
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Add up to `count` instances, limited by the pool size. Returns the
    /// number created.
    ///
    /// # Errors
    /// Returns `BuilderError::AllocationFailed` if storage for the instances
    /// cannot be reserved; nothing is added in that case.
    pub fn create(&mut self, count: usize) -> Result<usize, BuilderError> {
        let count = match self.max_instances {
            Some(max) => count.min(max.saturating_sub(self.sids.len())),
            None => count,
        };
        self.sids
            .try_reserve(count)
            .map_err(|_| BuilderError::AllocationFailed { requested: count })?;
        for _ in 0..count {
            let mut emu = SidEmu::new(ChipModel::default());
            self.config.apply(&mut emu);
            self.sids.push(Arc::new(Mutex::new(emu)));
        }
        info!("{}: created {} SID instances", self.name, count);
        Ok(count)
    }

    /// Lock the first free instance to `event_clock`, creating one if the
    /// pool allows it.
    ///
    /// # Errors
    /// Returns `BuilderError::NoAvailableInstance` if every instance is in use.
    pub fn lock(
        &mut self,
        event_clock: Arc<dyn EventClock + Send + Sync>,
        chip_model: ChipModel,
        digiboost: bool,
    ) -> Result<SidHandle, BuilderError> {
        if let Some(handle) = self.lock_free(&event_clock, chip_model, digiboost) {
            return Ok(handle);
        }
        if self.create(1)? == 1 {
            if let Some(handle) = self.lock_free(&event_clock, chip_model, digiboost) {
                return Ok(handle);
            }
        }
        warn!("{}: no available SIDs to lock", self.name);
        Err(BuilderError::NoAvailableInstance)
    }

    fn lock_free(
        &self,
        event_clock: &Arc<dyn EventClock + Send + Sync>,
        chip_model: ChipModel,
        digiboost: bool,
    ) -> Option<SidHandle> {
        self.sids.iter().find_map(|handle| {
            let mut emu = handle.try_lock()?;
            emu.lock(Arc::clone(event_clock)).ok()?;
            emu.model(chip_model, digiboost);
            info!("{}: locked SID as {:?}", self.name, chip_model);
            Some(Arc::clone(handle))
        })
    }

    /// Return an instance to the pool.
    ///
    /// # Errors
    /// Returns `BuilderError::UnknownInstance` if the handle is not from
    /// this pool.
    pub fn unlock(&self, handle: &SidHandle) -> Result<(), BuilderError> {
        let sid = self
            .sids
            .iter()
            .find(|sid| Arc::ptr_eq(sid, handle))
            .ok_or(BuilderError::UnknownInstance)?;
        if sid.lock().unlock().is_ok() {
            info!("{}: unlocked SID", self.name);
        }
        Ok(())
    }

    /// Drop every instance. Outstanding handles stay usable but no longer
    /// belong to the pool.
    pub fn remove(&mut self) {
        self.sids.clear();
    }

    /// Instances in the pool.
    pub fn used(&self) -> usize {
        self.sids.len()
    }

    /// Instances that may still be created, `None` if unbounded.
    pub fn available(&self) -> Option<usize> {
        self.max_instances
            .map(|max| max.saturating_sub(self.sids.len()))
    }

    fn broadcast(&self, f: impl Fn(&mut SidEmu)) {
        for sid in &self.sids {
            f(&mut *sid.lock());
        }
    }

    /// Enable or disable the internal filter on every instance.
    pub fn filter(&mut self, enable: bool) {
        self.config.filter_enabled = Some(enable);
        self.broadcast(|emu| emu.filter(enable));
    }

    /// Set the 6581 filter curve on every instance.
    pub fn filter_6581_curve(&mut self, curve: f64) {
        self.config.filter_6581_curve = Some(curve);
        self.broadcast(|emu| emu.filter_6581_curve(curve));
    }

    /// Set the 6581 filter range on every instance.
    pub fn filter_6581_range(&mut self, adjustment: f64) {
        self.config.filter_6581_range = Some(adjustment);
        self.broadcast(|emu| emu.filter_6581_range(adjustment));
    }

    /// Set the 8580 filter curve on every instance.
    pub fn filter_8580_curve(&mut self, curve: f64) {
        self.config.filter_8580_curve = Some(curve);
        self.broadcast(|emu| emu.filter_8580_curve(curve));
    }

    /// Set the combined waveform strength on every instance.
    pub fn combined_waveforms(&mut self, strength: CombinedWaveforms) {
        self.config.combined_waveforms = Some(strength);
        self.broadcast(|emu| emu.combined_waveforms(strength));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn host() -> Arc<AtomicU64> {
        Arc::new(AtomicU64::new(0))
    }

    #[test]
    fn lock_creates_on_demand() {
        let mut builder = SidBuilder::new("residfp");
        let a = builder.lock(host(), ChipModel::Mos6581, false).unwrap();
        let b = builder.lock(host(), ChipModel::Mos8580, false).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(builder.used(), 2);
        assert_eq!(b.lock().sid().chip_model(), ChipModel::Mos8580);
    }

    #[test]
    fn unlocked_instance_is_reused() {
        let mut builder = SidBuilder::new("residfp");
        let a = builder.lock(host(), ChipModel::Mos6581, false).unwrap();
        builder.unlock(&a).unwrap();
        assert!(!a.lock().is_locked());
        let b = builder.lock(host(), ChipModel::Mos8580, true).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builder.used(), 1);
    }

    #[test]
    fn bounded_pool_runs_out() {
        let mut builder = SidBuilder::with_limit("residfp", 1);
        assert_eq!(builder.create(3), Ok(1));
        assert_eq!(builder.available(), Some(0));
        let _a = builder.lock(host(), ChipModel::Mos6581, false).unwrap();
        assert_eq!(
            builder.lock(host(), ChipModel::Mos6581, false).err(),
            Some(BuilderError::NoAvailableInstance)
        );
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let mut one = SidBuilder::new("one");
        let other = SidBuilder::new("other");
        let handle = one.lock(host(), ChipModel::Mos6581, false).unwrap();
        assert_eq!(other.unlock(&handle), Err(BuilderError::UnknownInstance));
    }

    #[test]
    fn settings_reach_existing_and_new_instances() {
        let mut builder = SidBuilder::new("residfp");
        builder.create(1).unwrap();
        builder.filter(false);
        builder.filter_8580_curve(0.25);
        builder.create(1).unwrap();
        for sid in &builder.sids {
            let emu = sid.lock();
            assert!(!emu.sid().config().filter_enabled);
            assert_eq!(emu.sid().config().filter_8580_curve, 0.25);
        }
        builder.remove();
        assert_eq!(builder.used(), 0);
    }
}
