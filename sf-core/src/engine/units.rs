//! Runtime state of fan and PSU units
//!
//! Presence is latched so an absent to present transition is seen exactly
//! once, even when it happens on a presence-only sub-tick.

use crate::data::policy::{FanConfig, PsuConfig};
use crate::data::sample::{FanSample, PsuSample, RotorSample};
use crate::data::types::AirflowDirection;

#[derive(Debug, Clone, Default)]
pub struct RotorState {
    pub running: bool,
    pub alarm: bool,
    pub speed: Option<u32>,
    /// Consecutive ticks not running or alarming
    pub stall_count: u32,
}

impl RotorState {
    fn observe(&mut self, sample: &RotorSample) {
        self.running = sample.running;
        self.alarm = sample.alarm;
        self.speed = sample.speed;
        if sample.is_stalled() {
            self.stall_count = self.stall_count.saturating_add(1);
        } else {
            self.stall_count = 0;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FanState {
    pub name: String,
    pub parked: bool,
    /// `None` until the first observation
    present: Option<bool>,
    reinserted: bool,
    pub rotors: Vec<RotorState>,
    pub duty: u8,
    pub plug_in_remaining: u32,
    pub repair_remaining: u32,
    pub repairable: bool,
    pub airflow: AirflowDirection,
    pub inconsistent: bool,
}

impl FanState {
    pub fn new(config: &FanConfig) -> Self {
        Self {
            name: config.name.clone(),
            parked: config.parked,
            present: None,
            reinserted: false,
            rotors: vec![RotorState::default(); config.rotors],
            duty: 0,
            plug_in_remaining: 0,
            repair_remaining: 0,
            repairable: true,
            airflow: AirflowDirection::Unknown,
            inconsistent: false,
        }
    }

    pub fn is_present(&self) -> bool {
        self.present.unwrap_or(false)
    }

    /// Update the presence latch
    pub fn observe_presence(&mut self, present: bool) {
        if self.present == Some(false) && present {
            self.reinserted = true;
            for rotor in &mut self.rotors {
                rotor.stall_count = 0;
            }
        }
        if !present {
            self.reinserted = false;
        }
        self.present = Some(present);
    }

    /// Full observation: presence, rotors and declared airflow
    pub fn observe(&mut self, sample: &FanSample) {
        self.observe_presence(sample.present);
        self.airflow = if sample.present {
            sample.airflow
        } else {
            AirflowDirection::Unknown
        };
        if !sample.present {
            return;
        }
        for (index, rotor) in self.rotors.iter_mut().enumerate() {
            // A rotor the sample does not report is treated as stopped
            let rotor_sample = sample
                .rotors
                .get(index)
                .copied()
                .unwrap_or_else(RotorSample::stalled);
            rotor.observe(&rotor_sample);
        }
    }

    /// Consume the reinsertion flag
    pub fn take_reinserted(&mut self) -> bool {
        std::mem::take(&mut self.reinserted)
    }

    /// Present and at least one rotor stalled for `stall_ticks`
    pub fn is_faulty(&self, stall_ticks: u32) -> bool {
        !self.parked
            && self.is_present()
            && self.rotors.iter().any(|r| r.stall_count >= stall_ticks)
    }

    pub fn is_absent(&self) -> bool {
        !self.parked && !self.is_present()
    }
}

#[derive(Debug, Clone)]
pub struct PsuState {
    pub name: String,
    pub present: bool,
    pub io_ok: bool,
    pub duty: u8,
    pub airflow: AirflowDirection,
    pub inconsistent: bool,
}

impl PsuState {
    pub fn new(config: &PsuConfig) -> Self {
        Self {
            name: config.name.clone(),
            present: true,
            io_ok: true,
            duty: 0,
            airflow: AirflowDirection::Unknown,
            inconsistent: false,
        }
    }

    pub fn observe(&mut self, sample: &PsuSample) {
        self.present = sample.present;
        self.io_ok = !sample.present || sample.io_ok;
        self.airflow = if sample.present {
            sample.airflow
        } else {
            AirflowDirection::Unknown
        };
    }

    pub fn is_faulted(&self) -> bool {
        self.present && !self.io_ok
    }
}
