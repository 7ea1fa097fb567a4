//! Per-channel threshold tracking
//!
//! Each channel keeps its last valid temperature, a consecutive read-failure
//! count and one consecutive-sample counter per severity. The counters are
//! independent: a single reading can advance warning and critical together.

use crate::data::policy::{ChannelConfig, ThresholdPolicy};
use crate::data::sample::ChannelSample;
use crate::data::types::{MilliCelsius, Severity};

/// Runtime state of one temperature channel
#[derive(Debug, Clone)]
pub struct ChannelState {
    config: ChannelConfig,
    /// Last valid temperature with the offset applied
    temp: Option<MilliCelsius>,
    /// This tick's usable sample; `None` after a failed or invalid read
    sample: Option<MilliCelsius>,
    fail_num: u32,
    counts: [u32; 3],
}

impl ChannelState {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            temp: None,
            sample: None,
            fail_num: 0,
            counts: [0; 3],
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn temp(&self) -> Option<MilliCelsius> {
        self.temp
    }

    pub fn sample(&self) -> Option<MilliCelsius> {
        self.sample
    }

    pub fn fail_num(&self) -> u32 {
        self.fail_num
    }

    pub fn count(&self, severity: Severity) -> u32 {
        self.counts[slot(severity)]
    }

    pub fn is_ignored(&self) -> bool {
        self.config.ignore
    }

    /// Fold one sample into the channel
    pub fn update(&mut self, sample: ChannelSample) {
        match sample {
            ChannelSample::Failed => {
                self.fail_num = self.fail_num.saturating_add(1);
                self.sample = None;
            }
            ChannelSample::Invalid => {
                self.fail_num = 0;
                self.sample = None;
                self.counts = [0; 3];
                return;
            }
            ChannelSample::Valid(raw) => {
                let temp = raw.saturating_add(self.config.offset);
                self.temp = Some(temp);
                self.sample = Some(temp);
                self.fail_num = 0;
            }
        }

        for severity in Severity::ALL {
            let hit = self.at_or_above(severity);
            let counter = &mut self.counts[slot(severity)];
            if hit {
                *counter = counter.saturating_add(1);
            } else {
                *counter = 0;
            }
        }
    }

    /// Last temperature is at or above the severity's threshold
    ///
    /// Always false for ignored channels and unset thresholds.
    pub fn at_or_above(&self, severity: Severity) -> bool {
        if self.config.ignore {
            return false;
        }
        match (self.temp, self.config.threshold(severity)) {
            (Some(temp), Some(threshold)) => temp >= threshold,
            _ => false,
        }
    }

    pub fn is_active(&self, severity: Severity, repeats: &ThresholdPolicy) -> bool {
        self.count(severity) >= repeats.repeat(severity)
    }
}

fn slot(severity: Severity) -> usize {
    match severity {
        Severity::Warning => 0,
        Severity::Critical => 1,
        Severity::Emergency => 2,
    }
}

/// Threshold state for every configured channel
#[derive(Debug, Clone)]
pub struct ThresholdTracker {
    channels: Vec<ChannelState>,
    repeats: ThresholdPolicy,
}

impl ThresholdTracker {
    pub fn new(channels: &[ChannelConfig], repeats: ThresholdPolicy) -> Self {
        Self {
            channels: channels.iter().cloned().map(ChannelState::new).collect(),
            repeats,
        }
    }

    /// Update every channel; missing samples count as failed reads
    pub fn update(&mut self, samples: &[ChannelSample]) {
        for (index, channel) in self.channels.iter_mut().enumerate() {
            let sample = samples.get(index).copied().unwrap_or(ChannelSample::Failed);
            channel.update(sample);
        }
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }

    pub fn get(&self, index: usize) -> Option<&ChannelState> {
        self.channels.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name() == name)
    }

    pub fn by_name(&self, name: &str) -> Option<&ChannelState> {
        self.channels.iter().find(|c| c.name() == name)
    }

    /// Severity is active on at least one channel this tick
    pub fn is_active(&self, severity: Severity) -> bool {
        self.channels
            .iter()
            .any(|c| c.is_active(severity, &self.repeats))
    }

    /// Channels whose severity is active this tick
    pub fn active_channels(&self, severity: Severity) -> impl Iterator<Item = &ChannelState> {
        self.channels
            .iter()
            .filter(move |c| c.is_active(severity, &self.repeats))
    }

    /// Channels at or past the read-failure threshold
    pub fn failing_channels(&self) -> impl Iterator<Item = &ChannelState> {
        let limit = self.repeats.read_fail_threshold;
        self.channels.iter().filter(move |c| c.fail_num() >= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(critical: i32) -> ChannelConfig {
        ChannelConfig {
            name: "SWITCH_TEMP".to_string(),
            warning: Some(MilliCelsius(critical - 5000)),
            critical: Some(MilliCelsius(critical)),
            ..Default::default()
        }
    }

    #[test]
    fn test_counters_increment_and_reset() {
        let mut state = ChannelState::new(channel(73000));
        let repeats = ThresholdPolicy::default();

        for _ in 0..2 {
            state.update(ChannelSample::Valid(MilliCelsius(74000)));
        }
        assert_eq!(state.count(Severity::Critical), 2);
        assert_eq!(state.count(Severity::Warning), 2);
        assert!(!state.is_active(Severity::Critical, &repeats));

        state.update(ChannelSample::Valid(MilliCelsius(74000)));
        assert!(state.is_active(Severity::Critical, &repeats));
        assert_eq!(state.count(Severity::Emergency), 0);

        // Below critical but above warning: only critical resets
        state.update(ChannelSample::Valid(MilliCelsius(70000)));
        assert_eq!(state.count(Severity::Critical), 0);
        assert_eq!(state.count(Severity::Warning), 4);
    }

    #[test]
    fn test_read_failure_keeps_temp() {
        let mut state = ChannelState::new(channel(73000));
        state.update(ChannelSample::Valid(MilliCelsius(74000)));
        state.update(ChannelSample::Failed);
        state.update(ChannelSample::Failed);

        assert_eq!(state.fail_num(), 2);
        assert_eq!(state.temp(), Some(MilliCelsius(74000)));
        assert_eq!(state.sample(), None);
        // Stale temperature still counts against the threshold
        assert_eq!(state.count(Severity::Critical), 3);

        state.update(ChannelSample::Valid(MilliCelsius(40000)));
        assert_eq!(state.fail_num(), 0);
    }

    #[test]
    fn test_invalid_reading_resets_counters() {
        let mut state = ChannelState::new(channel(73000));
        state.update(ChannelSample::Failed);
        state.update(ChannelSample::Valid(MilliCelsius(74000)));
        state.update(ChannelSample::Invalid);

        assert_eq!(state.fail_num(), 0);
        assert_eq!(state.count(Severity::Critical), 0);
        assert_eq!(state.temp(), Some(MilliCelsius(74000)));
        assert_eq!(state.sample(), None);
    }

    #[test]
    fn test_offset_and_ignore() {
        let mut config = channel(73000);
        config.offset = MilliCelsius(-2000);
        let mut state = ChannelState::new(config.clone());
        state.update(ChannelSample::Valid(MilliCelsius(74000)));
        assert_eq!(state.temp(), Some(MilliCelsius(72000)));
        assert_eq!(state.count(Severity::Critical), 0);

        config.ignore = true;
        let mut ignored = ChannelState::new(config);
        ignored.update(ChannelSample::Valid(MilliCelsius(99000)));
        assert_eq!(ignored.count(Severity::Critical), 0);
        assert!(!ignored.at_or_above(Severity::Warning));
    }

    #[test]
    fn test_tracker_missing_samples_fail() {
        let mut tracker = ThresholdTracker::new(
            &[channel(73000), ChannelConfig { name: "INLET".to_string(), ..Default::default() }],
            ThresholdPolicy { read_fail_threshold: 1, ..Default::default() },
        );
        tracker.update(&[ChannelSample::Valid(MilliCelsius(30000))]);
        let failing: Vec<_> = tracker.failing_channels().map(|c| c.name()).collect();
        assert_eq!(failing, vec!["INLET"]);
        assert_eq!(tracker.index_of("INLET"), Some(1));
    }
}
