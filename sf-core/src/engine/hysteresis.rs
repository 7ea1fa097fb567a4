//! Hysteresis strategy
//!
//! Keeps the last output together with the temperature that produced it (the
//! trip point). A higher temperature moves the output immediately; a lower one
//! only once it falls below `trip - deadband`. Between those bounds the output
//! holds, which stops the duty from bouncing around a curve step.

use crate::data::policy::{CurvePoint, CurveShape, HysteresisConfig};
use crate::data::types::MilliCelsius;
use crate::engine::curve::lookup;

#[derive(Debug, Clone)]
pub struct Hysteresis {
    channel: usize,
    points: Vec<CurvePoint>,
    deadband: MilliCelsius,
    /// (trip temperature, output)
    last: Option<(MilliCelsius, u8)>,
}

impl Hysteresis {
    pub fn new(config: &HysteresisConfig, channel: usize) -> Self {
        Self {
            channel,
            points: config.points.clone(),
            deadband: config.deadband,
            last: None,
        }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Feed this tick's sample; without one the previous output holds
    pub fn update(&mut self, sample: Option<MilliCelsius>) -> Option<u8> {
        let Some(temp) = sample else {
            return self.last.map(|(_, output)| output);
        };

        let retrip = match self.last {
            None => true,
            Some((trip, _)) => {
                temp > trip || temp < MilliCelsius(trip.0.saturating_sub(self.deadband.0))
            }
        };

        if retrip {
            let output = lookup(&self.points, CurveShape::Piecewise, temp)?;
            self.last = Some((temp, output));
        }

        self.last.map(|(_, output)| output)
    }
}
