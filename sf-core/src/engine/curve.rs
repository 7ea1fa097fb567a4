//! Open-loop temperature curves
//!
//! Maps a channel temperature to a duty through a fixed table of points.
//!
//! # Shapes
//!
//! 1. **Linear**: interpolates between the two points that bracket the
//!    temperature. Below the first point the first duty applies, above the
//!    last point the last duty applies.
//!
//! 2. **Piecewise**: a step curve. The duty of the highest point whose
//!    temperature is at or below the reading applies until the next point.
//!
//! Both shapes are monotonic as long as point duties never decrease, which
//! policy validation enforces.

use crate::data::policy::{CurvePoint, CurveShape, OpenLoopConfig};
use crate::data::types::MilliCelsius;

/// Look up the duty for a temperature
///
/// Returns `None` only for an empty point table.
pub fn lookup(points: &[CurvePoint], shape: CurveShape, temp: MilliCelsius) -> Option<u8> {
    let first_point = points.first()?;
    let last_point = points.last()?;

    // Below the curve - use the lowest defined duty
    if temp <= first_point.temp {
        return Some(first_point.duty);
    }

    // Above the curve - use the highest defined duty
    if temp >= last_point.temp {
        return Some(last_point.duty);
    }

    for window in points.windows(2) {
        let lower_point = &window[0];
        let upper_point = &window[1];

        if temp >= lower_point.temp && temp < upper_point.temp {
            if shape == CurveShape::Piecewise {
                return Some(lower_point.duty);
            }

            let temp_range = i64::from(upper_point.temp.0) - i64::from(lower_point.temp.0);
            if temp_range <= 0 {
                return Some(lower_point.duty);
            }

            let offset = i64::from(temp.0) - i64::from(lower_point.temp.0);
            let duty_range = i64::from(upper_point.duty) - i64::from(lower_point.duty);
            let duty = i64::from(lower_point.duty) + offset * duty_range / temp_range;
            return Some(duty.clamp(0, i64::from(u8::MAX)) as u8);
        }
    }

    Some(last_point.duty)
}

/// Open-loop strategy bound to its primary channel
#[derive(Debug, Clone)]
pub struct OpenLoopCurve {
    channel: usize,
    shape: CurveShape,
    points: Vec<CurvePoint>,
    floor: u8,
}

impl OpenLoopCurve {
    /// `channel` is the index of the primary channel, `fallback` the duty used
    /// when the policy does not set `floor_duty`
    pub fn new(config: &OpenLoopConfig, channel: usize, fallback: u8) -> Self {
        Self {
            channel,
            shape: config.shape,
            points: config.points.clone(),
            floor: config.floor_duty.unwrap_or(fallback),
        }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Duty for the primary channel's sample, or the floor without one
    pub fn evaluate(&self, sample: Option<MilliCelsius>) -> u8 {
        sample
            .and_then(|temp| lookup(&self.points, self.shape, temp))
            .unwrap_or(self.floor)
    }
}
