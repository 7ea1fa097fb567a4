//! Duty arbitration
//!
//! The scalar duty is the maximum of every strategy output and abnormal floor.
//! Two per-fan overrides sit on top of it: the plug-in grace for a freshly
//! reinserted fan and the single-fan repair table.

use tracing::{info, warn};

use crate::data::policy::{PlugInPolicy, PwmPolicy, RepairPolicy};
use crate::data::types::FanId;
use crate::engine::units::FanState;

/// Max-wins combination, bounded to `[min_pwm, max_pwm]`
pub fn combine(candidates: impl IntoIterator<Item = u8>, bounds: &PwmPolicy) -> u8 {
    candidates
        .into_iter()
        .max()
        .unwrap_or(bounds.min_pwm)
        .clamp(bounds.min_pwm, bounds.max_pwm)
}

/// Start, continue or cancel plug-in grace; returns the per-fan override
///
/// The reinsertion tick counts as the first grace tick. Any absent fan
/// cancels every running grace.
pub fn plug_in_overrides(fans: &mut [FanState], policy: &PlugInPolicy, absent_fans: usize) -> Vec<Option<u8>> {
    fans.iter_mut()
        .map(|fan| {
            if fan.take_reinserted() && absent_fans == 0 && policy.ticks > 0 {
                info!("{} reinserted, holding plug-in duty for {} ticks", fan.name, policy.ticks);
                fan.plug_in_remaining = policy.ticks;
            }
            if absent_fans > 0 {
                fan.plug_in_remaining = 0;
            }
            if fan.plug_in_remaining > 0 {
                fan.plug_in_remaining -= 1;
                Some(policy.duty)
            } else {
                None
            }
        })
        .collect()
}

/// Advance the single-fan repair policy; returns the per-fan override
///
/// `repair` is the fan currently under repair. At most one fan is ever under
/// repair, and only while it is the only faulty fan and no fan is absent.
pub fn repair_overrides(
    fans: &mut [FanState],
    repair: &mut Option<FanId>,
    policy: &RepairPolicy,
    faulty_fans: &[FanId],
    absent_fans: usize,
) -> Vec<Option<u8>> {
    let mut overrides = vec![None; fans.len()];

    // Healthy fans regain eligibility
    for (index, fan) in fans.iter_mut().enumerate() {
        if !faulty_fans.contains(&FanId(index)) && !fan.repairable {
            fan.repairable = true;
        }
    }

    let single_fault = faulty_fans.len() == 1 && absent_fans == 0;

    if let Some(id) = *repair {
        if !faulty_fans.contains(&id) {
            info!("{} recovered, leaving repair policy", fans[id.0].name);
            fans[id.0].repair_remaining = 0;
            *repair = None;
        } else if !single_fault {
            warn!(
                "Repair of {} abandoned: {} faulty, {} absent",
                fans[id.0].name,
                faulty_fans.len(),
                absent_fans
            );
            fans[id.0].repair_remaining = 0;
            *repair = None;
        }
    }

    if repair.is_none() && policy.enabled && single_fault {
        let id = faulty_fans[0];
        let fan = &mut fans[id.0];
        if fan.repairable && policy.tables.contains_key(&fan.name) && policy.ticks > 0 {
            info!("{} faulty, applying repair table for {} ticks", fan.name, policy.ticks);
            fan.repair_remaining = policy.ticks;
            *repair = Some(id);
        }
    }

    let Some(id) = *repair else {
        return overrides;
    };

    if fans[id.0].repair_remaining == 0 {
        warn!("{} not repaired in time, falling back to uniform duty", fans[id.0].name);
        fans[id.0].repairable = false;
        *repair = None;
        return overrides;
    }

    fans[id.0].repair_remaining -= 1;
    if let Some(table) = policy.tables.get(&fans[id.0].name) {
        for (index, fan) in fans.iter().enumerate() {
            overrides[index] = table.get(&fan.name).copied();
        }
    }
    overrides
}
