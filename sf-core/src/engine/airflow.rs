//! Airflow consistency check
//!
//! Compares the board's declared airflow against every unit's own. Any
//! mismatch replaces the uniform duty with a per-unit table.

use crate::data::types::AirflowDirection;
use crate::engine::units::{FanState, PsuState};

/// Mark inconsistent units; returns whether any unit is inconsistent
///
/// Unknown board airflow clears every flag. Absent units and units that do
/// not declare a direction are never inconsistent.
pub fn check(board: AirflowDirection, fans: &mut [FanState], psus: &mut [PsuState]) -> bool {
    let mismatch = |unit: AirflowDirection, present: bool| {
        board.is_known() && present && unit.is_known() && unit != board
    };

    let mut any = false;
    for fan in fans.iter_mut() {
        fan.inconsistent = !fan.parked && mismatch(fan.airflow, fan.is_present());
        any |= fan.inconsistent;
    }
    for psu in psus.iter_mut() {
        psu.inconsistent = mismatch(psu.airflow, psu.present);
        any |= psu.inconsistent;
    }
    any
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::policy::{FanConfig, PsuConfig};
    use crate::data::sample::{FanSample, PsuSample, RotorSample};

    fn fan(name: &str, airflow: AirflowDirection) -> FanState {
        let mut fan = FanState::new(&FanConfig::named(name));
        fan.observe(&FanSample {
            present: true,
            rotors: vec![RotorSample::running()],
            airflow,
        });
        fan
    }

    fn psu(airflow: AirflowDirection) -> PsuState {
        let mut psu = PsuState::new(&PsuConfig::named("PSU1"));
        psu.observe(&PsuSample { present: true, io_ok: true, airflow });
        psu
    }

    #[test]
    fn test_all_matching() {
        let mut fans = vec![fan("FAN1", AirflowDirection::F2B), fan("FAN2", AirflowDirection::F2B)];
        let mut psus = vec![psu(AirflowDirection::F2B)];
        assert!(!check(AirflowDirection::F2B, &mut fans, &mut psus));
        assert!(fans.iter().all(|f| !f.inconsistent));
    }

    #[test]
    fn test_single_reversed_fan() {
        let mut fans = vec![fan("FAN1", AirflowDirection::F2B), fan("FAN2", AirflowDirection::B2F)];
        let mut psus = vec![psu(AirflowDirection::F2B)];
        assert!(check(AirflowDirection::F2B, &mut fans, &mut psus));
        assert!(!fans[0].inconsistent);
        assert!(fans[1].inconsistent);
        assert!(!psus[0].inconsistent);
    }

    #[test]
    fn test_unknown_board_clears_flags() {
        let mut fans = vec![fan("FAN1", AirflowDirection::B2F)];
        fans[0].inconsistent = true;
        assert!(!check(AirflowDirection::Unknown, &mut fans, &mut []));
        assert!(!fans[0].inconsistent);
    }

    #[test]
    fn test_unknown_unit_is_consistent() {
        let mut fans = vec![fan("FAN1", AirflowDirection::Unknown)];
        let mut psus = vec![psu(AirflowDirection::B2F)];
        assert!(check(AirflowDirection::F2B, &mut fans, &mut psus));
        assert!(!fans[0].inconsistent);
        assert!(psus[0].inconsistent);
    }
}
