/*
 * Controller scenario tests for switchfan
 *
 * These tests drive the Controller through whole tick sequences, the way the
 * daemon does, and check the observable duty decisions.
 */

use proptest::prelude::*;
use sf_core::{
    parse_policy, AirflowDirection, ChannelSample, Controller, EscalationLevel, FanSample,
    MilliCelsius, Policy, PsuSample, RebootStep, RotorSample, TickDecision, TickSample,
};

const POLICY: &str = r#"{
    "pwm": {"min_pwm": 128, "max_pwm": 255, "abnormal_duty": 192},
    "channels": [
        {"name": "INLET"},
        {"name": "SWITCH_TEMP", "critical": 73000, "emergency": 80000},
        {"name": "CPU_TEMP", "critical": 95000}
    ],
    "fans": [{"name": "FAN1"}, {"name": "FAN2"}, {"name": "FAN3"}],
    "psus": [{"name": "PSU1"}, {"name": "PSU2"}],
    "open_loop": {
        "channel": "INLET",
        "shape": "linear",
        "points": [{"temp": 25000, "duty": 128}, {"temp": 45000, "duty": 224}]
    },
    "hysteresis": [{
        "channel": "SWITCH_TEMP",
        "points": [
            {"temp": 50000, "duty": 128},
            {"temp": 60000, "duty": 160},
            {"temp": 70000, "duty": 208}
        ],
        "deadband": 3000
    }],
    "plug_in": {"duty": 192, "ticks": 3},
    "repair": {
        "enabled": true,
        "ticks": 4,
        "tables": {"FAN1": {"FAN1": 255, "FAN2": 224, "FAN3": 224}}
    },
    "airflow": {"correct_duty": 176, "error_duty": 144}
}"#;

// Inlet 30°C on the linear curve
const NOMINAL_DUTY: u8 = 152;

// Test utilities
fn policy() -> Policy {
    parse_policy(POLICY).expect("fixture policy is valid")
}

fn sample(policy: &Policy, inlet: i32, switch: i32) -> TickSample {
    let mut sample = TickSample::nominal(policy, MilliCelsius(50000));
    sample.channels[0] = ChannelSample::Valid(MilliCelsius(inlet));
    sample.channels[1] = ChannelSample::Valid(MilliCelsius(switch));
    sample
}

fn nominal(policy: &Policy) -> TickSample {
    sample(policy, 30000, 50000)
}

// Strategies for arbitrary telemetry on the fixture chassis

fn channel_sample() -> impl Strategy<Value = ChannelSample> {
    prop_oneof![
        1 => Just(ChannelSample::Failed),
        1 => Just(ChannelSample::Invalid),
        8 => (0i32..100_000).prop_map(|t| ChannelSample::Valid(MilliCelsius(t))),
    ]
}

fn airflow() -> impl Strategy<Value = AirflowDirection> {
    prop_oneof![
        8 => Just(AirflowDirection::F2B),
        1 => Just(AirflowDirection::B2F),
        1 => Just(AirflowDirection::Unknown),
    ]
}

fn fan_sample() -> impl Strategy<Value = FanSample> {
    (prop::bool::weighted(0.9), prop::bool::weighted(0.8), airflow()).prop_map(
        |(present, running, airflow)| FanSample {
            present,
            rotors: vec![if running { RotorSample::running() } else { RotorSample::stalled() }],
            airflow,
        },
    )
}

fn psu_sample() -> impl Strategy<Value = PsuSample> {
    (prop::bool::weighted(0.9), prop::bool::weighted(0.9), airflow())
        .prop_map(|(present, io_ok, airflow)| PsuSample { present, io_ok, airflow })
}

fn tick_sample() -> impl Strategy<Value = TickSample> {
    (
        prop::collection::vec(channel_sample(), 3),
        prop::collection::vec(fan_sample(), 3),
        prop::collection::vec(psu_sample(), 2),
        airflow(),
    )
        .prop_map(|(channels, fans, psus, board_airflow)| TickSample {
            channels,
            fans,
            psus,
            board_airflow,
        })
}

fn sample_stream() -> impl Strategy<Value = Vec<TickSample>> {
    prop::collection::vec(tick_sample(), 1..120)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_duty_always_within_bounds(stream in sample_stream()) {
        let policy = policy();
        let mut controller = Controller::new(policy.clone()).unwrap();
        for sample in &stream {
            if controller.reboot_in_flight() {
                controller.poll_reboot_check(sample);
                continue;
            }
            let decision = controller.tick(sample);
            for duty in decision.fan_duties.iter().chain(&decision.psu_duties) {
                prop_assert!(
                    (policy.pwm.min_pwm..=policy.pwm.max_pwm).contains(duty),
                    "duty {:#04x} out of bounds",
                    duty
                );
            }
        }
    }

    #[test]
    fn prop_replay_is_deterministic(stream in sample_stream(), split in 0usize..120) {
        let policy = policy();
        let run = |mut controller: Controller, samples: &[TickSample]| -> Vec<TickDecision> {
            samples.iter().map(|s| controller.tick(s)).collect()
        };

        let first = run(Controller::new(policy.clone()).unwrap(), &stream);
        let second = run(Controller::new(policy.clone()).unwrap(), &stream);
        prop_assert_eq!(first, second);

        // Replaying from a mid-stream snapshot matches too
        let split = split.min(stream.len());
        let mut controller = Controller::new(policy.clone()).unwrap();
        for sample in &stream[..split] {
            controller.tick(sample);
        }
        let snapshot = controller.clone();
        prop_assert_eq!(run(controller, &stream[split..]), run(snapshot, &stream[split..]));
    }
}

#[test]
fn test_steady_reading_is_stable() {
    let policy = policy();
    let mut controller = Controller::new(policy.clone()).unwrap();
    let steady = sample(&policy, 30000, 65000);

    let decisions: Vec<TickDecision> = (0..8).map(|_| controller.tick(&steady)).collect();
    let settled = &decisions[policy.thresholds.warning_repeat as usize..];
    assert!(settled.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(settled[0].scalar, 160);
}

#[test]
fn test_open_loop_monotonic() {
    let policy = policy();
    let mut last = 0u8;
    for inlet in (15_000..60_000).step_by(500) {
        let mut controller = Controller::new(policy.clone()).unwrap();
        let duty = controller.tick(&sample(&policy, inlet, 40000)).scalar;
        assert!(duty >= last, "duty fell from {} to {} at {}", last, duty, inlet);
        last = duty;
    }
    assert_eq!(last, 224);
}

#[test]
fn test_plug_in_grace() {
    let policy = policy();
    let mut controller = Controller::new(policy.clone()).unwrap();

    let decision = controller.tick(&nominal(&policy));
    assert_eq!(decision.fan_duties, vec![NOMINAL_DUTY; 3]);

    let mut pulled = nominal(&policy);
    pulled.fans[1].present = false;
    let decision = controller.tick(&pulled);
    assert_eq!(decision.scalar, 255);

    for _ in 0..policy.plug_in.ticks {
        let decision = controller.tick(&nominal(&policy));
        assert_eq!(decision.fan_duties, vec![NOMINAL_DUTY, 192, NOMINAL_DUTY]);
    }

    let decision = controller.tick(&nominal(&policy));
    assert_eq!(decision.fan_duties, vec![NOMINAL_DUTY; 3]);
}

#[test]
fn test_single_fan_repair_then_fallback() {
    let policy = policy();
    let mut controller = Controller::new(policy.clone()).unwrap();
    let mut stalled = nominal(&policy);
    stalled.fans[0].rotors[0] = RotorSample::stalled();

    // Below the stall threshold nothing changes
    for _ in 1..policy.abnormal.rotor_stall_ticks {
        let decision = controller.tick(&stalled);
        assert_eq!(decision.fan_duties, vec![NOMINAL_DUTY; 3]);
    }

    for _ in 0..policy.repair.ticks {
        let decision = controller.tick(&stalled);
        assert_eq!(decision.fan_duties, vec![255, 224, 224]);
    }

    let decision = controller.tick(&stalled);
    assert_eq!(decision.fan_duties, vec![255; 3]);
    assert!(!controller.fans()[0].repairable);

    let decision = controller.tick(&nominal(&policy));
    assert_eq!(decision.fan_duties, vec![NOMINAL_DUTY; 3]);
    assert!(controller.fans()[0].repairable);
    assert_eq!(controller.state().repair, None);
}

#[test]
fn test_switch_temp_critical() {
    let policy = policy();
    let mut controller = Controller::new(policy.clone()).unwrap();
    let hot = sample(&policy, 30000, 74000);

    for _ in 1..policy.thresholds.critical_repeat {
        let decision = controller.tick(&hot);
        assert_eq!(decision.level, EscalationLevel::Normal);
        assert_eq!(decision.scalar, 208);
    }

    let decision = controller.tick(&hot);
    assert_eq!(decision.level, EscalationLevel::Critical);
    assert_eq!(
        controller.state().escalation.critical_remaining(),
        policy.safety.critical_hold_secs
    );
    assert_eq!(decision.scalar, policy.pwm.max_pwm);
    assert!(decision.fan_duties.iter().all(|d| *d == policy.pwm.max_pwm));
    assert!(decision.psu_duties.iter().all(|d| *d == policy.pwm.max_pwm));
    assert!(decision.reboot_check.is_none());

    // Sticky while the countdown runs
    let decision = controller.tick(&nominal(&policy));
    assert_eq!(decision.level, EscalationLevel::Critical);
    assert_eq!(decision.scalar, policy.pwm.max_pwm);
}

#[test]
fn test_switch_temp_reboot() {
    let mut policy = policy();
    policy.safety.switch_channel = Some("SWITCH_TEMP".to_string());
    policy.safety.poll_count = 2;
    let mut controller = Controller::new(policy.clone()).unwrap();
    let hot = sample(&policy, 30000, 74000);

    controller.tick(&hot);
    controller.tick(&hot);
    let decision = controller.tick(&hot);
    assert_eq!(decision.level, EscalationLevel::ShutdownPending);
    assert!(decision.reboot_check.unwrap().contains("SWITCH_TEMP"));

    assert_eq!(controller.poll_reboot_check(&hot), Some(RebootStep::Continue));
    assert!(matches!(
        controller.poll_reboot_check(&hot),
        Some(RebootStep::Reboot { cause }) if cause.contains("SWITCH_TEMP")
    ));
}

#[test]
fn test_airflow_consistent_no_override() {
    let policy = policy();
    let mut controller = Controller::new(policy.clone()).unwrap();
    let mut sample = nominal(&policy);
    sample.board_airflow = AirflowDirection::F2B;
    for fan in sample.fans.iter_mut() {
        fan.airflow = AirflowDirection::F2B;
    }
    for psu in sample.psus.iter_mut() {
        psu.airflow = AirflowDirection::F2B;
    }

    let decision = controller.tick(&sample);
    assert!(!decision.airflow_inconsistent);
    assert_eq!(decision.fan_duties, vec![decision.scalar; 3]);
    assert_eq!(decision.psu_duties, vec![decision.scalar; 2]);
}

#[test]
fn test_airflow_single_reversed_fan() {
    let policy = policy();
    let mut controller = Controller::new(policy.clone()).unwrap();
    let mut sample = nominal(&policy);
    sample.board_airflow = AirflowDirection::F2B;
    for fan in sample.fans.iter_mut() {
        fan.airflow = AirflowDirection::F2B;
    }
    sample.fans[1].airflow = AirflowDirection::B2F;

    let decision = controller.tick(&sample);
    assert!(decision.airflow_inconsistent);
    assert_eq!(decision.scalar, NOMINAL_DUTY);
    assert_eq!(decision.fan_duties, vec![176, 144, 176]);
    assert_eq!(decision.psu_duties, vec![176, 176]);
}
