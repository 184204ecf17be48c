use std::time::Duration;

use loadphase_core::{
    IdentityMode, LoadProfile, ProfileSpec, RunOverrides, RunPlan, Stage, TargetSpec,
};

#[test]
fn cli_overrides_convert_ramping_vus_to_constant_vus() {
    let spec = ProfileSpec {
        name: Some("HighLoad".to_string()),
        executor: Some("ramping-vus".to_string()),
        // Intentionally missing ramping fields. They are ignored when CLI overrides
        // reshape the load.
        stages: vec![],
        ..ProfileSpec::default()
    };

    let overrides = RunOverrides {
        vus: Some(3),
        duration: Some(Duration::from_secs(2)),
        ..RunOverrides::default()
    };

    let plan = RunPlan::resolve(spec, overrides)
        .unwrap_or_else(|e| panic!("expected plan to be valid: {e}"));
    assert_eq!(plan.name, "HighLoad");
    assert_eq!(
        plan.load,
        LoadProfile::Constant {
            vus: 3,
            duration: Duration::from_secs(2)
        }
    );
}

#[test]
fn vus_override_on_ramping_profile_keeps_the_ramp_length() {
    let spec = ProfileSpec {
        executor: Some("ramping-vus".to_string()),
        stages: vec![
            Stage {
                duration: Duration::from_secs(5),
                target: 10,
            },
            Stage {
                duration: Duration::from_secs(5),
                target: 0,
            },
        ],
        ..ProfileSpec::default()
    };
    let overrides = RunOverrides {
        vus: Some(4),
        ..RunOverrides::default()
    };

    let plan = RunPlan::resolve(spec, overrides).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(
        plan.load,
        LoadProfile::Constant {
            vus: 4,
            duration: Duration::from_secs(10)
        }
    );
}

#[test]
fn ramping_vus_still_validates_when_no_cli_overrides() {
    let spec = ProfileSpec {
        executor: Some("ramping-vus".to_string()),
        stages: vec![Stage {
            duration: Duration::from_secs(1),
            target: 2,
        }],
        start_vus: Some(1),
        ..ProfileSpec::default()
    };

    let plan = RunPlan::resolve(spec, RunOverrides::default())
        .unwrap_or_else(|e| panic!("expected plan to be valid: {e}"));

    match &plan.load {
        LoadProfile::Ramping { start_vus, stages } => {
            assert_eq!(*start_vus, 1);
            assert_eq!(stages.len(), 1);
        }
        other => panic!("expected ramping-vus, got {other:?}"),
    }
}

#[test]
fn cli_values_beat_profile_values() {
    let spec = ProfileSpec {
        vus: Some(1),
        duration: Some(Duration::from_secs(1)),
        timeout: Some(Duration::from_secs(5)),
        think_time: Some(Duration::from_millis(100)),
        identity_mode: Some("unique".to_string()),
        identity_space: Some(1_000),
        target: TargetSpec {
            path: Some("/coupon/apply".to_string()),
            param: Some("userId".to_string()),
            headers: vec![("x-run".to_string(), "profile".to_string())],
        },
        ..ProfileSpec::default()
    };
    let overrides = RunOverrides {
        base_url: Some("http://10.0.0.5:9000".to_string()),
        timeout: Some(Duration::from_secs(1)),
        think_time: Some(Duration::ZERO),
        identity_mode: Some(IdentityMode::Repeat),
        identity_space: Some(500),
        graceful_stop: Some(Duration::from_secs(2)),
        tick: Some(Duration::from_millis(250)),
        ..RunOverrides::default()
    };

    let plan = RunPlan::resolve(spec, overrides).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(plan.timeout, Some(Duration::from_secs(1)));
    assert_eq!(plan.think_time, Duration::ZERO);
    assert_eq!(plan.identity.mode(), IdentityMode::Repeat);
    assert_eq!(plan.identity.space(), 500);
    assert_eq!(plan.graceful_stop, Duration::from_secs(2));
    assert_eq!(plan.tick, Duration::from_millis(250));
    assert_eq!(
        plan.target.url_for(500),
        "http://10.0.0.5:9000/coupon/apply?userId=500"
    );
    assert_eq!(
        plan.target.headers,
        vec![("x-run".to_string(), "profile".to_string())]
    );
}
