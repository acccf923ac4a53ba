// Readiness wait against misbehaving servers

use benchvisor_common::{CrashPolicy, HarnessError, Phase};
use benchvisor_harness::{Harness, WorkloadConfig};
use benchvisor_instance_state::InstanceState;
use e2e_tests::TestEnv;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_control_probe_never_passes() {
    let env = TestEnv::new();
    let mut config = env.config(WorkloadConfig::default());
    config.readiness_timeout = Duration::from_millis(1500);
    config.env.insert("FAKEROACH_STATUS_FAIL".to_string(), "1".to_string());

    let started = Instant::now();
    let outcome = Harness::new(env.resolve(&config)).run().await;

    match &outcome.result {
        Err(HarnessError::ReadinessTimeout { deadline, pending }) => {
            assert_eq!(*deadline, Duration::from_millis(1500));
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].as_str(), "roach-node");
        }
        other => panic!("expected readiness timeout, got {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert_eq!(outcome.exit_code(), 1);

    // No workload was attempted
    assert!(env.invocations_of("workload").is_empty());
    assert!(!env.invocations_of("node status").is_empty());

    assert_eq!(outcome.shutdown[0].final_state, InstanceState::CleanedUp);
    assert!(env.leftovers().is_empty(), "leftovers: {:?}", env.leftovers());
}

#[tokio::test]
async fn test_slow_start_is_retried() {
    let env = TestEnv::new();
    let mut config = env.config(WorkloadConfig::default());
    config.env.insert("FAKEROACH_START_DELAY_MS".to_string(), "600".to_string());

    let outcome = Harness::new(env.resolve(&config)).run().await;

    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert!(env.invocations_of("node status").len() > 1);
}

#[tokio::test]
async fn test_fail_fast_on_server_exit() {
    let env = TestEnv::new();
    let mut config = env.config(WorkloadConfig::default());
    config.crash_policy = CrashPolicy::FailFast;
    config.readiness_timeout = Duration::from_secs(30);
    config.env.insert("FAKEROACH_EXIT_ON_START".to_string(), "1".to_string());

    let started = Instant::now();
    let outcome = Harness::new(env.resolve(&config)).run().await;

    match &outcome.result {
        Err(e @ HarnessError::InstanceExited { instance, .. }) => {
            assert_eq!(instance.as_str(), "roach-node");
            assert_eq!(e.phase(), Phase::Readiness);
        }
        other => panic!("expected instance exit, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(env.leftovers().is_empty());
}

#[tokio::test]
async fn test_retry_policy_waits_out_the_deadline() {
    let env = TestEnv::new();
    let mut config = env.config(WorkloadConfig::default());
    config.crash_policy = CrashPolicy::Retry;
    config.readiness_timeout = Duration::from_millis(800);
    config.env.insert("FAKEROACH_EXIT_ON_START".to_string(), "1".to_string());

    let outcome = Harness::new(env.resolve(&config)).run().await;

    assert!(matches!(outcome.result, Err(HarnessError::ReadinessTimeout { .. })));
    assert_eq!(outcome.shutdown[0].final_state, InstanceState::CleanedUp);
    assert!(outcome.shutdown[0].exit_status.is_some());
    assert!(env.leftovers().is_empty());
}
