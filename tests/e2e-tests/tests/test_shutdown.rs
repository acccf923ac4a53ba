// Graceful, forced and aborted shutdowns

use benchvisor_common::{HarnessError, Phase};
use benchvisor_harness::{Harness, WorkloadConfig, EXIT_CODE_ABORTED};
use benchvisor_instance_state::InstanceState;
use e2e_tests::TestEnv;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};

#[tokio::test]
async fn test_graceful_stop() {
    let env = TestEnv::new();
    let config = env.config(WorkloadConfig::default());

    let outcome = Harness::new(env.resolve(&config)).run().await;

    assert!(outcome.is_success(), "{:?}", outcome.result);
    let report = &outcome.shutdown[0];
    assert!(!report.forced);
    assert_eq!(report.final_state, InstanceState::CleanedUp);
    assert!(report.exit_status.is_some());
}

#[tokio::test]
async fn test_forced_stop_after_grace_period() {
    let env = TestEnv::new();
    let mut config = env.config(WorkloadConfig::default());
    config.grace_period = Duration::from_millis(500);
    config.env.insert("FAKEROACH_IGNORE_SIGTERM".to_string(), "1".to_string());

    let outcome = Harness::new(env.resolve(&config)).run().await;

    // Teardown never changes the verdict
    assert!(outcome.is_success(), "{:?}", outcome.result);
    let report = &outcome.shutdown[0];
    assert!(report.forced);
    assert_eq!(report.final_state, InstanceState::CleanedUp);
    assert!(env.leftovers().is_empty(), "leftovers: {:?}", env.leftovers());
}

#[tokio::test]
async fn test_abort_during_run() {
    let env = TestEnv::new();
    let mut config = env.config(WorkloadConfig::default());
    config.env.insert("FAKEROACH_RUN_MS".to_string(), "30000".to_string());

    let harness = Harness::new(env.resolve(&config));
    let abort = harness.abort_token();

    let record = env.record_path();
    tokio::spawn(async move {
        loop {
            let started = std::fs::read_to_string(&record)
                .map(|s| s.contains(" workload run "))
                .unwrap_or(false);
            if started {
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }
        abort.cancel();
    });

    let started = Instant::now();
    let outcome = timeout(Duration::from_secs(25), harness.run())
        .await
        .expect("abort should end the run");

    match &outcome.result {
        Err(HarnessError::Aborted { phase }) => assert_eq!(*phase, Phase::Run),
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(outcome.exit_code(), EXIT_CODE_ABORTED);
    assert!(started.elapsed() < Duration::from_secs(25));
    assert_eq!(outcome.shutdown[0].final_state, InstanceState::CleanedUp);
    assert!(env.leftovers().is_empty());
}
