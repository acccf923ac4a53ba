// Fatal errors in each phase still tear everything down

use benchvisor_common::{HarnessError, Phase};
use benchvisor_harness::{Harness, HarnessConfig, KvConfig, WorkloadConfig};
use e2e_tests::TestEnv;
use std::path::PathBuf;

#[tokio::test]
async fn test_invalid_read_percent_launches_nothing() {
    let env = TestEnv::new();
    let config = env.config(WorkloadConfig::Kv(KvConfig {
        read_percent: 33,
        ..KvConfig::default()
    }));

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("33"));
    assert!(config.resolve().is_err());

    let yaml = "workload:\n  kind: kv\n  read_percent: 33\n";
    assert!(HarnessConfig::load_from_string(yaml).is_err());

    assert!(env.invocations().is_empty());
    assert!(env.leftovers().is_empty());
}

#[tokio::test]
async fn test_launch_failure() {
    let env = TestEnv::new();
    let mut config = env.config(WorkloadConfig::default());
    config.cockroach_bin = Some(PathBuf::from("/nonexistent/cockroach"));

    let outcome = Harness::new(env.resolve(&config)).run().await;

    match &outcome.result {
        Err(e @ HarnessError::Launch { .. }) => assert_eq!(e.phase(), Phase::Launch),
        other => panic!("expected launch failure, got {other:?}"),
    }
    assert_eq!(outcome.exit_code(), 1);
    assert!(env.leftovers().is_empty());
}

#[tokio::test]
async fn test_init_failure_skips_run() {
    let env = TestEnv::new();
    let mut config = env.config(WorkloadConfig::default());
    config.env.insert("FAKEROACH_FAIL_INIT".to_string(), "1".to_string());

    let outcome = Harness::new(env.resolve(&config)).run().await;

    match &outcome.result {
        Err(HarnessError::Phase { phase, stderr, .. }) => {
            assert_eq!(*phase, Phase::Init);
            assert!(stderr.contains("FAKEROACH_FAIL_INIT"), "stderr: {stderr}");
        }
        other => panic!("expected init failure, got {other:?}"),
    }
    assert_eq!(env.invocations_of("workload init").len(), 1);
    assert!(env.invocations_of("workload run").is_empty());
    assert!(!outcome.shutdown[0].forced);
    assert!(env.leftovers().is_empty());
}

#[tokio::test]
async fn test_run_failure_reports_driver_stderr() {
    let env = TestEnv::new();
    let mut config = env.config(WorkloadConfig::default());
    config.env.insert("FAKEROACH_FAIL_RUN".to_string(), "1".to_string());

    let outcome = Harness::new(env.resolve(&config)).run().await;

    let err = outcome.result.as_ref().unwrap_err();
    assert_eq!(err.phase(), Phase::Run);
    assert!(err.to_string().contains("forced by FAKEROACH_FAIL_RUN"));
    assert_eq!(outcome.exit_code(), 1);
    assert!(env.leftovers().is_empty());
}
