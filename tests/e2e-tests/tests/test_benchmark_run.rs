// Full pipeline runs against fakeroach

use benchvisor_harness::{Harness, KvConfig, TpccConfig, WorkloadConfig};
use benchvisor_instance_state::InstanceState;
use e2e_tests::{TestEnv, TEST_HOST_PARALLELISM};

#[tokio::test]
async fn test_kv_single_proc_run() {
    let env = TestEnv::new();
    let mut config = env.config(WorkloadConfig::Kv(KvConfig::default()));
    config.procs_per_inst = 1;
    let port = config.base_port;

    let outcome = Harness::new(env.resolve(&config)).run().await;

    let report = outcome.result.as_ref().expect("run should succeed");
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(report.workload, "kv");
    assert!(report.result_line().starts_with("[RESULT] total elapsed time: "));
    assert!(report.result_line().ends_with(" s"));

    let server = env.invocations_of("start-single-node");
    assert_eq!(server.len(), 1);
    assert!(server[0].starts_with("GOMAXPROCS=1 "), "{}", server[0]);
    assert!(server[0].contains(&format!("--listen-addr 127.0.0.1:{}", port)));
    assert!(server[0].contains(&format!("--http-addr 127.0.0.1:{}", port + 1)));
    assert!(server[0].contains("--cache 0.25"));

    let pgurl = format!("postgres://root@127.0.0.1:{}?sslmode=disable", port);

    let init = env.invocations_of("workload init");
    assert_eq!(init, vec![format!("GOMAXPROCS=1 workload init kv {}", pgurl)]);

    let run = env.invocations_of("workload run");
    assert_eq!(run.len(), 1);
    assert!(run[0].starts_with("GOMAXPROCS=1 workload run kv --read-percent=50 "));
    assert!(run[0].contains(" --seed=42 "));
    assert!(run[0].contains(" --max-ops=2000000 "));
    assert!(run[0].ends_with(&pgurl));

    // Readiness was established through the control plane before init
    let invocations = env.invocations();
    let first_status = invocations.iter().position(|l| l.contains(" node status "));
    let first_init = invocations.iter().position(|l| l.contains(" workload init "));
    assert!(first_status.is_some());
    assert!(first_status < first_init);

    assert_eq!(outcome.shutdown.len(), 1);
    assert!(!outcome.shutdown[0].forced);
    assert_eq!(outcome.shutdown[0].final_state, InstanceState::CleanedUp);
    assert!(env.leftovers().is_empty(), "leftovers: {:?}", env.leftovers());
}

#[tokio::test]
async fn test_tpcc_scales_per_core() {
    let env = TestEnv::new();
    let config = env.config(WorkloadConfig::Tpcc(TpccConfig::default()));

    let outcome = Harness::new(env.resolve(&config)).run().await;
    assert!(outcome.is_success(), "{:?}", outcome.result);

    let server = env.invocations_of("start-single-node");
    assert!(server[0].starts_with("GOMAXPROCS=2 "));
    assert!(server[0].contains("--cache 0.5"));

    // Drivers use the whole host
    let driver_procs = format!("GOMAXPROCS={} ", TEST_HOST_PARALLELISM);
    let init = env.invocations_of("workload init");
    assert!(init[0].starts_with(&driver_procs), "{}", init[0]);
    assert!(init[0].contains("workload init tpcc --warehouses=2 --seed=42"));

    let run = env.invocations_of("workload run");
    assert!(run[0].starts_with(&driver_procs), "{}", run[0]);
    assert!(run[0].contains("--warehouses=2 --concurrency=400 "));
    assert!(run[0].contains("--max-ops=80000"));
    assert!(env.leftovers().is_empty());
}

#[tokio::test]
async fn test_zero_max_ops_runs_unbounded() {
    let env = TestEnv::new();
    let config = env.config(WorkloadConfig::Kv(KvConfig {
        read_percent: 95,
        max_ops: 0,
    }));

    let outcome = Harness::new(env.resolve(&config)).run().await;
    assert!(outcome.is_success(), "{:?}", outcome.result);

    let run = env.invocations_of("workload run");
    assert!(run[0].contains("--read-percent=95"));
    assert!(!run[0].contains("--max-ops"));
}

#[tokio::test]
async fn test_stale_directories_are_replaced() {
    let env = TestEnv::new();
    let stale = env.tmp().join("roach-node");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("OLD-STORE"), "stale").unwrap();

    let config = env.config(WorkloadConfig::default());
    let outcome = Harness::new(env.resolve(&config)).run().await;

    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert!(env.leftovers().is_empty());
}
