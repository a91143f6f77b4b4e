// crates/flowruntime/tests/env_config_test.rs
//
// Kept in its own test binary: it mutates the process environment.

use flowcore::{flow, wait, Spec, Value};
use flowruntime::{execute, RuntimeConfig};
use std::time::Duration;

#[tokio::test]
async fn test_free_execute_reads_max_parallel_from_env() {
    std::env::set_var(RuntimeConfig::MAX_PARALLEL_ENV, "1");
    std::env::set_var(RuntimeConfig::EVENT_BUFFER_ENV, "not-a-number");

    let config = RuntimeConfig::from_env();
    assert_eq!(config.max_parallel_nodes, 1);
    assert_eq!(config.event_buffer_size, RuntimeConfig::default().event_buffer_size);

    let waits = flow(vec![
        Spec::from(wait(Duration::from_millis(32))),
        Spec::from(wait(Duration::from_millis(32))),
    ])
    .unwrap()
    .parallel()
    .unwrap();
    let result = execute(vec![], waits).await.unwrap();

    assert_eq!(result.result, Ok(Value::Null));
    assert!(
        result.meta.bench.duration >= Duration::from_millis(64),
        "took {:?}",
        result.meta.bench.duration
    );

    std::env::remove_var(RuntimeConfig::MAX_PARALLEL_ENV);
    std::env::remove_var(RuntimeConfig::EVENT_BUFFER_ENV);
}
