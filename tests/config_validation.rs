//! Correlation config loading tests: validation errors surfaced to the CLI
//! and CSV-backed master data resolved relative to the config file.

use std::fs;
use std::sync::Arc;
use streamgen::{run_generation, RunOptions};
use streamgen_core::{ConfigError, CorrelationConfig, ShutdownCoordinator, ValidationError};
use streamgen_sink::MemorySink;

#[test]
fn test_unknown_master_reference_rejected() {
    let err = CorrelationConfig::from_yaml(
        r#"
transactional_data:
  orders:
    sink_topic: orders
    relationships:
      customer_id: { references: customers.customer_id }
"#,
    )
    .unwrap_err();

    match err {
        ConfigError::Validation(ValidationError::UnknownTarget {
            entity,
            field,
            target,
        }) => {
            assert_eq!(entity, "orders");
            assert_eq!(field, "customer_id");
            assert_eq!(target, "customers");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_transactional_cycle_rejected() {
    let err = CorrelationConfig::from_yaml(
        r#"
transactional_data:
  orders:
    sink_topic: orders
    id_field: refund_id
    relationships:
      refund_id: { references: refunds.order_id }
  refunds:
    sink_topic: refunds
    id_field: order_id
    relationships:
      order_id: { references: orders.refund_id }
"#,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ConfigError::Validation(ValidationError::Cycle(_))
    ));
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = CorrelationConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[tokio::test]
async fn test_csv_master_relative_to_config() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("customers.csv"),
        "customer_id,name,tier\nC1,Ada,1\nC2,Grace,2\n",
    )?;
    let config_path = dir.path().join("shop.yaml");
    fs::write(
        &config_path,
        r#"
seed: 3
master_data:
  customers:
    source: csv
    file: customers.csv
    id_field: customer_id
    sink_topic: customers
transactional_data:
  orders:
    sink_topic: orders
    max_messages: 25
    relationships:
      customer_id: { references: customers.customer_id }
"#,
    )?;

    let config = CorrelationConfig::from_file(&config_path)?;
    assert_eq!(config.generation_order(), ["customers", "orders"]);

    let sink = Arc::new(MemorySink::new());
    let summary = run_generation(
        config,
        sink.clone(),
        Arc::new(ShutdownCoordinator::new()),
        RunOptions::default(),
    )
    .await?;

    assert!(summary.is_success());
    assert_eq!(summary.metrics_for("customers").unwrap().records_generated, 2);

    let customers = sink.messages_for("customers");
    let first: serde_json::Value = serde_json::from_slice(&customers[0].value)?;
    // CSV cells are inferred: integers stay integers
    assert_eq!(first["tier"], 1);
    assert_eq!(first["name"], "Ada");

    for order in sink.messages_for("orders") {
        let order: serde_json::Value = serde_json::from_slice(&order.value)?;
        let customer = order["customer_id"].as_str().unwrap_or_default();
        assert!(customer == "C1" || customer == "C2");
    }
    Ok(())
}
