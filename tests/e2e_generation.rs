//! End-to-end generation tests against the in-memory sink
//!
//! Each test loads a correlation config, runs the full master load and
//! transactional worker pipeline, then inspects what reached the sink.

use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Duration;
use streamgen::{run_generation, RunOptions};
use streamgen_core::{CorrelationConfig, ShutdownCoordinator};
use streamgen_sink::{MemorySink, OutboundMessage};

const SHOP_YAML: &str = r#"
seed: 42
master_data:
  customers:
    source: inline
    id_field: customer_id
    sink_topic: customers
    rows:
      - { customer_id: C1, name: Ada }
      - { customer_id: C2, name: Grace }
      - { customer_id: C3, name: Edsger }
transactional_data:
  orders:
    sink_topic: orders
    max_messages: 100
    id_field: order_id
    fields:
      - name: order_id
        generator: { type: pattern, pattern: "O{index}" }
      - name: amount
        generator: { type: decimal_range, min: 1.0, max: 500.0 }
    relationships:
      customer_id: { references: customers.customer_id }
"#;

async fn run(yaml: &str, sink: Arc<MemorySink>) -> anyhow::Result<streamgen::RunSummary> {
    let config = CorrelationConfig::from_yaml(yaml)?;
    let shutdown = Arc::new(ShutdownCoordinator::new());
    run_generation(config, sink, shutdown, RunOptions::default()).await
}

fn json(message: &OutboundMessage) -> Json {
    serde_json::from_slice(&message.value).unwrap()
}

#[tokio::test]
async fn test_orders_reference_loaded_customers() -> anyhow::Result<()> {
    let sink = Arc::new(MemorySink::new());
    let summary = run(SHOP_YAML, Arc::clone(&sink)).await?;

    assert!(summary.is_success());
    let orders = sink.messages_for("orders");
    assert_eq!(orders.len(), 100);
    for message in &orders {
        let customer = json(message)["customer_id"].as_str().unwrap().to_string();
        assert!(
            ["C1", "C2", "C3"].contains(&customer.as_str()),
            "unexpected customer {customer}"
        );
        assert!(message.key.is_some());
    }
    assert_eq!(
        orders[0].key.as_deref(),
        Some(json(&orders[0])["order_id"].as_str().unwrap().as_bytes())
    );

    let metrics = summary.metrics_for("orders").unwrap();
    assert_eq!(metrics.records_generated, 100);
    assert_eq!(metrics.messages_sent, 100);
    assert_eq!(summary.delivery.in_flight, 0);
    assert!(sink.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_master_rows_published_before_transactions() -> anyhow::Result<()> {
    let sink = Arc::new(MemorySink::new());
    let summary = run(SHOP_YAML, Arc::clone(&sink)).await?;

    let customers = sink.messages_for("customers");
    assert_eq!(customers.len(), 3);
    assert_eq!(json(&customers[0])["name"], "Ada");
    assert_eq!(summary.metrics_for("customers").unwrap().messages_sent, 3);

    // Every customer message precedes the first order
    let messages = sink.messages();
    let first_order = messages.iter().position(|m| m.topic == "orders").unwrap();
    assert!(messages[..first_order]
        .iter()
        .all(|m| m.topic == "customers"));
    assert_eq!(first_order, 3);
    Ok(())
}

#[tokio::test]
async fn test_master_publish_can_be_disabled() -> anyhow::Result<()> {
    let sink = Arc::new(MemorySink::new());
    let config = CorrelationConfig::from_yaml(SHOP_YAML)?;
    let options = RunOptions {
        publish_master: false,
        ..RunOptions::default()
    };
    let summary = run_generation(
        config,
        sink.clone(),
        Arc::new(ShutdownCoordinator::new()),
        options,
    )
    .await?;

    assert!(summary.is_success());
    assert!(sink.messages_for("customers").is_empty());
    assert_eq!(sink.messages_for("orders").len(), 100);
    Ok(())
}

#[tokio::test]
async fn test_seeded_runs_are_identical() -> anyhow::Result<()> {
    let first = Arc::new(MemorySink::new());
    let second = Arc::new(MemorySink::new());
    run(SHOP_YAML, Arc::clone(&first)).await?;
    run(SHOP_YAML, Arc::clone(&second)).await?;

    let values = |sink: &MemorySink| -> Vec<Vec<u8>> {
        sink.messages_for("orders")
            .into_iter()
            .map(|m| m.value)
            .collect()
    };
    assert_eq!(values(&first), values(&second));
    Ok(())
}

#[tokio::test]
async fn test_transactional_chain() -> anyhow::Result<()> {
    let yaml = r#"
seed: 7
master_data:
  customers:
    source: generator
    id_field: customer_id
    count: 10
    fields:
      - name: customer_id
        generator: { type: pattern, pattern: "C{index}" }
transactional_data:
  refunds:
    sink_topic: refunds
    max_messages: 20
    relationships:
      order_id: { references: orders.order_id }
  orders:
    sink_topic: orders
    max_messages: 50
    id_field: order_id
    fields:
      - name: order_id
        generator: { type: uuid_v4 }
    relationships:
      customer_id: { references: customers.customer_id }
"#;
    let sink = Arc::new(MemorySink::new());
    let summary = run(yaml, Arc::clone(&sink)).await?;

    assert!(summary.is_success(), "failures: {:?}", summary.failures);
    let order_ids: Vec<String> = sink
        .messages_for("orders")
        .iter()
        .map(|m| json(m)["order_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(order_ids.len(), 50);

    let refunds = sink.messages_for("refunds");
    assert_eq!(refunds.len(), 20);
    for refund in &refunds {
        let order_id = json(refund)["order_id"].as_str().unwrap().to_string();
        assert!(order_ids.contains(&order_id));
    }
    Ok(())
}

#[tokio::test]
async fn test_upstream_without_identifiers_fails_dependent_worker() -> anyhow::Result<()> {
    let yaml = r#"
transactional_data:
  orders:
    sink_topic: orders
    max_messages: 0
    id_field: order_id
    fields:
      - name: order_id
        generator: { type: uuid_v4 }
  refunds:
    sink_topic: refunds
    max_messages: 5
    relationships:
      order_id: { references: orders.order_id }
"#;
    let sink = Arc::new(MemorySink::new());
    let summary = run(yaml, Arc::clone(&sink)).await?;

    assert!(!summary.is_success());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].entity_type, "refunds");
    assert!(sink.messages_for("refunds").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_delivery_failures_are_counted() -> anyhow::Result<()> {
    let sink = Arc::new(MemorySink::failing_every(10));
    let options = RunOptions {
        publish_master: false,
        ..RunOptions::default()
    };
    let summary = run_generation(
        CorrelationConfig::from_yaml(SHOP_YAML)?,
        sink.clone(),
        Arc::new(ShutdownCoordinator::new()),
        options,
    )
    .await?;

    // Delivery failures are reported, not fatal
    assert!(summary.is_success());
    assert_eq!(summary.delivery.failed, 10);
    assert_eq!(summary.delivery.acknowledged, 90);
    assert_eq!(sink.messages_for("orders").len(), 90);
    Ok(())
}

#[tokio::test]
async fn test_full_transport_queue_loses_no_records() -> anyhow::Result<()> {
    let sink = Arc::new(MemorySink::queue_full_every(3));
    let summary = run(SHOP_YAML, Arc::clone(&sink)).await?;

    assert!(summary.is_success());
    assert_eq!(sink.messages_for("customers").len(), 3);
    let orders = sink.messages_for("orders");
    assert_eq!(orders.len(), 100);

    let metrics = summary.metrics_for("orders").unwrap();
    assert_eq!(metrics.messages_sent, 100);
    assert_eq!(metrics.send_failures, 0);
    assert!(summary.delivery.queue_full > 0);
    assert_eq!(summary.delivery.rejected, 0);

    // Retried records keep their place in the sequence
    let ids: Vec<String> = orders
        .iter()
        .map(|m| json(m)["order_id"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..100).map(|i| format!("O{i}")).collect();
    assert_eq!(ids, expected);
    Ok(())
}

#[tokio::test]
async fn test_master_load_failure_aborts_run() {
    let yaml = r#"
master_data:
  customers:
    source: csv
    file: /nonexistent/customers.csv
    id_field: customer_id
transactional_data:
  orders:
    sink_topic: orders
    max_messages: 10
    relationships:
      customer_id: { references: customers.customer_id }
"#;
    let sink = Arc::new(MemorySink::new());
    let err = run(yaml, Arc::clone(&sink)).await.unwrap_err();

    assert!(format!("{err:#}").contains("Master data load failed"));
    assert!(sink.messages().is_empty());
    assert!(sink.is_closed());
}

#[tokio::test]
async fn test_shutdown_stops_unbounded_workers() -> anyhow::Result<()> {
    let yaml = r#"
master_data:
  customers:
    source: inline
    id_field: customer_id
    rows: [ { customer_id: C1 } ]
transactional_data:
  orders:
    sink_topic: orders
    rate_per_second: 200
    relationships:
      customer_id: { references: customers.customer_id }
"#;
    let sink = Arc::new(MemorySink::new());
    let shutdown = Arc::new(ShutdownCoordinator::new());

    let trigger = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.initiate_shutdown().await;
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        run_generation(
            CorrelationConfig::from_yaml(yaml)?,
            sink.clone(),
            shutdown,
            RunOptions::default(),
        ),
    )
    .await??;

    assert!(summary.is_success());
    let produced = sink.messages_for("orders").len();
    assert!(produced > 0);
    assert_eq!(summary.delivery.in_flight, 0);
    assert!(sink.is_closed());
    Ok(())
}
