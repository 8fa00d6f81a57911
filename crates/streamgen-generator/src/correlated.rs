//! Correlated record generation for one transactional entity type.
//!
//! Each record starts from a template row built by the type's field
//! generators; every relationship field is then overwritten with an
//! identifier sampled from the [`ReferencePool`]. A lookup against a type
//! with no identifiers ends the generator with
//! [`GeneratorError::EmptyPool`].

use crate::error::GeneratorError;
use crate::source::generate_row;
use crate::{entity_rng, RngStream};
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use streamgen_core::{
    CorrelationConfig, RateLimiter, Record, ReferencePool, Relationship, ShutdownCoordinator,
    TokenBucket, TransactionalEntitySpec,
};

/// Records produced between cooperative yields when pacing is disabled.
const UNPACED_YIELD_EVERY: u64 = 256;

const BUCKET_WAIT: Duration = Duration::from_secs(1);

enum Pacing {
    Unlimited,
    Interval(RateLimiter),
    Bucket(TokenBucket),
}

impl Pacing {
    fn for_spec(spec: &TransactionalEntitySpec) -> Self {
        if spec.rate_per_second <= 0.0 {
            return Self::Unlimited;
        }
        match spec.burst {
            Some(burst) => Self::Bucket(TokenBucket::new(spec.rate_per_second, burst.max(1))),
            None => Self::Interval(RateLimiter::new(spec.rate_per_second)),
        }
    }

    async fn wait(&mut self, generated: u64) {
        match self {
            Self::Unlimited => {
                if generated > 0 && generated % UNPACED_YIELD_EVERY == 0 {
                    tokio::task::yield_now().await;
                }
            }
            Self::Interval(limiter) => limiter.wait().await,
            Self::Bucket(bucket) => while !bucket.wait_for_tokens(1, BUCKET_WAIT).await {},
        }
    }
}

/// Lazy, possibly unbounded, non-restartable record sequence for one
/// transactional type.
///
/// Ends when `max_messages` is reached, when shutdown begins, or right
/// after the first error.
pub struct CorrelatedDataGenerator {
    entity_type: String,
    spec: TransactionalEntitySpec,
    relationships: Vec<Relationship>,
    pool: Arc<ReferencePool>,
    shutdown: Option<Arc<ShutdownCoordinator>>,
    rng: StdRng,
    reference_rng: StdRng,
    pacing: Pacing,
    limit: Option<u64>,
    generated: u64,
    failed: bool,
}

impl CorrelatedDataGenerator {
    pub fn new(
        config: &CorrelationConfig,
        entity_type: &str,
        pool: Arc<ReferencePool>,
    ) -> Result<Self, GeneratorError> {
        let spec = config
            .get_transaction_config(entity_type)
            .ok_or_else(|| GeneratorError::TypeNotFound(entity_type.to_string()))?
            .clone();
        let position = config
            .generation_order()
            .iter()
            .position(|name| name == entity_type)
            .unwrap_or_default();

        Ok(Self {
            entity_type: entity_type.to_string(),
            relationships: config.relationships_of(entity_type).to_vec(),
            pool,
            shutdown: None,
            rng: entity_rng(config.seed(), position, RngStream::Rows),
            reference_rng: entity_rng(config.seed(), position, RngStream::References),
            pacing: Pacing::for_spec(&spec),
            limit: spec.max_messages,
            generated: 0,
            failed: false,
            spec,
        })
    }

    /// Stop producing once shutdown begins.
    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownCoordinator>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Override the configured record limit.
    pub fn with_max_messages(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn spec(&self) -> &TransactionalEntitySpec {
        &self.spec
    }

    /// Records produced so far.
    pub fn generated(&self) -> u64 {
        self.generated
    }

    fn should_stop(&self) -> bool {
        self.failed
            || self.limit.is_some_and(|limit| self.generated >= limit)
            || self
                .shutdown
                .as_ref()
                .is_some_and(|shutdown| shutdown.is_shutting_down())
    }

    /// Produce the next record without pacing.
    pub fn next_record(&mut self) -> Option<Result<Record, GeneratorError>> {
        if self.should_stop() {
            return None;
        }

        let index = self.generated;
        let mut fields = generate_row(&self.spec.fields, &mut self.rng, index);

        for relationship in &self.relationships {
            let target = &relationship.target.target_entity_type;
            match self.pool.get_random_with(target, &mut self.reference_rng) {
                Ok(id) => {
                    fields.insert(relationship.field.clone(), id);
                }
                Err(_) => {
                    self.failed = true;
                    return Some(Err(GeneratorError::EmptyPool {
                        field: relationship.field.clone(),
                        entity_type: target.clone(),
                    }));
                }
            }
        }

        let record = Record::new(self.entity_type.as_str(), index, fields);
        if let Some(id_field) = &self.spec.id_field {
            if let Some(id) = record.get(id_field).filter(|id| !id.is_null()) {
                self.pool.add_references(&self.entity_type, [id.clone()]);
            }
        }

        self.generated += 1;
        Some(Ok(record))
    }

    /// Wait for the type's pacing, then produce the next record.
    ///
    /// Returns `None` without waiting out the pacing interval if shutdown
    /// begins meanwhile.
    pub async fn next_paced(&mut self) -> Option<Result<Record, GeneratorError>> {
        if self.should_stop() {
            return None;
        }

        match self.shutdown.clone() {
            Some(shutdown) => {
                tokio::select! {
                    _ = self.pacing.wait(self.generated) => {}
                    _ = shutdown.wait_shutting_down() => return None,
                }
            }
            None => self.pacing.wait(self.generated).await,
        }

        self.next_record()
    }
}

impl Iterator for CorrelatedDataGenerator {
    type Item = Result<Record, GeneratorError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamgen_core::Value;

    const SHOP_YAML: &str = r#"
seed: 3
master_data:
  customers:
    source: inline
    id_field: customer_id
    rows:
      - { customer_id: C1 }
      - { customer_id: C2 }
      - { customer_id: C3 }
transactional_data:
  orders:
    sink_topic: orders
    id_field: order_id
    max_messages: 100
    fields:
      - name: order_id
        generator: { type: sequential, start: 1 }
      - name: quantity
        generator: { type: int_range, min: 1, max: 5 }
    relationships:
      customer_id: { references: customers.customer_id }
  refunds:
    sink_topic: refunds
    max_messages: 10
    relationships:
      order_id: { references: orders.order_id }
"#;

    fn customers_pool() -> Arc<ReferencePool> {
        let pool = Arc::new(ReferencePool::new());
        pool.add_references(
            "customers",
            ["C1", "C2", "C3"].into_iter().map(Value::from),
        );
        pool
    }

    #[test]
    fn test_records_reference_loaded_customers() {
        let config = CorrelationConfig::from_yaml(SHOP_YAML).unwrap();
        let generator = CorrelatedDataGenerator::new(&config, "orders", customers_pool()).unwrap();

        let records: Vec<Record> = generator.collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 100);

        for record in &records {
            let customer = record.get("customer_id").and_then(Value::as_str).unwrap();
            assert!(["C1", "C2", "C3"].contains(&customer));
            let Some(Value::Int64(quantity)) = record.get("quantity") else {
                panic!("Expected Int64 quantity");
            };
            assert!((1..=5).contains(quantity));
        }
        assert_eq!(records[9].get("order_id"), Some(&Value::Int64(10)));
    }

    #[test]
    fn test_registers_ids_for_referencing_types() {
        let config = CorrelationConfig::from_yaml(SHOP_YAML).unwrap();
        let pool = customers_pool();
        let orders = CorrelatedDataGenerator::new(&config, "orders", Arc::clone(&pool))
            .unwrap()
            .with_max_messages(Some(5));
        assert_eq!(orders.count(), 5);
        assert_eq!(pool.get_type_count("orders"), 5);

        let refunds: Vec<Record> = CorrelatedDataGenerator::new(&config, "refunds", pool)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(refunds.len(), 10);
        for refund in refunds {
            let Some(Value::Int64(order_id)) = refund.get("order_id") else {
                panic!("Expected Int64 order_id");
            };
            assert!((1..=5).contains(order_id));
        }
    }

    #[test]
    fn test_empty_pool_ends_generator_without_touching_pool() {
        let config = CorrelationConfig::from_yaml(SHOP_YAML).unwrap();
        let pool = Arc::new(ReferencePool::new());
        pool.add_references("products", [Value::from("P1")]);

        let mut generator =
            CorrelatedDataGenerator::new(&config, "orders", Arc::clone(&pool)).unwrap();

        assert_eq!(
            generator.next(),
            Some(Err(GeneratorError::EmptyPool {
                field: "customer_id".to_string(),
                entity_type: "customers".to_string(),
            }))
        );
        assert_eq!(generator.next(), None);
        assert_eq!(generator.generated(), 0);
        assert_eq!(pool.size(), 1);
        assert!(!pool.has_type("orders"));
        assert_eq!(pool.get_type_count("products"), 1);
    }

    #[test]
    fn test_unknown_type() {
        let config = CorrelationConfig::from_yaml(SHOP_YAML).unwrap();
        let result = CorrelatedDataGenerator::new(&config, "customers", customers_pool());
        assert!(matches!(result, Err(GeneratorError::TypeNotFound(_))));
    }

    #[test]
    fn test_same_seed_same_records() {
        let config = CorrelationConfig::from_yaml(SHOP_YAML).unwrap();
        let first: Vec<Record> = CorrelatedDataGenerator::new(&config, "orders", customers_pool())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let second: Vec<Record> = CorrelatedDataGenerator::new(&config, "orders", customers_pool())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reference_sampling_independent_of_template_fields() {
        let sample = |yaml: &str| -> Vec<Value> {
            let config = CorrelationConfig::from_yaml(yaml).unwrap();
            CorrelatedDataGenerator::new(&config, "orders", customers_pool())
                .unwrap()
                .map(|record| record.unwrap().get("customer_id").cloned().unwrap())
                .collect()
        };

        let without_quantity = SHOP_YAML.replace(
            "      - name: quantity\n        generator: { type: int_range, min: 1, max: 5 }\n",
            "",
        );
        assert_ne!(without_quantity, SHOP_YAML);
        assert_eq!(sample(SHOP_YAML), sample(&without_quantity));
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_generation_respects_rate() {
        let yaml = SHOP_YAML.replace("max_messages: 100", "max_messages: 5\n    rate_per_second: 10");
        let config = CorrelationConfig::from_yaml(&yaml).unwrap();
        let mut generator = CorrelatedDataGenerator::new(&config, "orders", customers_pool()).unwrap();

        let started = tokio::time::Instant::now();
        let mut produced = 0;
        while let Some(record) = generator.next_paced().await {
            record.unwrap();
            produced += 1;
        }

        assert_eq!(produced, 5);
        // Four full intervals between five records.
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_pacing() {
        let yaml = SHOP_YAML.replace("max_messages: 100", "rate_per_second: 0.01");
        let config = CorrelationConfig::from_yaml(&yaml).unwrap();
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let mut generator = CorrelatedDataGenerator::new(&config, "orders", customers_pool())
            .unwrap()
            .with_shutdown(Arc::clone(&shutdown));

        assert!(generator.next_paced().await.is_some());

        let trigger = {
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                shutdown.initiate_shutdown().await;
            })
        };

        assert!(generator.next_paced().await.is_none());
        trigger.await.unwrap();
        assert_eq!(generator.generated(), 1);
    }
}
