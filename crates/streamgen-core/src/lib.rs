//! Core types for the streamgen correlated data generator.
//!
//! This crate holds the parts of the engine that carry its invariants:
//!
//! - [`CorrelationConfig`] - validated master/transactional entity description
//!   and its dependency order
//! - [`ReferencePool`] - shared, append-only identifier store per entity type
//! - [`TokenBucket`] / [`RateLimiter`] - record pacing
//! - [`ShutdownCoordinator`] - one-shot shutdown with ordered cleanups
//! - [`Value`] / [`Record`] - the data passed between sources, generators and sinks
//!
//! # Architecture
//!
//! ```text
//! streamgen-core (this crate)
//!    │
//!    ├─── streamgen-sink       (transport capability, drain wrapper)
//!    │
//!    └─── streamgen-generator  (row sources, master loader, correlated generator)
//! ```
//!
//! # Example
//!
//! ```rust
//! use streamgen_core::{CorrelationConfig, ReferencePool, Value};
//!
//! let config = CorrelationConfig::from_yaml(r#"
//! master_data:
//!   customers:
//!     source: inline
//!     id_field: customer_id
//!     rows: [ { customer_id: C1 }, { customer_id: C2 } ]
//! transactional_data:
//!   orders:
//!     sink_topic: orders
//!     relationships:
//!       customer_id: { references: customers.customer_id }
//! "#).unwrap();
//! assert_eq!(config.generation_order(), &["customers", "orders"]);
//!
//! let pool = ReferencePool::new();
//! pool.add_references("customers", vec![Value::from("C1"), Value::from("C2")]);
//! assert_eq!(pool.get_type_count("customers"), 2);
//! ```

pub mod config;
pub mod error;
pub mod pool;
pub mod rate_limit;
pub mod shutdown;
pub mod values;

// Re-exports for convenience
pub use config::{
    parse_timestamp, CorrelationConfig, EntityKind, FieldSpec, GeneratorConfig, MasterEntitySpec, Relationship,
    RelationshipDecl, RelationshipRef, SourceSpec, TransactionalEntitySpec,
};
pub use error::{ConfigError, PoolError, ShutdownError, ValidationError};
pub use pool::ReferencePool;
pub use rate_limit::{RateLimiter, TokenBucket};
pub use shutdown::{ShutdownCoordinator, ShutdownState};
pub use values::{yaml_to_value, Record, Row, Value};
