//! Record producers for streamgen.
//!
//! - [`MasterDataGenerator`] realizes every master type from its
//!   [`RowSource`] and fills the [`ReferencePool`](streamgen_core::ReferencePool)
//! - [`CorrelatedDataGenerator`] produces transactional records whose
//!   relationship fields are sampled from that pool
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use streamgen_core::{CorrelationConfig, ReferencePool, Value};
//! use streamgen_generator::CorrelatedDataGenerator;
//!
//! let config = CorrelationConfig::from_yaml(r#"
//! seed: 42
//! master_data:
//!   customers:
//!     source: inline
//!     id_field: customer_id
//!     rows: [ { customer_id: C1 }, { customer_id: C2 } ]
//! transactional_data:
//!   orders:
//!     sink_topic: orders
//!     max_messages: 3
//!     relationships:
//!       customer_id: { references: customers.customer_id }
//! "#).unwrap();
//!
//! let pool = Arc::new(ReferencePool::new());
//! pool.add_references("customers", vec![Value::from("C1"), Value::from("C2")]);
//!
//! let orders = CorrelatedDataGenerator::new(&config, "orders", pool).unwrap();
//! assert_eq!(orders.count(), 3);
//! ```

pub mod correlated;
pub mod error;
pub mod generators;
pub mod master;
pub mod source;

use rand::rngs::StdRng;
use rand::SeedableRng;

// Re-exports for convenience
pub use correlated::CorrelatedDataGenerator;
pub use error::{GeneratorError, LoadError, SourceError};
pub use master::{MasterDataGenerator, MasterLoadStats, DEFAULT_BATCH_SIZE};
pub use source::{generate_row, open_source, CsvRows, GeneratedRows, InlineRows, RowSource};

/// Independent random streams derived for one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    /// Field generation
    Rows,
    /// Reference sampling from the pool
    References,
}

/// RNG for the entity at `position` in the generation order.
///
/// With a seed the stream is reproducible; without one it is seeded from
/// the thread RNG.
pub fn entity_rng(seed: Option<u64>, position: usize, stream: RngStream) -> StdRng {
    let Some(seed) = seed else {
        return StdRng::from_rng(&mut rand::rng());
    };
    let salt = match stream {
        RngStream::Rows => 0,
        RngStream::References => 0xD1B5_4A32_D192_ED03,
    };
    let position = (position as u64).wrapping_add(1);
    StdRng::seed_from_u64(seed.wrapping_add(position.wrapping_mul(0x9E37_79B9_7F4A_7C15)) ^ salt)
}
