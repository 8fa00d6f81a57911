//! Correlation configuration: master and transactional entity types, their
//! relationships, and the dependency order they must be generated in.
//!
//! ## Document shape
//!
//! ```yaml
//! seed: 42
//! master_data:
//!   customers:
//!     source: inline
//!     id_field: customer_id
//!     rows:
//!       - { customer_id: C1 }
//!       - { customer_id: C2 }
//! transactional_data:
//!   orders:
//!     sink_topic: orders
//!     rate_per_second: 10
//!     relationships:
//!       customer_id: { references: customers.customer_id }
//! ```
//!
//! Declaration order inside `master_data` and `transactional_data` is kept
//! and used as the tie-breaker of the topological generation order.

use crate::error::{ConfigError, ValidationError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// Field generators
// ============================================================================

/// Generator configuration for a synthesized field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeneratorConfig {
    /// Generate UUIDs (v4)
    UuidV4,

    /// Generate sequential integers
    Sequential {
        /// Starting value
        #[serde(default)]
        start: i64,
    },

    /// Generate values using a pattern with placeholders
    Pattern {
        /// Pattern string (supports `{index}`, `{uuid}`, `{rand:N}`)
        pattern: String,
    },

    /// Generate random integers in a range
    IntRange {
        /// Minimum value (inclusive)
        min: i64,
        /// Maximum value (inclusive)
        max: i64,
    },

    /// Generate random floats in a range
    FloatRange {
        /// Minimum value (inclusive)
        min: f64,
        /// Maximum value (inclusive)
        max: f64,
    },

    /// Generate random decimals in a range
    DecimalRange {
        /// Minimum value (inclusive)
        min: f64,
        /// Maximum value (inclusive)
        max: f64,
        /// Digits after the decimal point
        #[serde(default = "default_scale")]
        scale: u8,
    },

    /// Generate timestamps in a range
    TimestampRange {
        /// Start timestamp (ISO 8601)
        start: String,
        /// End timestamp (ISO 8601)
        end: String,
    },

    /// Current timestamp at generation time (not deterministic)
    TimestampNow,

    /// Generate weighted boolean values
    WeightedBool {
        /// Weight for true value (0.0 to 1.0)
        true_weight: f64,
    },

    /// Generate random selection from a pool of values
    OneOf {
        /// Pool of values to select from
        values: Vec<YamlValue>,
    },

    /// Generate a static value
    Static {
        /// The static value to use
        value: YamlValue,
    },

    /// Generate null values
    Null,
}

fn default_scale() -> u8 {
    2
}

impl GeneratorConfig {
    /// Check parameters that would make generation panic or silently
    /// produce something other than what was asked for.
    pub fn check(&self) -> Result<(), String> {
        match self {
            Self::FloatRange { min, max } | Self::DecimalRange { min, max, .. } => {
                if !min.is_finite() || !max.is_finite() {
                    return Err(format!("range bounds must be finite (min={min}, max={max})"));
                }
                Ok(())
            }
            Self::WeightedBool { true_weight } => {
                if !(0.0..=1.0).contains(true_weight) {
                    return Err(format!("true_weight must be within 0.0..=1.0, got {true_weight}"));
                }
                Ok(())
            }
            Self::TimestampRange { start, end } => {
                for bound in [start, end] {
                    if parse_timestamp(bound).is_none() {
                        return Err(format!(
                            "'{bound}' is neither an RFC 3339 timestamp nor a YYYY-MM-DD date"
                        ));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// A synthesized field: name plus generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name
    pub name: String,

    /// Generator configuration for this field
    pub generator: GeneratorConfig,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, generator: GeneratorConfig) -> Self {
        Self {
            name: name.into(),
            generator,
        }
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// A relationship as declared in the document: `{ references: "type.field" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDecl {
    /// Dotted `type.field` reference
    pub references: String,
}

impl RelationshipDecl {
    pub fn new(references: impl Into<String>) -> Self {
        Self {
            references: references.into(),
        }
    }
}

/// A resolved relationship target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationshipRef {
    /// Referenced entity type
    pub target_entity_type: String,
    /// Identifier field of the referenced type
    pub target_field: String,
}

impl RelationshipRef {
    /// Parse a dotted `type.field` reference.
    pub fn parse(reference: &str) -> Option<Self> {
        let (entity, field) = reference.split_once('.')?;
        let (entity, field) = (entity.trim(), field.trim());
        if entity.is_empty() || field.is_empty() || field.contains('.') {
            return None;
        }
        Some(Self {
            target_entity_type: entity.to_string(),
            target_field: field.to_string(),
        })
    }
}

/// A relationship field bound to its resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Field in the referencing record
    pub field: String,
    /// Resolved target
    pub target: RelationshipRef,
}

// ============================================================================
// Entity specs
// ============================================================================

/// Where a master type's rows come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Rows read from a CSV file
    Csv {
        /// Path to the file (relative paths resolve against the config file)
        file: PathBuf,
        /// Field delimiter
        #[serde(default = "default_delimiter")]
        delimiter: char,
        /// Whether the first line carries column names
        #[serde(default = "default_true")]
        has_headers: bool,
    },

    /// Rows synthesized from field generators
    Generator {
        /// Number of rows to synthesize
        count: u64,
        /// Field generators
        fields: Vec<FieldSpec>,
    },

    /// Rows written inline in the document
    Inline {
        /// Row mappings
        rows: Vec<BTreeMap<String, YamlValue>>,
    },
}

fn default_delimiter() -> char {
    ','
}

fn default_true() -> bool {
    true
}

/// One master entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterEntitySpec {
    /// Row source
    #[serde(flatten)]
    pub source: SourceSpec,

    /// Identifier field registered into the reference pool
    pub id_field: String,

    /// Topic master rows are published to (not published when absent)
    #[serde(default)]
    pub sink_topic: Option<String>,

    /// Publishing rate; `<= 0` disables pacing
    #[serde(default)]
    pub rate_per_second: f64,

    /// Relationships to earlier master types
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDecl>,
}

impl MasterEntitySpec {
    pub fn new(source: SourceSpec, id_field: impl Into<String>) -> Self {
        Self {
            source,
            id_field: id_field.into(),
            sink_topic: None,
            rate_per_second: 0.0,
            relationships: BTreeMap::new(),
        }
    }

    pub fn with_sink_topic(mut self, topic: impl Into<String>) -> Self {
        self.sink_topic = Some(topic.into());
        self
    }

    pub fn with_relationship(mut self, field: impl Into<String>, reference: &str) -> Self {
        self.relationships
            .insert(field.into(), RelationshipDecl::new(reference));
        self
    }
}

/// One transactional entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionalEntitySpec {
    /// Topic records are published to
    pub sink_topic: String,

    /// Desired rate; `<= 0` disables pacing
    #[serde(default)]
    pub rate_per_second: f64,

    /// Token bucket capacity. When set, pacing uses a token bucket instead
    /// of the fixed-interval limiter.
    #[serde(default)]
    pub burst: Option<u32>,

    /// Stop after this many records (unbounded when absent)
    #[serde(default)]
    pub max_messages: Option<u64>,

    /// Identifier field; when set, produced identifiers are registered in
    /// the reference pool and the type becomes referenceable
    #[serde(default)]
    pub id_field: Option<String>,

    /// Field used as message key (defaults to `id_field`)
    #[serde(default)]
    pub key_field: Option<String>,

    /// Non-relationship field generators
    #[serde(default)]
    pub fields: Vec<FieldSpec>,

    /// Relationship fields
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDecl>,
}

impl TransactionalEntitySpec {
    pub fn new(sink_topic: impl Into<String>) -> Self {
        Self {
            sink_topic: sink_topic.into(),
            rate_per_second: 0.0,
            burst: None,
            max_messages: None,
            id_field: None,
            key_field: None,
            fields: Vec::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn with_relationship(mut self, field: impl Into<String>, reference: &str) -> Self {
        self.relationships
            .insert(field.into(), RelationshipDecl::new(reference));
        self
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_max_messages(mut self, max_messages: u64) -> Self {
        self.max_messages = Some(max_messages);
        self
    }

    pub fn with_rate(mut self, rate_per_second: f64) -> Self {
        self.rate_per_second = rate_per_second;
        self
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = Some(id_field.into());
        self
    }

    /// Field used as message key.
    pub fn message_key_field(&self) -> Option<&str> {
        self.key_field.as_deref().or(self.id_field.as_deref())
    }
}

/// Whether an entity type is master or transactional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Master,
    Transactional,
}

// ============================================================================
// CorrelationConfig
// ============================================================================

/// Raw document shape; maps are kept as `Mapping` to preserve order.
#[derive(Debug, Deserialize)]
struct CorrelationDocument {
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    master_data: Mapping,
    #[serde(default)]
    transactional_data: Mapping,
}

/// A validated correlation description. Immutable after construction.
#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    seed: Option<u64>,
    masters: Vec<(String, MasterEntitySpec)>,
    transactions: Vec<(String, TransactionalEntitySpec)>,
    master_index: HashMap<String, usize>,
    transaction_index: HashMap<String, usize>,
    relationships: HashMap<String, Vec<Relationship>>,
    dependencies: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl CorrelationConfig {
    /// Validate entity specs and compute the generation order.
    pub fn new(
        masters: Vec<(String, MasterEntitySpec)>,
        transactions: Vec<(String, TransactionalEntitySpec)>,
    ) -> Result<Self, ValidationError> {
        let mut master_index = HashMap::new();
        for (idx, (name, _)) in masters.iter().enumerate() {
            if master_index.insert(name.clone(), idx).is_some() {
                return Err(ValidationError::DuplicateType(name.clone()));
            }
        }
        let mut transaction_index = HashMap::new();
        for (idx, (name, _)) in transactions.iter().enumerate() {
            if master_index.contains_key(name)
                || transaction_index.insert(name.clone(), idx).is_some()
            {
                return Err(ValidationError::DuplicateType(name.clone()));
            }
        }

        let mut config = Self {
            seed: None,
            masters,
            transactions,
            master_index,
            transaction_index,
            relationships: HashMap::new(),
            dependencies: HashMap::new(),
            order: Vec::new(),
        };

        config.check_id_fields()?;
        config.check_generators()?;
        config.resolve_relationships()?;
        config.order = config.topological_order()?;
        Ok(config)
    }

    /// Parse and validate a YAML (or JSON) document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let document: CorrelationDocument = serde_yaml::from_str(content)?;
        let masters = ordered_entries(document.master_data)?;
        let transactions = ordered_entries(document.transactional_data)?;
        let mut config = Self::new(masters, transactions)?;
        config.seed = document.seed;
        Ok(config)
    }

    /// Read, parse and validate a document from disk.
    ///
    /// Relative CSV paths are rebased onto the document's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            config.rebase_paths(base);
        }
        Ok(config)
    }

    fn rebase_paths(&mut self, base: &Path) {
        for (_, spec) in &mut self.masters {
            if let SourceSpec::Csv { file, .. } = &mut spec.source {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
    }

    /// Override the document seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn has_master_type(&self, name: &str) -> bool {
        self.master_index.contains_key(name)
    }

    pub fn has_transaction_type(&self, name: &str) -> bool {
        self.transaction_index.contains_key(name)
    }

    pub fn get_master_config(&self, name: &str) -> Option<&MasterEntitySpec> {
        self.master_index
            .get(name)
            .and_then(|&idx| self.masters.get(idx))
            .map(|(_, spec)| spec)
    }

    pub fn get_transaction_config(&self, name: &str) -> Option<&TransactionalEntitySpec> {
        self.transaction_index
            .get(name)
            .and_then(|&idx| self.transactions.get(idx))
            .map(|(_, spec)| spec)
    }

    pub fn entity_kind(&self, name: &str) -> Option<EntityKind> {
        if self.has_master_type(name) {
            Some(EntityKind::Master)
        } else if self.has_transaction_type(name) {
            Some(EntityKind::Transactional)
        } else {
            None
        }
    }

    /// All entity types, each strictly after every type it references.
    pub fn generation_order(&self) -> &[String] {
        &self.order
    }

    /// Master types in generation order.
    pub fn master_order(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .map(String::as_str)
            .filter(|name| self.has_master_type(name))
    }

    /// Transactional types in generation order.
    pub fn transaction_order(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .map(String::as_str)
            .filter(|name| self.has_transaction_type(name))
    }

    /// Resolved relationships declared by a type.
    pub fn relationships_of(&self, name: &str) -> &[Relationship] {
        self.relationships.get(name).map_or(&[], Vec::as_slice)
    }

    /// Types a type references directly.
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.dependencies.get(name).map_or(&[], Vec::as_slice)
    }

    /// Every topic named by the config, deduplicated, in generation order.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for name in &self.order {
            let topic = match self.entity_kind(name) {
                Some(EntityKind::Master) => self
                    .get_master_config(name)
                    .and_then(|spec| spec.sink_topic.clone()),
                Some(EntityKind::Transactional) => self
                    .get_transaction_config(name)
                    .map(|spec| spec.sink_topic.clone()),
                None => None,
            };
            if let Some(topic) = topic {
                if !topics.contains(&topic) {
                    topics.push(topic);
                }
            }
        }
        topics
    }

    fn id_field_of(&self, name: &str) -> Option<&str> {
        match self.entity_kind(name)? {
            EntityKind::Master => self.get_master_config(name).map(|s| s.id_field.as_str()),
            EntityKind::Transactional => self
                .get_transaction_config(name)
                .and_then(|s| s.id_field.as_deref()),
        }
    }

    fn check_id_fields(&self) -> Result<(), ValidationError> {
        for (name, spec) in &self.masters {
            if let SourceSpec::Generator { fields, .. } = &spec.source {
                let produced = fields.iter().any(|f| f.name == spec.id_field)
                    || spec.relationships.contains_key(&spec.id_field);
                if !produced {
                    return Err(ValidationError::MissingIdField {
                        entity: name.clone(),
                        id_field: spec.id_field.clone(),
                    });
                }
            }
        }
        for (name, spec) in &self.transactions {
            if let Some(id_field) = &spec.id_field {
                let produced = spec.fields.iter().any(|f| &f.name == id_field)
                    || spec.relationships.contains_key(id_field);
                if !produced {
                    return Err(ValidationError::MissingIdField {
                        entity: name.clone(),
                        id_field: id_field.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_generators(&self) -> Result<(), ValidationError> {
        let masters = self.masters.iter().filter_map(|(name, spec)| match &spec.source {
            SourceSpec::Generator { fields, .. } => Some((name, fields)),
            _ => None,
        });
        let transactions = self.transactions.iter().map(|(name, spec)| (name, &spec.fields));

        for (name, fields) in masters.chain(transactions) {
            for field in fields {
                field
                    .generator
                    .check()
                    .map_err(|reason| ValidationError::InvalidGenerator {
                        entity: name.clone(),
                        field: field.name.clone(),
                        reason,
                    })?;
            }
        }
        Ok(())
    }

    fn resolve_relationships(&mut self) -> Result<(), ValidationError> {
        let declared: Vec<(String, EntityKind, BTreeMap<String, RelationshipDecl>)> = self
            .masters
            .iter()
            .map(|(n, s)| (n.clone(), EntityKind::Master, s.relationships.clone()))
            .chain(
                self.transactions
                    .iter()
                    .map(|(n, s)| (n.clone(), EntityKind::Transactional, s.relationships.clone())),
            )
            .collect();

        for (entity, kind, decls) in declared {
            let mut resolved = Vec::with_capacity(decls.len());
            let mut deps: Vec<String> = Vec::new();

            for (field, decl) in decls {
                let target = RelationshipRef::parse(&decl.references).ok_or_else(|| {
                    ValidationError::MalformedReference {
                        entity: entity.clone(),
                        field: field.clone(),
                        reference: decl.references.clone(),
                    }
                })?;

                let target_kind = self
                    .entity_kind(&target.target_entity_type)
                    .ok_or_else(|| ValidationError::UnknownTarget {
                        entity: entity.clone(),
                        field: field.clone(),
                        target: target.target_entity_type.clone(),
                    })?;

                if kind == EntityKind::Master && target_kind == EntityKind::Transactional {
                    return Err(ValidationError::MasterReferencesTransactional {
                        entity: entity.clone(),
                        field,
                        target: target.target_entity_type,
                    });
                }

                let expected = self
                    .id_field_of(&target.target_entity_type)
                    .ok_or_else(|| ValidationError::NotReferenceable {
                        entity: entity.clone(),
                        field: field.clone(),
                        target: target.target_entity_type.clone(),
                    })?;

                if expected != target.target_field {
                    return Err(ValidationError::FieldMismatch {
                        entity: entity.clone(),
                        field,
                        target: target.target_entity_type.clone(),
                        expected: expected.to_string(),
                        found: target.target_field,
                    });
                }

                if !deps.contains(&target.target_entity_type) {
                    deps.push(target.target_entity_type.clone());
                }
                resolved.push(Relationship { field, target });
            }

            self.relationships.insert(entity.clone(), resolved);
            self.dependencies.insert(entity, deps);
        }
        Ok(())
    }

    /// Kahn's algorithm; ready types are taken in declaration order.
    fn topological_order(&self) -> Result<Vec<String>, ValidationError> {
        let declared: Vec<&String> = self
            .masters
            .iter()
            .map(|(n, _)| n)
            .chain(self.transactions.iter().map(|(n, _)| n))
            .collect();

        let mut remaining: HashMap<&str, usize> = declared
            .iter()
            .map(|name| (name.as_str(), self.dependencies_of(name).len()))
            .collect();
        let mut order = Vec::with_capacity(declared.len());

        while order.len() < declared.len() {
            let next = declared
                .iter()
                .find(|name| remaining.get(name.as_str()) == Some(&0));

            let Some(next) = next else {
                let mut cycle: Vec<String> =
                    remaining.keys().map(|name| (*name).to_string()).collect();
                cycle.sort();
                return Err(ValidationError::Cycle(cycle));
            };

            remaining.remove(next.as_str());
            for name in &declared {
                if let Some(count) = remaining.get_mut(name.as_str()) {
                    let hits = self
                        .dependencies_of(name)
                        .iter()
                        .filter(|dep| *dep == *next)
                        .count();
                    *count -= hits;
                }
            }
            order.push((*next).clone());
        }

        Ok(order)
    }
}

/// Deserialize every entry of an order-preserving mapping.
fn ordered_entries<T: DeserializeOwned>(mapping: Mapping) -> Result<Vec<(String, T)>, ConfigError> {
    mapping
        .into_iter()
        .map(|(key, value)| -> Result<(String, T), ConfigError> {
            let name = match key {
                YamlValue::String(s) => s,
                other => serde_yaml::to_string(&other)?.trim().to_string(),
            };
            Ok((name, serde_yaml::from_value(value)?))
        })
        .collect()
}
