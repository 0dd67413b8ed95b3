use crate::{
    ability::RuleSet,
    adapter::PostgresAdapter,
    condition::Conditions,
    error::{AbilityError, Result},
    models::{Actions, Polarity, SubjectType, Subjects},
    rule::Rule,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// One name or a list of names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NameList {
    One(String),
    Many(Vec<String>),
}

impl NameList {
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::One(name) => vec![name.clone()],
            Self::Many(names) => names.clone(),
        }
    }
}

/// `actions` become interchangeable with `target` when matching rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAlias {
    pub target: String,
    pub actions: Vec<String>,
}

/// Declarative grant or revoke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    #[serde(rename = "type")]
    pub polarity: Polarity,
    pub actions: NameList,
    pub subjects: NameList,

    /// JSON condition document; absent or null means unconditional
    #[serde(default)]
    pub conditions: Value,
}

impl RuleDefinition {
    pub fn to_rule(&self) -> Result<Rule> {
        let mut rule = Rule::new(
            self.polarity,
            Actions::parse(&self.actions.names()),
            Subjects::parse(&self.subjects.names()),
        );
        rule.when(Conditions::from_json(&self.conditions)?);
        Ok(rule)
    }
}

/// Rule set loaded from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityConfig {
    #[serde(default = "default_true")]
    pub default_aliases: bool,

    #[serde(default)]
    pub aliases: Vec<ActionAlias>,

    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

fn default_true() -> bool {
    true
}

impl Default for AbilityConfig {
    fn default() -> Self {
        Self {
            default_aliases: default_true(),
            aliases: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl AbilityConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| AbilityError::InvalidConfig(format!("Failed to parse YAML: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| AbilityError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Load from a `.json` file, or YAML for any other extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AbilityError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Build the rule set these definitions describe
    pub fn into_rule_set(self) -> Result<RuleSet> {
        let mut rules = if self.default_aliases {
            RuleSet::new()
        } else {
            RuleSet::without_default_aliases()
        };

        for alias in &self.aliases {
            rules.alias_action(&alias.actions, &alias.target);
        }
        for definition in &self.rules {
            rules.push(definition.to_rule()?);
        }

        info!("Loaded {} rule(s) from configuration", rules.rules().len());
        Ok(rules)
    }
}

/// Connection settings for the PostgreSQL adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Subject type -> table name
    #[serde(default)]
    pub tables: BTreeMap<String, String>,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

impl PostgresConfig {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            tables: BTreeMap::new(),
        }
    }

    /// Read `DATABASE_URL`, loading a `.env` file first when present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AbilityError::InvalidConfig("DATABASE_URL is not set".to_string()))?;

        let mut config = Self::new(&database_url);
        if let Ok(max) = std::env::var("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = max.parse().map_err(|_| {
                AbilityError::InvalidConfig(format!("Invalid DATABASE_MAX_CONNECTIONS: {}", max))
            })?;
        }
        Ok(config)
    }

    /// Serve `subject_type` from `table`
    pub fn with_table(mut self, subject_type: &str, table: &str) -> Self {
        self.tables.insert(subject_type.to_string(), table.to_string());
        self
    }

    pub async fn connect(&self) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .connect(&self.database_url)
            .await
            .map_err(|e| AbilityError::StorageError(format!("Failed to connect to database: {}", e)))?;

        info!("Database connection pool created");
        Ok(pool)
    }

    /// One adapter per configured table, sharing `pool`
    pub fn adapters(&self, pool: &PgPool) -> Result<Vec<PostgresAdapter>> {
        self.tables
            .iter()
            .map(|(subject_type, table)| {
                PostgresAdapter::new(pool.clone(), SubjectType::new(subject_type), table)
            })
            .collect()
    }
}
