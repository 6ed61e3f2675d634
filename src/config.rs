use crc32fast::Hasher;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::OrgTreeError;

pub const DEFAULT_SCHEMA: &str = "org_tree";
pub const DEFAULT_TABLE: &str = "nodes";

/// Where the node table lives and how structural writes are serialized.
#[derive(Clone, Debug)]
pub struct OrgTreeConfig {
    schema: String,
    table: String,
    advisory_lock_strategy: AdvisoryLockStrategy,
}

impl OrgTreeConfig {
    /// Create a new configuration for the node table `schema.table`.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        let schema = schema.into();
        let table = table.into();

        let default_lock =
            AdvisoryLockStrategy::Namespaced(AdvisoryLockKey::derived_from(&schema, &table));

        Self {
            schema,
            table,
            advisory_lock_strategy: default_lock,
        }
    }

    /// Merge options produced by [`OrgTreeOptions`].
    pub(crate) fn apply_options(mut self, options: OrgTreeOptions) -> Self {
        let relocated = options.schema.is_some() || options.table.is_some();
        if let Some(schema) = options.schema {
            self.schema = schema;
        }
        if let Some(table) = options.table {
            self.table = table;
        }
        match options.advisory_lock_strategy {
            Some(strategy) => self.advisory_lock_strategy = strategy,
            None if relocated && self.advisory_lock_strategy.key().is_some() => {
                self.advisory_lock_strategy = AdvisoryLockStrategy::Namespaced(
                    AdvisoryLockKey::derived_from(&self.schema, &self.table),
                );
            }
            None => {}
        }
        self
    }

    /// Schema holding the node table.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Unqualified node table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// `"schema"."table"`, quoted for direct use in SQL.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Advisory lock strategy (PostgreSQL only).
    pub fn advisory_lock_strategy(&self) -> &AdvisoryLockStrategy {
        &self.advisory_lock_strategy
    }
}

impl Default for OrgTreeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA, DEFAULT_TABLE)
    }
}

/// Builder-style overrides for [`OrgTreeConfig`].
#[derive(Clone, Debug, Default)]
pub struct OrgTreeOptions {
    schema: Option<String>,
    table: Option<String>,
    advisory_lock_strategy: Option<AdvisoryLockStrategy>,
}

impl OrgTreeOptions {
    pub fn schema(mut self, value: impl Into<String>) -> Self {
        self.schema = Some(value.into());
        self
    }

    pub fn table(mut self, value: impl Into<String>) -> Self {
        self.table = Some(value.into());
        self
    }

    pub fn advisory_lock_strategy(mut self, strategy: AdvisoryLockStrategy) -> Self {
        self.advisory_lock_strategy = Some(strategy);
        self
    }

    pub fn apply(self, base: OrgTreeConfig) -> OrgTreeConfig {
        base.apply_options(self)
    }
}

/// Key used for PostgreSQL advisory locks.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AdvisoryLockKey(String);

impl AdvisoryLockKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn derived_from(schema: &str, table: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(schema.as_bytes());
        hasher.update(b".");
        hasher.update(table.as_bytes());
        let crc = hasher.finalize();
        Self(format!("org-tree::{schema}::{table}::{crc:x}"))
    }
}

/// Configuration describing how to acquire advisory locks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvisoryLockStrategy {
    Disabled,
    Namespaced(AdvisoryLockKey),
}

impl AdvisoryLockStrategy {
    pub fn key(&self) -> Option<&AdvisoryLockKey> {
        match self {
            AdvisoryLockStrategy::Disabled => None,
            AdvisoryLockStrategy::Namespaced(key) => Some(key),
        }
    }
}

/// PostgreSQL connection settings.
///
/// [`DatabaseSettings::from_env`] reads `POSTGRES_USER`, `POSTGRES_PASS`,
/// `POSTGRES_DB`, `POSTGRES_SCHEMA`, `POSTGRES_HOST` and `POSTGRES_PORT`,
/// falling back to the [`Default`] values for unset or empty variables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatabaseSettings {
    pub user: String,
    pub password: String,
    pub database: String,
    pub schema: String,
    pub host: String,
    pub port: u16,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl DatabaseSettings {
    pub fn from_env() -> Result<Self, OrgTreeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, OrgTreeError> {
        let defaults = Self::default();
        let var = |key: &str, default: String| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .unwrap_or(default)
        };

        let port = match lookup("POSTGRES_PORT").filter(|value| !value.is_empty()) {
            Some(raw) => raw.parse().map_err(|_| {
                OrgTreeError::validation(format!("POSTGRES_PORT is not a valid port: {raw}"))
            })?,
            None => defaults.port,
        };

        Ok(Self {
            user: var("POSTGRES_USER", defaults.user),
            password: var("POSTGRES_PASS", defaults.password),
            database: var("POSTGRES_DB", defaults.database),
            schema: var("POSTGRES_SCHEMA", defaults.schema),
            host: var("POSTGRES_HOST", defaults.host),
            port,
        })
    }

    /// Connection options for the sqlx pool behind SeaORM.
    ///
    /// Credentials are passed as fields rather than spliced into a URL, so
    /// reserved characters in them cannot redirect the connection.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(PgSslMode::Disable)
    }

    /// Tree configuration pointing at the `nodes` table in [`Self::schema`].
    pub fn tree_config(&self) -> OrgTreeConfig {
        OrgTreeOptions::default()
            .schema(self.schema.clone())
            .apply(OrgTreeConfig::default())
    }
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
