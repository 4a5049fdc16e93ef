use std::{collections::BTreeMap, str::FromStr};

use serde::Deserialize;
use thiserror::Error;

const SINK_PREFIX: &str = "debezium.sink.jdbc.";
const DATABASE_PREFIX: &str = "debezium.sink.jdbc.database.";
const DATABASE_PARAM_PREFIX: &str = "debezium.sink.jdbc.database.param.";
const BATCH_SIZE_WAIT: &str = "debezium.sink.batch.batch-size-wait";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{property}={value} not supported, supported formats are {{json}}")]
    UnsupportedFormat { property: String, value: String },

    #[error("invalid destination regexp {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no batch size wait named {0:?} is available")]
    UnknownBatchSizeWait(String),

    #[error("invalid value {value:?} for {property}")]
    InvalidValue { property: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub username: String,
    pub password: Option<String>,
    pub pool_size: usize,
    pub params: BTreeMap<String, String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            username: "postgres".to_string(),
            password: None,
            pool_size: 10,
            params: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchSizeWaitConfig {
    pub name: String,
    pub max_batch_size: usize,
    pub max_wait_ms: u64,
}

impl Default for BatchSizeWaitConfig {
    fn default() -> Self {
        BatchSizeWaitConfig {
            name: "NoBatchSizeWait".to_string(),
            max_batch_size: 2048,
            max_wait_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub target_schema: String,
    pub table_prefix: String,
    pub destination_regexp: String,
    pub destination_regexp_replace: String,
    pub upsert: bool,
    pub upsert_keep_deletes: bool,
    pub schemas_enable: bool,
    pub identifier_quote_char: Option<char>,
    pub value_format: String,
    pub key_format: String,
    pub batch_size_wait: BatchSizeWaitConfig,
    pub database: DatabaseConfig,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            target_schema: "debezium".to_string(),
            table_prefix: String::new(),
            destination_regexp: String::new(),
            destination_regexp_replace: String::new(),
            upsert: true,
            upsert_keep_deletes: true,
            schemas_enable: false,
            identifier_quote_char: None,
            value_format: "json".to_string(),
            key_format: "json".to_string(),
            batch_size_wait: BatchSizeWaitConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

fn parse<T: FromStr>(property: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        property: property.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(property: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            property: property.to_string(),
            value: value.to_string(),
        }),
    }
}

pub fn config_subset(
    properties: &BTreeMap<String, String>,
    prefix: &str,
) -> BTreeMap<String, String> {
    properties
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(prefix).map(|k| (k.to_string(), v.clone())))
        .collect()
}

impl SinkConfig {
    pub fn from_properties<I, K, V>(properties: I) -> Result<SinkConfig, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let properties: BTreeMap<String, String> = properties
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let mut config = SinkConfig::default();

        for (name, value) in config_subset(&properties, SINK_PREFIX) {
            let property = format!("{SINK_PREFIX}{name}");
            match name.as_str() {
                "database.schema" => config.target_schema = value,
                "table-prefix" => config.table_prefix = value,
                "destination-regexp" => config.destination_regexp = value,
                "destination-regexp-replace" => config.destination_regexp_replace = value,
                "upsert" => config.upsert = parse_bool(&property, &value)?,
                "upsert-keep-deletes" => {
                    config.upsert_keep_deletes = parse_bool(&property, &value)?
                }
                "identifier-quote-char" => {
                    let mut chars = value.chars();
                    config.identifier_quote_char = match (chars.next(), chars.next()) {
                        (None, _) => None,
                        (Some(c), None) => Some(c),
                        _ => return Err(ConfigError::InvalidValue { property, value }),
                    };
                }
                _ => {}
            }
        }

        for (name, value) in config_subset(&properties, DATABASE_PREFIX) {
            let property = format!("{DATABASE_PREFIX}{name}");
            match name.as_str() {
                "host" => config.database.host = value,
                "port" => config.database.port = parse(&property, &value)?,
                "dbname" => config.database.dbname = value,
                "username" => config.database.username = value,
                "password" => config.database.password = Some(value),
                "pool-size" => config.database.pool_size = parse(&property, &value)?,
                _ => {}
            }
        }
        config.database.params = config_subset(&properties, DATABASE_PARAM_PREFIX);

        if let Some(value) = properties.get("debezium.format.value") {
            config.value_format = value.clone();
        }
        if let Some(value) = properties.get("debezium.format.key") {
            config.key_format = value.clone();
        }
        if let Some(value) = properties.get("debezium.format.value.schemas.enable") {
            config.schemas_enable = parse_bool("debezium.format.value.schemas.enable", value)?;
        }

        if let Some(value) = properties.get(BATCH_SIZE_WAIT) {
            config.batch_size_wait.name = value.clone();
        }
        let max_batch_size = format!("{BATCH_SIZE_WAIT}.max-batch-size");
        if let Some(value) = properties.get(&max_batch_size) {
            config.batch_size_wait.max_batch_size = parse(&max_batch_size, value)?;
        }
        let max_wait_ms = format!("{BATCH_SIZE_WAIT}.max-wait-ms");
        if let Some(value) = properties.get(&max_wait_ms) {
            config.batch_size_wait.max_wait_ms = parse(&max_wait_ms, value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (property, value) in [
            ("debezium.format.value", &self.value_format),
            ("debezium.format.key", &self.key_format),
        ] {
            if !value.eq_ignore_ascii_case("json") {
                return Err(ConfigError::UnsupportedFormat {
                    property: property.to_string(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn auto_create_tables(&self) -> bool {
        self.schemas_enable
    }
}
