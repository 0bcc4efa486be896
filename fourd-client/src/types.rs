//! Types for the legacy REST API

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, Result};

/// Envelope key holding the row objects.
pub const ENTITIES_KEY: &str = "__ENTITIES";
/// Envelope key holding the total number of matching rows.
pub const COUNT_KEY: &str = "__COUNT";

/// One row as returned by the legacy server.
pub type Record = Map<String, Value>;

/// Options for [`LegacyClient::fetch_table`](crate::LegacyClient::fetch_table)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    /// Page size (`$top`); the configured page size when `None`
    pub top: Option<u32>,
    /// Starting offset (`$skip`)
    pub skip: u32,
    /// Ask the server for rows not yet synchronized
    pub new_data_only: bool,
    /// Only rows created on or after this date
    pub date_created_start: Option<NaiveDate>,
    /// Raw `$filter` expression
    pub filter_query: Option<String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = skip;
        self
    }

    pub fn new_data_only(mut self, new_data_only: bool) -> Self {
        self.new_data_only = new_data_only;
        self
    }

    pub fn created_since(mut self, date: NaiveDate) -> Self {
        self.date_created_start = Some(date);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_query = Some(filter.into());
        self
    }
}

/// Parsed list envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub entities: Vec<Record>,
    /// `__COUNT`, or the entity count if the server left it out
    pub count: u64,
    /// Every other `__`-prefixed key, passed through untouched
    pub metadata: Map<String, Value>,
}

impl Envelope {
    pub fn parse(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        let Value::Object(mut object) = value else {
            return Err(ClientError::Data("envelope is not a JSON object".to_string()));
        };

        let entities = match object.remove(ENTITIES_KEY) {
            Some(Value::Array(rows)) => rows
                .into_iter()
                .map(|row| match row {
                    Value::Object(record) => Ok(record),
                    other => Err(ClientError::Data(format!(
                        "entity is not an object: {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(ClientError::Data(format!("{} is not an array", ENTITIES_KEY)));
            }
            None => {
                return Err(ClientError::Data(format!("missing {} in response", ENTITIES_KEY)));
            }
        };

        let count = match object.remove(COUNT_KEY) {
            Some(v) => v
                .as_u64()
                .ok_or_else(|| ClientError::Data(format!("{} is not a count: {}", COUNT_KEY, v)))?,
            None => entities.len() as u64,
        };

        let metadata = object
            .into_iter()
            .filter(|(k, _)| k.starts_with("__"))
            .collect();

        Ok(Self {
            entities,
            count,
            metadata,
        })
    }
}

/// Accumulated rows of one table fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub table_name: String,
    pub records: Vec<Record>,
    /// `__COUNT` reported by the first page
    pub total_count: u64,
    /// Envelope metadata of the first page
    pub metadata: Map<String, Value>,
}

impl Table {
    pub fn empty(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names in first-seen order across all rows.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }

    /// One column; rows without the field yield `None`.
    pub fn column(&self, name: &str) -> Vec<Option<&Value>> {
        self.records.iter().map(|r| r.get(name)).collect()
    }
}
