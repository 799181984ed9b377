//! Record of values.
use crate::error::GridRlError;
use anyhow::Result;
use chrono::prelude::{DateTime, Local};
use std::{
    collections::{
        hash_map::{Iter, Keys},
        HashMap,
    },
    convert::Into,
};

/// Types of values that can be stored in a [`Record`].
#[derive(Debug, Clone)]
pub enum RecordValue {
    /// A single floating-point value, typically a metric.
    Scalar(f32),

    /// A timestamp with local timezone.
    DateTime(DateTime<Local>),

    /// A 1-dimensional array of floating-point values.
    Array1(Vec<f32>),

    /// A text value, e.g. a termination reason.
    String(String),
}

/// A container of key-value pairs produced during training or evaluation.
#[derive(Debug, Clone)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record holding a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Returns an iterator over the keys of the record.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Returns an iterator over key-value pairs.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Gets the value of the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges records, the entries of `r` taking precedence.
    pub fn merge(self, r: Record) -> Self {
        Record(self.0.into_iter().chain(r.0).collect())
    }

    /// Inserts a key-value pair into the record.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns `true` if the record has no entry.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Gets a scalar value for the given key.
    pub fn get_scalar(&self, k: &str) -> Result<f32> {
        match self
            .0
            .get(k)
            .ok_or_else(|| GridRlError::RecordKeyNotFound(k.into()))?
        {
            RecordValue::Scalar(v) => Ok(*v),
            _ => Err(GridRlError::RecordValueType(k.into()).into()),
        }
    }

    /// Gets a string value for the given key.
    pub fn get_string(&self, k: &str) -> Result<String> {
        match self
            .0
            .get(k)
            .ok_or_else(|| GridRlError::RecordKeyNotFound(k.into()))?
        {
            RecordValue::String(s) => Ok(s.clone()),
            _ => Err(GridRlError::RecordValueType(k.into()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Record, RecordValue};

    #[test]
    fn test_merge_and_get() {
        let record = Record::from_scalar("loss", 0.5)
            .merge(Record::from_slice(&[
                ("eps", RecordValue::Scalar(0.9)),
                ("reason", RecordValue::String("end_of_day".into())),
            ]));

        assert_eq!(record.get_scalar("loss").unwrap(), 0.5);
        assert_eq!(record.get_scalar("eps").unwrap(), 0.9);
        assert_eq!(record.get_string("reason").unwrap(), "end_of_day");
        assert!(record.get_scalar("reason").is_err());
        assert!(record.get_scalar("missing").is_err());
    }
}
