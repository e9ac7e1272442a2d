//! Flattening of nested, struct-like records into a uniform mapping.

use crate::error::DecodeError;
use crate::value::MatValue;
use std::collections::BTreeMap;

/// A value whose fields can be enumerated by name.
pub trait RecordLike {
    /// Field names of a record, or `None` when the value is a leaf.
    fn field_names(&self) -> Option<Vec<&str>>;

    fn field(&self, name: &str) -> Option<&Self>;
}

impl RecordLike for MatValue {
    fn field_names(&self) -> Option<Vec<&str>> {
        match self {
            MatValue::Struct(m) => Some(m.keys().map(String::as_str).collect()),
            MatValue::EmptyStruct => Some(Vec::new()),
            _ => None,
        }
    }

    fn field(&self, name: &str) -> Option<&Self> {
        self.as_struct()?.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedField<V> {
    Value(V),
    Record(DecodedRecord<V>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord<V> {
    pub fields: BTreeMap<String, DecodedField<V>>,
}

impl<V> Default for DecodedRecord<V> {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }
}

impl<V> DecodedRecord<V> {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DecodedField<V>> {
        self.fields.get(name)
    }

    pub fn record(&self, name: &str) -> Option<&DecodedRecord<V>> {
        match self.fields.get(name)? {
            DecodedField::Record(r) => Some(r),
            DecodedField::Value(_) => None,
        }
    }

    pub fn value(&self, name: &str) -> Option<&V> {
        match self.fields.get(name)? {
            DecodedField::Value(v) => Some(v),
            DecodedField::Record(_) => None,
        }
    }

    /// Nesting depth; a record without sub-records has depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .fields
            .values()
            .filter_map(|f| match f {
                DecodedField::Record(r) => Some(r.depth()),
                DecodedField::Value(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Leaves keyed by dotted path, depth first in name order.
    pub fn leaves(&self) -> Vec<(String, &V)> {
        let mut out = Vec::new();
        collect_leaves(self, "", &mut out);
        out
    }
}

fn collect_leaves<'a, V>(record: &'a DecodedRecord<V>, prefix: &str, out: &mut Vec<(String, &'a V)>) {
    for (name, field) in &record.fields {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match field {
            DecodedField::Value(v) => out.push((path, v)),
            DecodedField::Record(r) => collect_leaves(r, &path, out),
        }
    }
}

/// Decode `raw`, which must itself be a record.
pub fn decode<V: RecordLike + Clone>(raw: &V) -> Result<DecodedRecord<V>, DecodeError> {
    decode_at(raw, "")
}

fn decode_at<V: RecordLike + Clone>(raw: &V, path: &str) -> Result<DecodedRecord<V>, DecodeError> {
    let malformed = |message: String| DecodeError::MalformedRecord {
        path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
        message,
    };
    let names = raw
        .field_names()
        .ok_or_else(|| malformed("value is not a record".to_string()))?;

    let mut fields = BTreeMap::new();
    for name in names {
        let child_path = if path.is_empty() {
            name.to_string()
        } else {
            format!("{path}.{name}")
        };
        let value = raw
            .field(name)
            .ok_or_else(|| malformed(format!("listed field `{name}` is missing")))?;
        let decoded = if value.field_names().is_some() {
            DecodedField::Record(decode_at(value, &child_path)?)
        } else {
            DecodedField::Value(value.clone())
        };
        if fields.insert(name.to_string(), decoded).is_some() {
            return Err(malformed(format!("field `{name}` is listed twice")));
        }
    }
    Ok(DecodedRecord { fields })
}

/// Metadata for one run as seen by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataView {
    Available(DecodedRecord<MatValue>),
    Unavailable { reason: String },
}

impl MetadataView {
    pub fn from_result(result: Result<DecodedRecord<MatValue>, DecodeError>) -> Self {
        match result {
            Ok(record) => MetadataView::Available(record),
            Err(e) => MetadataView::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, MetadataView::Available(_))
    }

    /// Aligned `key = value` text, or a single placeholder line.
    pub fn lines(&self) -> Vec<String> {
        match self {
            MetadataView::Available(record) => format_aligned(record),
            MetadataView::Unavailable { reason } => vec![format!("metadata not available ({reason})")],
        }
    }
}

/// One `path = value` line per leaf, keys padded to the widest path.
/// Empty sub-records are listed so they do not silently disappear.
pub fn format_aligned(record: &DecodedRecord<MatValue>) -> Vec<String> {
    let mut rows: Vec<(String, String)> = Vec::new();
    collect_rows(record, "", &mut rows);
    let width = rows.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
    rows.into_iter()
        .map(|(k, v)| format!("{k:<width$} = {v}"))
        .collect()
}

fn collect_rows(record: &DecodedRecord<MatValue>, prefix: &str, out: &mut Vec<(String, String)>) {
    for (name, field) in &record.fields {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match field {
            DecodedField::Value(v) => out.push((path, v.summary())),
            DecodedField::Record(r) if r.is_empty() => out.push((path, "struct with 0 field(s)".to_string())),
            DecodedField::Record(r) => collect_rows(r, &path, out),
        }
    }
}
