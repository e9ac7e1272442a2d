use crate::error::{Result, WorkspaceError};
use crc32fast::Hasher;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const MAGIC_BYTES: [u8; 8] = *b"GREDBIN\0";
pub const VERSION: u32 = 1;
pub const CRC_PLACEHOLDER: &str = "00000000";

static CRC_RE: Lazy<Regex> = Lazy::new(|| {
    // Captures the whitespace around ':' so it survives the substitution.
    Regex::new(r#""header_crc32_hex"(\s*:\s*)"[^"]*""#).expect("regex")
});

/// Header numbers are written by several producers; accept integers, floats,
/// numeric strings and null, falling back to zero.
fn lenient_u64(v: &Value) -> u64 {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.round().max(0.0) as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn de_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_u64(&Value::deserialize(deserializer)?))
}

fn de_u32<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = lenient_u64(&Value::deserialize(deserializer)?);
    Ok(v.min(u32::MAX as u64) as u32)
}

fn de_shape<'de, D>(deserializer: D) -> std::result::Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(arr) => Ok(arr.iter().map(lenient_u64).collect()),
        // A scalar shape shows up for 1x1 values from some writers.
        n @ Value::Number(_) => Ok(vec![1, lenient_u64(&n)]),
        _ => Ok(Vec::new()),
    }
}

/// One leaf of the workspace, addressed by its dotted path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    pub kind: String,

    #[serde(rename = "class")]
    pub class_name: String,

    #[serde(default, deserialize_with = "de_shape")]
    pub shape: Vec<u64>,

    #[serde(default)]
    pub complex: bool,

    #[serde(default)]
    pub encoding: String,

    #[serde(default)]
    pub compression: String,

    #[serde(default, deserialize_with = "de_u64")]
    pub offset: u64,

    #[serde(default, deserialize_with = "de_u64")]
    pub csize: u64,

    #[serde(default, deserialize_with = "de_u64")]
    pub usize: u64,

    #[serde(default, deserialize_with = "de_u32")]
    pub crc32: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub format: String,
    pub magic: String,
    pub version: u32,

    #[serde(default)]
    pub endianness: String,

    #[serde(default)]
    pub order: String,

    #[serde(default)]
    pub root: String,

    #[serde(default)]
    pub created_utc: String,

    #[serde(default)]
    pub matlab_version: String,

    pub fields: Vec<FieldMeta>,

    #[serde(default, deserialize_with = "de_u64")]
    pub payload_start: u64,

    #[serde(default, deserialize_with = "de_u64")]
    pub file_size: u64,

    #[serde(default)]
    pub header_crc32_hex: String,
}

impl Header {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub fn compute_crc32(bytes: &[u8]) -> u32 {
    let mut h = Hasher::new();
    h.update(bytes);
    h.finalize()
}

/// The header CRC is computed over the JSON with its own value zeroed.
pub fn header_json_with_placeholder_crc(header_json: &str) -> String {
    CRC_RE
        .replace(header_json, format!(r#""header_crc32_hex"${{1}}"{CRC_PLACEHOLDER}""#))
        .into_owned()
}

pub fn header_crc32_hex(header_json: &str) -> String {
    let for_crc = header_json_with_placeholder_crc(header_json);
    format!("{:08X}", compute_crc32(for_crc.as_bytes()))
}

pub fn validate_header_crc(header: &Header, header_json: &str) -> Result<()> {
    let expected = header.header_crc32_hex.trim().to_ascii_uppercase();
    if expected.is_empty() {
        return Ok(());
    }
    let got = header_crc32_hex(header_json);
    if expected != got {
        return Err(WorkspaceError::HeaderCrcMismatch { expected, got });
    }
    Ok(())
}
