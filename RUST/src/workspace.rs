//! Reader and writer for GBF ("GREDBIN") workspace files, the per-run
//! metadata format of a simulation batch.
//!
//! File layout: `[8 magic][u32 header_len LE][header JSON][payload]`. The
//! header lists every leaf by dotted path; payload chunks may be zlib
//! compressed.

use crate::error::{Result, WorkspaceError};
use crate::header::{
    compute_crc32, header_crc32_hex, validate_header_crc, FieldMeta, Header, CRC_PLACEHOLDER,
    MAGIC_BYTES, VERSION,
};
use crate::value::{CharArray, LogicalArray, MatValue, NumericArray, NumericClass, StringArray};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use time::macros::format_description;
use time::OffsetDateTime;

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Check header CRC, file size, and per-field size/CRC.
    pub validate: bool,
}

#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub compression: bool,
    /// 0..=9
    pub compression_level: u32,
    pub crc: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: true,
            compression_level: 1,
            crc: true,
        }
    }
}

const COMPRESS_THRESHOLD_BYTES: usize = 1024;

// Not format limits; they keep a corrupt header from allocating without bound.
const MAX_HEADER_LEN: u32 = 64 * 1024 * 1024;
const MAX_FIELD_BYTES: u64 = 16 * 1024 * 1024 * 1024;

const PREAMBLE_LEN: u64 = 8 + 4;

fn format_err(msg: impl Into<String>) -> WorkspaceError {
    WorkspaceError::Format(msg.into())
}

fn to_usize(v: u64, what: &str) -> Result<usize> {
    usize::try_from(v)
        .map_err(|_| WorkspaceError::Unsupported(format!("{what} too large for this platform")))
}

fn checked_bytes(count: usize, width: usize) -> Result<usize> {
    count
        .checked_mul(width)
        .ok_or_else(|| format_err("element count overflow"))
}

fn element_count_checked(shape: &[usize]) -> Result<usize> {
    if shape.is_empty() || shape.contains(&0) {
        return Ok(0);
    }
    shape.iter().try_fold(1usize, |acc, &d| {
        acc.checked_mul(d)
            .ok_or_else(|| format_err("element count overflow"))
    })
}

/// Read and parse the header without touching the payload.
pub fn read_workspace_header<P: AsRef<Path>>(path: P, opts: &ReadOptions) -> Result<Header> {
    let mut file = File::open(path.as_ref())?;
    let (header, _header_len) = read_header(&mut file, opts)?;
    Ok(header)
}

/// Read every field and re-nest the dotted paths into a struct tree.
pub fn read_workspace<P: AsRef<Path>>(path: P, opts: &ReadOptions) -> Result<MatValue> {
    let mut file = File::open(path.as_ref())?;
    let (header, header_len) = read_header(&mut file, opts)?;
    let payload_start = payload_start(header_len, header.payload_start);

    let mut root = BTreeMap::new();
    for field in &header.fields {
        let value = read_field(&mut file, payload_start, field, opts)?;
        assign_by_path(&mut root, &field.name, value)?;
    }

    if header.root.eq_ignore_ascii_case("single") {
        if let Some(v) = root.remove("data") {
            return Ok(v);
        }
    }
    Ok(MatValue::Struct(root))
}

/// Read a single leaf, or the subtree below a dotted prefix.
pub fn read_workspace_var<P: AsRef<Path>>(
    path: P,
    var_path: &str,
    opts: &ReadOptions,
) -> Result<MatValue> {
    let var_path = var_path.trim();
    if var_path.is_empty() {
        return read_workspace(path, opts);
    }

    let mut file = File::open(path.as_ref())?;
    let (header, header_len) = read_header(&mut file, opts)?;
    let payload_start = payload_start(header_len, header.payload_start);

    if let Some(field) = header.field(var_path) {
        return read_field(&mut file, payload_start, field, opts);
    }

    let prefix = format!("{var_path}.");
    let mut out = BTreeMap::new();
    for field in header.fields.iter().filter(|f| f.name.starts_with(&prefix)) {
        let value = read_field(&mut file, payload_start, field, opts)?;
        assign_by_path(&mut out, &field.name[prefix.len()..], value)?;
    }
    if out.is_empty() {
        return Err(WorkspaceError::VarNotFound(var_path.to_string()));
    }
    Ok(MatValue::Struct(out))
}

fn read_header(file: &mut File, opts: &ReadOptions) -> Result<(Header, u32)> {
    let file_len = file.metadata()?.len();
    let mut r = BufReader::new(&mut *file);

    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if magic != MAGIC_BYTES {
        return Err(format_err("bad magic; not a GBF workspace file"));
    }

    let mut len_bytes = [0u8; 4];
    r.read_exact(&mut len_bytes)?;
    let header_len = u32::from_le_bytes(len_bytes);
    if !(2..=MAX_HEADER_LEN).contains(&header_len) {
        return Err(format_err(format!("invalid header length {header_len}")));
    }

    let mut header_bytes = vec![0u8; header_len as usize];
    r.read_exact(&mut header_bytes)?;
    let header_json = String::from_utf8(header_bytes)?;
    let header: Header = serde_json::from_str(&header_json)?;

    if opts.validate {
        validate_header_crc(&header, &header_json)?;
        if header.file_size > 0 && header.file_size != file_len {
            return Err(WorkspaceError::FileSizeMismatch {
                expected: header.file_size,
                got: file_len,
            });
        }
        let computed = PREAMBLE_LEN + header_len as u64;
        if header.payload_start > 0 && header.payload_start != computed {
            return Err(format_err(format!(
                "payload_start mismatch: header={}, computed={}",
                header.payload_start, computed
            )));
        }
    }

    Ok((header, header_len))
}

fn payload_start(header_len: u32, declared: u64) -> u64 {
    if declared > 0 {
        declared
    } else {
        PREAMBLE_LEN + header_len as u64
    }
}

fn read_field(
    file: &mut File,
    payload_start: u64,
    field: &FieldMeta,
    opts: &ReadOptions,
) -> Result<MatValue> {
    if field.csize > MAX_FIELD_BYTES || field.usize > MAX_FIELD_BYTES {
        return Err(WorkspaceError::Unsupported(format!(
            "field `{}` exceeds configured size limit",
            field.name
        )));
    }

    let file_len = file.metadata()?.len();
    let out_of_bounds = || WorkspaceError::FieldOutOfBounds {
        name: field.name.clone(),
        offset: field.offset,
        csize: field.csize,
        payload_len: file_len.saturating_sub(payload_start),
    };
    let pos = payload_start
        .checked_add(field.offset)
        .ok_or_else(out_of_bounds)?;
    let end = pos.checked_add(field.csize).ok_or_else(out_of_bounds)?;
    if end > file_len {
        return Err(out_of_bounds());
    }

    file.seek(SeekFrom::Start(pos))?;
    let mut stored = vec![0u8; to_usize(field.csize, "field csize")?];
    file.read_exact(&mut stored)?;

    let raw = if field.compression.eq_ignore_ascii_case("zlib") {
        inflate(&stored, field).map_err(|e| WorkspaceError::DecompressionFailed {
            name: field.name.clone(),
            message: e.to_string(),
        })?
    } else {
        stored
    };

    if opts.validate {
        if field.usize > 0 && raw.len() as u64 != field.usize {
            return Err(format_err(format!(
                "field `{}` decoded size mismatch: expected {} bytes, got {}",
                field.name,
                field.usize,
                raw.len()
            )));
        }
        if field.crc32 != 0 {
            let got = compute_crc32(&raw);
            if got != field.crc32 {
                return Err(WorkspaceError::FieldCrcMismatch {
                    name: field.name.clone(),
                    expected: field.crc32,
                    got,
                });
            }
        }
    }

    decode_leaf(field, &raw)
}

fn inflate(comp: &[u8], field: &FieldMeta) -> Result<Vec<u8>> {
    let max_out = if field.usize > 0 {
        field.usize
    } else {
        MAX_FIELD_BYTES
    };
    let mut out = Vec::new();
    // One extra byte detects output past the declared size.
    ZlibDecoder::new(comp)
        .take(max_out.saturating_add(1))
        .read_to_end(&mut out)?;
    if out.len() as u64 > max_out {
        return Err(format_err("decompressed data exceeds declared size"));
    }
    Ok(out)
}

fn decode_leaf(field: &FieldMeta, raw: &[u8]) -> Result<MatValue> {
    let shape = field
        .shape
        .iter()
        .map(|&d| to_usize(d, "shape dim"))
        .collect::<Result<Vec<_>>>()?;
    let n = element_count_checked(&shape)?;
    let size_mismatch = |expected: usize| {
        format_err(format!(
            "{} `{}` size mismatch: expected {} bytes, got {}",
            field.kind,
            field.name,
            expected,
            raw.len()
        ))
    };

    match field.kind.to_ascii_lowercase().as_str() {
        "struct" => Ok(MatValue::EmptyStruct),

        "numeric" => {
            let class = NumericClass::from_class_name(&field.class_name).ok_or_else(|| {
                WorkspaceError::Unsupported(format!("unknown numeric class `{}`", field.class_name))
            })?;
            let part = checked_bytes(n, class.bytes_per_element())?;
            let total = checked_bytes(part, if field.complex { 2 } else { 1 })?;
            if raw.len() != total {
                return Err(size_mismatch(total));
            }
            Ok(MatValue::Numeric(NumericArray {
                class,
                shape,
                complex: field.complex,
                real_le: raw[..part].to_vec(),
                imag_le: field.complex.then(|| raw[part..].to_vec()),
            }))
        }

        "logical" => {
            if raw.len() != n {
                return Err(size_mismatch(n));
            }
            Ok(MatValue::Logical(LogicalArray {
                shape,
                data: raw.to_vec(),
            }))
        }

        "char" => {
            let total = checked_bytes(n, 2)?;
            if raw.len() != total {
                return Err(size_mismatch(total));
            }
            let data = raw
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            Ok(MatValue::Char(CharArray { shape, data }))
        }

        "string" => {
            // Per element: [missing u8][len u32 LE][utf-8 bytes]
            // Every element takes at least 5 bytes.
            let mut data = Vec::with_capacity(n.min(raw.len() / 5));
            let mut idx = 0usize;
            for _ in 0..n {
                let head = raw
                    .get(idx..idx + 5)
                    .ok_or_else(|| format_err(format!("string `{}` truncated", field.name)))?;
                let missing = head[0] != 0;
                let len = u32::from_le_bytes([head[1], head[2], head[3], head[4]]) as usize;
                idx += 5;
                if missing {
                    data.push(None);
                    continue;
                }
                let bytes = raw
                    .get(idx..idx + len)
                    .ok_or_else(|| format_err(format!("string `{}` truncated", field.name)))?;
                idx += len;
                data.push(Some(String::from_utf8(bytes.to_vec())?));
            }
            if idx != raw.len() {
                return Err(size_mismatch(idx));
            }
            Ok(MatValue::String(StringArray { shape, data }))
        }

        _ => Ok(MatValue::Opaque {
            kind: field.kind.clone(),
            class: field.class_name.clone(),
            shape,
        }),
    }
}

fn assign_by_path(root: &mut BTreeMap<String, MatValue>, path: &str, value: MatValue) -> Result<()> {
    let mut parts = path.split('.').peekable();
    let mut cur = root;
    while let Some(part) = parts.next() {
        if part.is_empty() {
            return Err(format_err(format!("invalid field path `{path}`")));
        }
        if parts.peek().is_none() {
            if cur.contains_key(part) {
                return Err(format_err(format!(
                    "path collision at `{part}` inserting `{path}`"
                )));
            }
            cur.insert(part.to_string(), value);
            return Ok(());
        }
        let entry = cur
            .entry(part.to_string())
            .or_insert_with(|| MatValue::Struct(BTreeMap::new()));
        match entry {
            MatValue::Struct(m) => cur = m,
            _ => {
                return Err(format_err(format!(
                    "path collision at `{part}` inserting `{path}`"
                )))
            }
        }
    }
    Err(format_err("empty field name"))
}

fn flatten_to_leaves(value: &MatValue, prefix: &str, out: &mut Vec<(String, MatValue)>) -> Result<()> {
    match value {
        MatValue::Struct(map) => {
            for (k, v) in map {
                if k.is_empty() || k.contains('.') {
                    return Err(WorkspaceError::Unsupported(format!(
                        "struct key `{k}` cannot be stored as a field path"
                    )));
                }
                let name = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_to_leaves(v, &name, out)?;
            }
            Ok(())
        }
        other => {
            let name = if prefix.is_empty() { "data" } else { prefix };
            out.push((name.to_string(), other.clone()));
            Ok(())
        }
    }
}

struct EncodedLeaf {
    raw: Vec<u8>,
    kind: &'static str,
    class_name: String,
    shape: Vec<usize>,
    complex: bool,
    encoding: &'static str,
}

fn encode_leaf(name: &str, value: &MatValue) -> Result<EncodedLeaf> {
    match value {
        MatValue::Numeric(arr) => {
            let expected = element_count_checked(&arr.shape)? * arr.class.bytes_per_element();
            let imag = arr.imag_le.as_deref().unwrap_or_default();
            let imag_ok = if arr.complex {
                imag.len() == expected
            } else {
                arr.imag_le.is_none()
            };
            if arr.real_le.len() != expected || !imag_ok {
                return Err(format_err(format!(
                    "numeric `{name}` byte length does not match shape {:?}",
                    arr.shape
                )));
            }
            let mut raw = arr.real_le.clone();
            raw.extend_from_slice(imag);
            Ok(EncodedLeaf {
                raw,
                kind: "numeric",
                class_name: arr.class.class_name().to_string(),
                shape: arr.shape.clone(),
                complex: arr.complex,
                encoding: "",
            })
        }
        MatValue::Logical(a) => Ok(EncodedLeaf {
            raw: a.data.clone(),
            kind: "logical",
            class_name: "logical".to_string(),
            shape: a.shape.clone(),
            complex: false,
            encoding: "",
        }),
        MatValue::Char(a) => Ok(EncodedLeaf {
            raw: a.data.iter().flat_map(|u| u.to_le_bytes()).collect(),
            kind: "char",
            class_name: "char".to_string(),
            shape: a.shape.clone(),
            complex: false,
            encoding: "utf-16-codeunits",
        }),
        MatValue::String(a) => {
            let mut raw = Vec::new();
            for opt in &a.data {
                match opt {
                    None => {
                        raw.push(1u8);
                        raw.extend_from_slice(&0u32.to_le_bytes());
                    }
                    Some(s) => {
                        let len = u32::try_from(s.len()).map_err(|_| {
                            WorkspaceError::Unsupported(format!("string too large in `{name}`"))
                        })?;
                        raw.push(0u8);
                        raw.extend_from_slice(&len.to_le_bytes());
                        raw.extend_from_slice(s.as_bytes());
                    }
                }
            }
            Ok(EncodedLeaf {
                raw,
                kind: "string",
                class_name: "string".to_string(),
                shape: a.shape.clone(),
                complex: false,
                encoding: "utf-8",
            })
        }
        MatValue::EmptyStruct => Ok(EncodedLeaf {
            raw: Vec::new(),
            kind: "struct",
            class_name: "struct".to_string(),
            shape: vec![1, 1],
            complex: false,
            encoding: "",
        }),
        MatValue::Opaque { kind, .. } => Err(WorkspaceError::Unsupported(format!(
            "cannot write opaque `{kind}` field `{name}`"
        ))),
        MatValue::Struct(_) => Err(format_err(format!("`{name}` is not a leaf"))),
    }
}

fn deflate(raw: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    enc.write_all(raw)?;
    Ok(enc.finish()?)
}

fn now_utc_string() -> String {
    let fmt = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
    OffsetDateTime::now_utc().format(&fmt).unwrap_or_default()
}

/// Write `value` as a workspace file, replacing any existing file atomically.
pub fn write_workspace<P: AsRef<Path>>(path: P, value: &MatValue, opts: &WriteOptions) -> Result<()> {
    let path = path.as_ref();

    let root = if matches!(value, MatValue::Struct(_)) { "struct" } else { "single" };
    let mut leaves = Vec::new();
    flatten_to_leaves(value, "", &mut leaves)?;

    let mut fields = Vec::with_capacity(leaves.len());
    let mut chunks = Vec::with_capacity(leaves.len());
    let mut offset = 0u64;
    for (name, leaf) in &leaves {
        let enc = encode_leaf(name, leaf)?;
        let usize_ = enc.raw.len() as u64;
        let crc32 = if opts.crc { compute_crc32(&enc.raw) } else { 0 };

        let mut stored = enc.raw;
        let mut compression = "none";
        if opts.compression && stored.len() >= COMPRESS_THRESHOLD_BYTES {
            let comp = deflate(&stored, opts.compression_level)?;
            if comp.len() < stored.len() {
                stored = comp;
                compression = "zlib";
            }
        }

        fields.push(FieldMeta {
            name: name.clone(),
            kind: enc.kind.to_string(),
            class_name: enc.class_name,
            shape: enc.shape.iter().map(|&d| d as u64).collect(),
            complex: enc.complex,
            encoding: enc.encoding.to_string(),
            compression: compression.to_string(),
            offset,
            csize: stored.len() as u64,
            usize: usize_,
            crc32,
        });
        offset += stored.len() as u64;
        chunks.push(stored);
    }
    let payload_len = offset;

    let mut header = Header {
        format: "GBF".to_string(),
        magic: "GREDBIN".to_string(),
        version: VERSION,
        endianness: "little".to_string(),
        order: "column-major".to_string(),
        root: root.to_string(),
        created_utc: now_utc_string(),
        matlab_version: format!("simbrowse {}", env!("CARGO_PKG_VERSION")),
        fields,
        payload_start: 0,
        file_size: 0,
        header_crc32_hex: CRC_PLACEHOLDER.to_string(),
    };

    // payload_start and file_size are part of the header, so iterate until
    // the header length stops changing.
    let mut header_json = String::new();
    for _ in 0..8 {
        header.header_crc32_hex = CRC_PLACEHOLDER.to_string();
        let placeholder_json = format!("{}\n", serde_json::to_string(&header)?);
        header.header_crc32_hex = header_crc32_hex(&placeholder_json);
        let json = format!("{}\n", serde_json::to_string(&header)?);

        let payload_start = PREAMBLE_LEN + json.len() as u64;
        let stable = header.payload_start == payload_start && json == header_json;
        header.payload_start = payload_start;
        header.file_size = payload_start + payload_len;
        header_json = json;
        if stable {
            break;
        }
    }
    let header_len = u32::try_from(header_json.len())
        .map_err(|_| WorkspaceError::Unsupported("header too large".to_string()))?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut w = BufWriter::new(tmp.as_file_mut());
        w.write_all(&MAGIC_BYTES)?;
        w.write_all(&header_len.to_le_bytes())?;
        w.write_all(header_json.as_bytes())?;
        for chunk in &chunks {
            w.write_all(chunk)?;
        }
        w.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| WorkspaceError::Io(e.error))?;
    Ok(())
}
