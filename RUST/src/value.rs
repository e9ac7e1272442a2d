use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericClass {
    Double,
    Single,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
}

impl NumericClass {
    pub fn from_class_name(s: &str) -> Option<Self> {
        let class = match s.to_ascii_lowercase().as_str() {
            "double" => Self::Double,
            "single" => Self::Single,
            "int8" => Self::Int8,
            "uint8" => Self::Uint8,
            "int16" => Self::Int16,
            "uint16" => Self::Uint16,
            "int32" => Self::Int32,
            "uint32" => Self::Uint32,
            "int64" => Self::Int64,
            "uint64" => Self::Uint64,
            _ => return None,
        };
        Some(class)
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Single => "single",
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
        }
    }

    pub fn bytes_per_element(&self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Single | Self::Int32 | Self::Uint32 => 4,
            Self::Double | Self::Int64 | Self::Uint64 => 8,
        }
    }
}

pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().copied().fold(1usize, |acc, d| acc.saturating_mul(d))
}

/// Column-major numeric array with little-endian element bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericArray {
    pub class: NumericClass,
    pub shape: Vec<usize>,
    pub complex: bool,
    pub real_le: Vec<u8>,
    pub imag_le: Option<Vec<u8>>,
}

impl NumericArray {
    pub fn new_real(class: NumericClass, shape: Vec<usize>, real_le: Vec<u8>) -> Self {
        Self {
            class,
            shape,
            complex: false,
            real_le,
            imag_le: None,
        }
    }

    pub fn from_f64(shape: Vec<usize>, data: &[f64]) -> Self {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new_real(NumericClass::Double, shape, bytes)
    }

    pub fn scalar_f64(v: f64) -> Self {
        Self::from_f64(vec![1, 1], &[v])
    }

    pub fn from_i32(shape: Vec<usize>, data: &[i32]) -> Self {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new_real(NumericClass::Int32, shape, bytes)
    }

    pub fn len(&self) -> usize {
        self.real_le.len() / self.class.bytes_per_element()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i` (column-major) of the real part as `f64`.
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        let bpe = self.class.bytes_per_element();
        let b = self.real_le.get(i * bpe..(i + 1) * bpe)?;
        let v = match self.class {
            NumericClass::Double => f64::from_le_bytes(b.try_into().ok()?),
            NumericClass::Single => f32::from_le_bytes(b.try_into().ok()?) as f64,
            NumericClass::Int8 => i8::from_le_bytes([b[0]]) as f64,
            NumericClass::Uint8 => b[0] as f64,
            NumericClass::Int16 => i16::from_le_bytes(b.try_into().ok()?) as f64,
            NumericClass::Uint16 => u16::from_le_bytes(b.try_into().ok()?) as f64,
            NumericClass::Int32 => i32::from_le_bytes(b.try_into().ok()?) as f64,
            NumericClass::Uint32 => u32::from_le_bytes(b.try_into().ok()?) as f64,
            NumericClass::Int64 => i64::from_le_bytes(b.try_into().ok()?) as f64,
            NumericClass::Uint64 => u64::from_le_bytes(b.try_into().ok()?) as f64,
        };
        Some(v)
    }

    /// Display form of element `i`; integers print exactly, floats compactly.
    pub fn element_display(&self, i: usize) -> String {
        let bpe = self.class.bytes_per_element();
        let Some(b) = self.real_le.get(i * bpe..(i + 1) * bpe) else {
            return "?".to_string();
        };
        match self.class {
            NumericClass::Int64 => b
                .try_into()
                .map(|a| i64::from_le_bytes(a).to_string())
                .unwrap_or_else(|_| "?".to_string()),
            NumericClass::Uint64 => b
                .try_into()
                .map(|a| u64::from_le_bytes(a).to_string())
                .unwrap_or_else(|_| "?".to_string()),
            NumericClass::Double | NumericClass::Single => {
                self.get_f64(i).map(format_float).unwrap_or_else(|| "?".to_string())
            }
            _ => self
                .get_f64(i)
                .map(|v| (v as i64).to_string())
                .unwrap_or_else(|| "?".to_string()),
        }
    }
}

pub(crate) fn format_float(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if !v.is_finite() {
        return v.to_string();
    }
    let av = v.abs();
    if !(1e-3..1e6).contains(&av) {
        format!("{:.6e}", v)
    } else {
        let s = format!("{:.6}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalArray {
    pub shape: Vec<usize>,
    /// One byte per element (0/1), column-major order.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharArray {
    pub shape: Vec<usize>,
    /// UTF-16 code units, column-major order.
    pub data: Vec<u16>,
}

impl CharArray {
    pub fn from_str_row(s: &str) -> Self {
        let data: Vec<u16> = s.encode_utf16().collect();
        Self {
            shape: vec![1, data.len()],
            data,
        }
    }

    pub fn text(&self) -> String {
        let mut s = String::from_utf16_lossy(&self.data);
        while s.ends_with('\u{0}') {
            s.pop();
        }
        s
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringArray {
    pub shape: Vec<usize>,
    /// Flattened column-major order; `None` is a missing string.
    pub data: Vec<Option<String>>,
}

/// A value stored in a simulation workspace file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatValue {
    Struct(BTreeMap<String, MatValue>),

    Numeric(NumericArray),
    Logical(LogicalArray),
    Char(CharArray),
    String(StringArray),

    /// A leaf of a kind this crate does not decode (datetime, categorical, ...).
    Opaque {
        kind: String,
        class: String,
        shape: Vec<usize>,
    },

    /// `struct()` with no fields.
    EmptyStruct,
}

impl MatValue {
    pub fn as_struct(&self) -> Option<&BTreeMap<String, MatValue>> {
        match self {
            MatValue::Struct(m) => Some(m),
            _ => None,
        }
    }

    pub fn get_path(&self, path: &str) -> Option<&MatValue> {
        if path.is_empty() {
            return Some(self);
        }
        let mut cur = self;
        for part in path.split('.') {
            cur = cur.as_struct()?.get(part)?;
        }
        Some(cur)
    }

    /// One-line summary used by the metadata view.
    pub fn summary(&self) -> String {
        const MAX_INLINE: usize = 8;
        match self {
            MatValue::Struct(m) => format!("struct with {} field(s)", m.len()),
            MatValue::EmptyStruct => "struct with 0 field(s)".to_string(),
            MatValue::Numeric(n) => {
                let count = n.len();
                let complex = if n.complex { " complex" } else { "" };
                if count == 1 && !n.complex {
                    n.element_display(0)
                } else if count <= MAX_INLINE && !n.complex {
                    let parts: Vec<String> = (0..count).map(|i| n.element_display(i)).collect();
                    format!("[{}]", parts.join(" "))
                } else {
                    format!("{} {}{}", fmt_shape(&n.shape), n.class.class_name(), complex)
                }
            }
            MatValue::Logical(l) => {
                if l.data.len() == 1 {
                    (l.data[0] != 0).to_string()
                } else if l.data.len() <= MAX_INLINE {
                    let parts: Vec<&str> =
                        l.data.iter().map(|&b| if b != 0 { "true" } else { "false" }).collect();
                    format!("[{}]", parts.join(" "))
                } else {
                    format!("{} logical", fmt_shape(&l.shape))
                }
            }
            MatValue::Char(c) => format!("'{}'", c.text()),
            MatValue::String(s) => match s.data.as_slice() {
                [Some(one)] => format!("\"{}\"", one),
                [None] => "<missing>".to_string(),
                _ => format!("{} string", fmt_shape(&s.shape)),
            },
            MatValue::Opaque { kind, class, shape } => {
                format!("{} {} ({})", fmt_shape(shape), class, kind)
            }
        }
    }
}

impl fmt::Display for MatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

pub fn fmt_shape(shape: &[usize]) -> String {
    if shape.is_empty() {
        return "[?]".to_string();
    }
    let parts: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("[{}]", parts.join(" x "))
}
