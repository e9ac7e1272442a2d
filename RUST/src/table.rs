//! Delimited parameter-list parsing.

use crate::error::LoadError;
use std::fmt;
use std::path::Path;

/// A single parameter cell. Columns are typed as a whole, so values from one
/// column always share a variant.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Integer(i) => Some(*i as f64),
            ParamValue::Real(r) => Some(*r),
            ParamValue::Text(_) => None,
        }
    }
}

/// Exact equality, except that all NaNs are one value so a column of `nan`
/// cells dedupes and resolves like any other.
impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParamValue::Integer(a), ParamValue::Integer(b)) => a == b,
            (ParamValue::Real(a), ParamValue::Real(b)) => a == b || (a.is_nan() && b.is_nan()),
            (ParamValue::Text(a), ParamValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(i) => write!(f, "{i}"),
            ParamValue::Real(r) => write!(f, "{r:?}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Integer(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Real(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<ParamValue>,
}

/// Column-oriented view of a parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    /// 1-based source line of each data row, for error messages.
    pub lines: Vec<usize>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.lines.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Table, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadError::FileNotFound(path.to_path_buf())
            } else {
                LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Table::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Table, LoadError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .filter(|(_, l)| !l.trim().is_empty());

        let Some((_, header)) = lines.next() else {
            return Err(LoadError::MissingColumn("SimNum".to_string()));
        };
        let delim = sniff_delimiter(header);
        let names = split_cells(header, delim);
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(LoadError::DuplicateColumn(name.clone()));
            }
        }

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        let mut line_numbers = Vec::new();
        for (line, row) in lines {
            let row = split_cells(row, delim);
            if row.len() != names.len() {
                return Err(LoadError::MalformedRow {
                    line,
                    expected: names.len(),
                    got: row.len(),
                });
            }
            for (col, cell) in cells.iter_mut().zip(row) {
                col.push(cell);
            }
            line_numbers.push(line);
        }

        let columns = names
            .into_iter()
            .zip(cells)
            .map(|(name, raw)| Column {
                name,
                values: type_column(&raw),
            })
            .collect();

        Ok(Table {
            columns,
            lines: line_numbers,
        })
    }
}

fn sniff_delimiter(header: &str) -> char {
    [',', ';', '\t']
        .into_iter()
        .find(|d| header.contains(*d))
        .unwrap_or(',')
}

/// Split one line into trimmed cells. Double quotes group a cell so it may
/// contain the delimiter; `""` inside quotes is a literal quote.
fn split_cells(line: &str, delim: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delim && !in_quotes => cells.push(std::mem::take(&mut cell).trim().to_string()),
            c => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

/// Integer if every cell is an integer, else real if every cell is numeric,
/// else text.
fn type_column(raw: &[String]) -> Vec<ParamValue> {
    if let Some(ints) = raw.iter().map(|c| c.parse::<i64>().ok()).collect::<Option<Vec<_>>>() {
        return ints.into_iter().map(ParamValue::Integer).collect();
    }
    if let Some(reals) = raw.iter().map(|c| c.parse::<f64>().ok()).collect::<Option<Vec<_>>>() {
        return reals.into_iter().map(ParamValue::Real).collect();
    }
    raw.iter().map(|c| ParamValue::Text(c.clone())).collect()
}
