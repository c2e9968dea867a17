//! Model configuration documents in protobuf text format.
//!
//! A [`Descriptor`] is an ordered mapping of keys to [`Value`]s. Rendering is
//! block structured with two spaces per nesting level:
//!
//! ```text
//! name: "m1"
//! max_batch_size: 4
//! input [
//!   {
//!     name: "x"
//!     data_type: TYPE_FP32
//!     dims: [3, 224, 224]
//!   }
//! ]
//! dynamic_batching {
//! }
//! ```
//!
//! Whitespace and quoting are significant: the runtime parses these files.

use indexmap::IndexMap;
use std::fmt;

const TAB: usize = 2;

/// Literal replacements applied to the textual form of formatted values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitutions(IndexMap<String, String>);

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.0.insert(from.into(), to.into());
        self
    }

    /// `0` marks a dimension resolved per request, which the runtime spells `-1`.
    pub fn dynamic_dims() -> Self {
        Self::new().with("0", "-1")
    }

    pub fn apply<'a>(&'a self, value: &'a str) -> &'a str {
        self.0.get(value).map(String::as_str).unwrap_or(value)
    }
}

/// A value written without quotes: an enum token such as `TYPE_FP32` or a
/// bracketed literal list such as `[3, 224, 224]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattedValue {
    Sequence {
        items: Vec<String>,
        substitutions: Option<Substitutions>,
    },
    Scalar {
        value: String,
        substitutions: Option<Substitutions>,
    },
}

impl FormattedValue {
    pub fn sequence<T: ToString>(items: impl IntoIterator<Item = T>) -> Self {
        FormattedValue::Sequence {
            items: items.into_iter().map(|item| item.to_string()).collect(),
            substitutions: None,
        }
    }

    pub fn scalar(value: impl Into<String>) -> Self {
        FormattedValue::Scalar {
            value: value.into(),
            substitutions: None,
        }
    }

    pub fn with_substitutions(mut self, table: Substitutions) -> Self {
        match &mut self {
            FormattedValue::Sequence { substitutions, .. }
            | FormattedValue::Scalar { substitutions, .. } => *substitutions = Some(table),
        }
        self
    }
}

fn substitute<'a>(substitutions: &'a Option<Substitutions>, value: &'a str) -> &'a str {
    match substitutions {
        Some(table) => table.apply(value),
        None => value,
    }
}

impl fmt::Display for FormattedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormattedValue::Sequence {
                items,
                substitutions,
            } => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(substitute(substitutions, item))?;
                }
                f.write_str("]")
            }
            FormattedValue::Scalar {
                value,
                substitutions,
            } => f.write_str(substitute(substitutions, value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    Formatted(FormattedValue),
    List(Vec<Value>),
    Map(Descriptor),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<FormattedValue> for Value {
    fn from(value: FormattedValue) -> Self {
        Value::Formatted(value)
    }
}

impl From<Descriptor> for Value {
    fn from(value: Descriptor) -> Self {
        Value::Map(value)
    }
}

impl From<Vec<Descriptor>> for Value {
    fn from(values: Vec<Descriptor>) -> Self {
        Value::List(values.into_iter().map(Value::Map).collect())
    }
}

/// Ordered key/value document. `Display` renders the block body; use
/// [`Descriptor::to_document`] for a complete file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    entries: IndexMap<String, Value>,
}

impl Descriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Header comment naming the model and backend, followed by the body.
    pub fn to_document(&self) -> String {
        format!(
            "# Triton model configuration (protobuf text format).\n\
             # Generated by trsp; manual edits are overwritten on the next build.\n\
             # Model: {}.\n\
             # Backend: {}.\n\
             # ------------------------------\n\
             \n\
             {}",
            self.text_of("name"),
            self.text_of("backend"),
            self
        )
    }

    fn text_of(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::Str(s)) => s.clone(),
            Some(Value::Int(n)) => n.to_string(),
            Some(Value::Formatted(v)) => v.to_string(),
            _ => String::new(),
        }
    }

    fn write_block(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        for (key, value) in &self.entries {
            let pad = Pad(indent);
            match value {
                Value::Str(s) => writeln!(f, "{pad}{key}: \"{}\"", Escaped(s))?,
                Value::Int(n) => writeln!(f, "{pad}{key}: {n}")?,
                Value::Formatted(v) => writeln!(f, "{pad}{key}: {v}")?,
                Value::List(items) => {
                    writeln!(f, "{pad}{key} [")?;
                    write_items(f, items, indent + TAB)?;
                    writeln!(f, "{pad}]")?;
                }
                Value::Map(map) => {
                    writeln!(f, "{pad}{key} {{")?;
                    map.write_block(f, indent + TAB)?;
                    writeln!(f, "{pad}}}")?;
                }
            }
        }
        Ok(())
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value], indent: usize) -> fmt::Result {
    let pad = Pad(indent);
    for (i, item) in items.iter().enumerate() {
        let separator = if i + 1 < items.len() { "," } else { "" };
        match item {
            Value::Str(s) => writeln!(f, "{pad}\"{}\"", Escaped(s))?,
            Value::Int(n) => writeln!(f, "{pad}{n}")?,
            Value::Formatted(v) => writeln!(f, "{pad}{v}")?,
            Value::Map(map) => {
                writeln!(f, "{pad}{{")?;
                map.write_block(f, indent + TAB)?;
                writeln!(f, "{pad}}}{separator}")?;
            }
            Value::List(inner) => {
                writeln!(f, "{pad}[")?;
                write_items(f, inner, indent + TAB)?;
                writeln!(f, "{pad}]{separator}")?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_block(f, 0)
    }
}

struct Pad(usize);

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:width$}", "", width = self.0)
    }
}

struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                _ => write!(f, "{c}")?,
            }
        }
        Ok(())
    }
}
