//! Attribute file access
//!
//! Every device directory holds one text file per attribute. Reads return the
//! file's content trimmed of surrounding whitespace; writes replace it. Some
//! attributes list their options space-separated with the active option in
//! brackets, e.g. `[run-forever] run-to-abs-pos stop`.

use crate::device::DeviceError;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A value that can be written to an attribute file
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Int(i64),
    Float(f64),
    /// Written space-separated
    Sequence(Vec<String>),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) => f.write_str(s),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Float(x) => write!(f, "{}", x),
            AttributeValue::Sequence(items) => f.write_str(&items.join(" ")),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value.into())
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Int(value.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Sequence(values)
    }
}

/// Typed access to the attribute files of one directory
///
/// The directory does not have to belong to a bound device, which is how the
/// resolver inspects candidates before binding one.
#[derive(Debug, Clone, Copy)]
pub struct AttributeDir<'a> {
    path: &'a Path,
}

impl<'a> AttributeDir<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self { path }
    }

    /// Directory the attributes live in
    pub fn path(&self) -> &'a Path {
        self.path
    }

    /// Full path of an attribute file
    pub fn attribute_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Read an attribute as trimmed text
    pub fn read_raw(&self, name: &str) -> Result<String, DeviceError> {
        let path = self.attribute_path(name);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(contents.trim().to_string()),
            Err(source) => Err(DeviceError::Io { path, source }),
        }
    }

    /// Read an attribute as a number
    ///
    /// Returns `Ok(None)` when the content is not numeric. Several attributes
    /// hold either a number or a word depending on device state, so this is
    /// not an error.
    pub fn read_number(&self, name: &str) -> Result<Option<f64>, DeviceError> {
        Ok(parse_number(&self.read_raw(name)?))
    }

    /// Read an attribute as an integer, `Ok(None)` if it is not one
    pub fn read_int(&self, name: &str) -> Result<Option<i64>, DeviceError> {
        Ok(self.read_raw(name)?.parse().ok())
    }

    /// Read a space-separated listing, brackets removed, in device order
    pub fn read_sequence(&self, name: &str) -> Result<Vec<String>, DeviceError> {
        Ok(parse_sequence(&self.read_raw(name)?))
    }

    /// Read the bracketed entry of a listing
    ///
    /// Returns `Ok(None)` when no entry is bracketed, and also when several
    /// are, since the active option is then ambiguous.
    pub fn read_selector(&self, name: &str) -> Result<Option<String>, DeviceError> {
        Ok(parse_selector(&self.read_raw(name)?))
    }

    /// Write an attribute
    ///
    /// The file must already exist. Read-only attributes fail here like any
    /// other write error.
    pub fn write(&self, name: &str, value: impl Into<AttributeValue>) -> Result<(), DeviceError> {
        let path = self.attribute_path(name);
        let value: AttributeValue = value.into();
        let value = value.to_string();
        tracing::debug!("Writing '{}' to {}", value, path.display());

        let result = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .and_then(|mut file| file.write_all(value.as_bytes()));

        result.map_err(|source| DeviceError::Io { path, source })
    }

    /// Write several attributes in order, stopping at the first failure
    pub fn write_all<I, K, V>(&self, values: I) -> Result<(), DeviceError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<AttributeValue>,
    {
        for (name, value) in values {
            self.write(name.as_ref(), value)?;
        }
        Ok(())
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn strip_brackets(token: &str) -> &str {
    let token = token.strip_prefix('[').unwrap_or(token);
    token.strip_suffix(']').unwrap_or(token)
}

fn is_bracketed(token: &str) -> bool {
    token.len() >= 2 && token.starts_with('[') && token.ends_with(']')
}

fn parse_sequence(raw: &str) -> Vec<String> {
    raw.split_whitespace()
        .map(|token| strip_brackets(token).to_string())
        .collect()
}

fn parse_selector(raw: &str) -> Option<String> {
    let mut bracketed = raw.split_whitespace().filter(|token| is_bracketed(token));
    let selected = bracketed.next()?;
    if bracketed.next().is_some() {
        tracing::debug!("Ambiguous selector value '{}'", raw);
        return None;
    }
    Some(strip_brackets(selected).to_string())
}
