//! Device handles
//!
//! A [`Device`] is produced by the resolver. It is either bound to exactly one
//! device directory, in which case every attribute accessor targets that
//! directory, or unbound because nothing matched. Absent hardware is a normal
//! condition, so callers check [`Device::connected`] rather than handling an
//! error.

use crate::attribute::{AttributeDir, AttributeValue};
use classdev_config::ConfigError;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Not connected to a device; the target device was probably not found")]
    NotConnected,

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid device name pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Notification predicate failed: {0:#}")]
    Predicate(anyhow::Error),

    #[error("Notification request was removed before it fired")]
    Cancelled,

    #[error("No device named '{0}' in configuration")]
    UnknownDevice(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Where a bound device lives
#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    path: PathBuf,
    name: String,
    index: Option<u32>,
}

/// A device instance, bound or unbound
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    binding: Option<Binding>,
}

impl Device {
    /// A device that is not bound to anything
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Bind to the device directory at `path`
    ///
    /// The index is taken from the first run of digits in the directory name.
    pub(crate) fn bind(path: PathBuf, name: String) -> Self {
        let index = device_index(&name);
        Self {
            binding: Some(Binding { path, name, index }),
        }
    }

    /// Whether a device directory was found and bound
    pub fn connected(&self) -> bool {
        self.binding.is_some()
    }

    /// Absolute path of the bound device directory
    pub fn path(&self) -> Option<&Path> {
        self.binding.as_ref().map(|b| b.path.as_path())
    }

    /// Directory name of the bound device, e.g. `sensor1`
    pub fn name(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.name.as_str())
    }

    /// Number embedded in the directory name, e.g. `1` for `sensor1`
    ///
    /// `None` when the device is unbound or its name carries no digits.
    pub fn index(&self) -> Option<u32> {
        self.binding.as_ref().and_then(|b| b.index)
    }

    /// Attribute accessor for the bound directory
    pub fn attributes(&self) -> Result<AttributeDir<'_>, DeviceError> {
        self.path()
            .map(AttributeDir::new)
            .ok_or(DeviceError::NotConnected)
    }

    /// See [`AttributeDir::read_raw`]
    pub fn read_raw(&self, name: &str) -> Result<String, DeviceError> {
        self.attributes()?.read_raw(name)
    }

    /// See [`AttributeDir::read_number`]
    pub fn read_number(&self, name: &str) -> Result<Option<f64>, DeviceError> {
        self.attributes()?.read_number(name)
    }

    /// See [`AttributeDir::read_int`]
    pub fn read_int(&self, name: &str) -> Result<Option<i64>, DeviceError> {
        self.attributes()?.read_int(name)
    }

    /// See [`AttributeDir::read_sequence`]
    pub fn read_sequence(&self, name: &str) -> Result<Vec<String>, DeviceError> {
        self.attributes()?.read_sequence(name)
    }

    /// See [`AttributeDir::read_selector`]
    pub fn read_selector(&self, name: &str) -> Result<Option<String>, DeviceError> {
        self.attributes()?.read_selector(name)
    }

    /// See [`AttributeDir::write`]
    pub fn write(&self, name: &str, value: impl Into<AttributeValue>) -> Result<(), DeviceError> {
        self.attributes()?.write(name, value)
    }

    /// See [`AttributeDir::write_all`]
    pub fn write_all<I, K, V>(&self, values: I) -> Result<(), DeviceError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<AttributeValue>,
    {
        self.attributes()?.write_all(values)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Some(binding) => write!(f, "{}", binding.path.display()),
            None => f.write_str("<unbound>"),
        }
    }
}

/// First maximal run of ASCII digits in `name`
fn device_index(name: &str) -> Option<u32> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let digits = &name[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().ok()
}
