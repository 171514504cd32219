//! Device resolution
//!
//! Finds the directory of one device inside a device-class directory, e.g.
//! `/sys/class/lego-sensor/sensor1`, by matching directory names against a
//! pattern and attribute values against constraints.
//!
//! # Tie-break
//!
//! When several directories satisfy a query, the **last** one in directory
//! listing order is bound. Listing order is whatever the host filesystem
//! returns, so an ambiguous query is not portable between hosts. A warning is
//! logged whenever this happens; tighten the query to avoid it.

use crate::attribute::AttributeDir;
use crate::device::{Device, DeviceError};
use classdev_config::{Constraint, DeviceSpec, HalConfig};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What to look for in a device-class directory
#[derive(Debug, Clone)]
pub struct Query {
    class: String,
    pattern: Option<Regex>,
    constraints: BTreeMap<String, Constraint>,
}

impl Query {
    /// Any device in the `class` directory
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            pattern: None,
            constraints: BTreeMap::new(),
        }
    }

    /// The usual query for numbered devices such as motors and sensors
    ///
    /// `address` pins the port the device is plugged into; `driver_names`
    /// lists acceptable drivers. Either may be left out.
    pub fn indexed(
        class: impl Into<String>,
        pattern: &str,
        address: Option<&str>,
        driver_names: &[&str],
    ) -> Result<Self, DeviceError> {
        let mut query = Self::new(class).with_pattern(pattern)?;
        if let Some(address) = address {
            query = query.with_constraint("address", address);
        }
        if !driver_names.is_empty() {
            query = query.with_constraint("driver_name", driver_names);
        }
        Ok(query)
    }

    /// Only consider directories whose name matches `pattern`
    ///
    /// The pattern is searched for anywhere in the name; anchor it with `^`
    /// and `$` for an exact match.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, DeviceError> {
        self.pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Require `attribute` to satisfy `constraint`
    pub fn with_constraint(
        mut self,
        attribute: impl Into<String>,
        constraint: impl Into<Constraint>,
    ) -> Self {
        self.constraints.insert(attribute.into(), constraint.into());
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    fn accepts_name(&self, name: &str) -> bool {
        self.pattern.as_ref().is_none_or(|p| p.is_match(name))
    }

    fn accepts_attributes(&self, attrs: AttributeDir<'_>) -> Result<bool, DeviceError> {
        for (attribute, constraint) in &self.constraints {
            let value = attrs.read_raw(attribute)?;
            if !constraint.matches(&value) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl TryFrom<&DeviceSpec> for Query {
    type Error = DeviceError;

    fn try_from(spec: &DeviceSpec) -> Result<Self, Self::Error> {
        let mut query = Query::new(spec.class.clone());
        if let Some(pattern) = &spec.pattern {
            query = query.with_pattern(pattern)?;
        }
        query.constraints = spec.constraints.clone();
        Ok(query)
    }
}

/// Resolves queries against one device-class tree
#[derive(Debug, Clone)]
pub struct Resolver {
    class_root: PathBuf,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::from_config(&HalConfig::default())
    }
}

impl Resolver {
    /// Resolve against the tree rooted at `class_root`
    pub fn new(class_root: impl Into<PathBuf>) -> Self {
        Self {
            class_root: class_root.into(),
        }
    }

    pub fn from_config(config: &HalConfig) -> Self {
        Self::new(config.class_root.clone())
    }

    pub fn class_root(&self) -> &Path {
        &self.class_root
    }

    /// Bind the device matching `query`
    ///
    /// Returns an unbound device if the class directory is missing or nothing
    /// matches. Fails only on I/O errors while listing the class directory or
    /// reading a constrained attribute.
    pub fn resolve(&self, query: &Query) -> Result<Device, DeviceError> {
        let mut matches = self.matches(query)?;
        if matches.len() > 1 {
            let names: Vec<&str> = matches.iter().filter_map(|d| d.name()).collect();
            tracing::warn!(
                "{} devices in '{}' match the query ({}), binding the last one",
                matches.len(),
                query.class,
                names.join(", ")
            );
        }

        let device = matches.pop().unwrap_or_default();
        match device.path() {
            Some(path) => tracing::info!("Bound device at {}", path.display()),
            None => tracing::debug!("No device found in '{}'", query.class),
        }
        Ok(device)
    }

    /// Resolve a named device from configuration
    pub fn resolve_named(&self, config: &HalConfig, name: &str) -> Result<Device, DeviceError> {
        let spec = config
            .device(name)
            .ok_or_else(|| DeviceError::UnknownDevice(name.to_string()))?;
        self.resolve(&Query::try_from(spec)?)
    }

    /// Every device matching `query`, in directory listing order
    pub fn matches(&self, query: &Query) -> Result<Vec<Device>, DeviceError> {
        let class_dir = self.class_root.join(&query.class);

        let entries = match fs::read_dir(&class_dir) {
            Ok(entries) => entries,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                tracing::debug!("Device class directory {} not present", class_dir.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(DeviceError::Io {
                    path: class_dir,
                    source,
                });
            }
        };

        let mut devices = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| DeviceError::Io {
                path: class_dir.clone(),
                source,
            })?;
            let path = entry.path();

            // Class entries are usually symlinks; follow them.
            if !path.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if !query.accepts_name(&name) {
                continue;
            }

            if !query.accepts_attributes(AttributeDir::new(&path))? {
                continue;
            }

            devices.push(Device::bind(path, name));
        }

        Ok(devices)
    }
}
