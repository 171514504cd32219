//! Fake device-class trees for testing without real hardware
//!
//! Builds the same directory layout the kernel exposes under `/sys/class`
//! below any root, so a [`Resolver`](crate::Resolver) pointed at that root
//! behaves as it would on a real host.
//!
//! # Usage
//!
//! ```no_run
//! use classdev_hal::mock::MockClassTree;
//! use classdev_hal::{Query, Resolver};
//!
//! fn main() -> anyhow::Result<()> {
//!     let root = std::env::temp_dir().join("classdev-demo");
//!     let tree = MockClassTree::new(&root)
//!         .device("tacho-motor", "motor0", &[("address", "outA"), ("state", "")])?;
//!
//!     let motor = Resolver::new(tree.root()).resolve(&Query::new("tacho-motor"))?;
//!     assert!(motor.connected());
//!     Ok(())
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A simulated device-class tree rooted at an arbitrary directory
#[derive(Debug, Clone)]
pub struct MockClassTree {
    root: PathBuf,
}

impl MockClassTree {
    /// Use `root` as the class root. Nothing is created yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Class root to hand to the resolver
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one device
    pub fn device_path(&self, class: &str, name: &str) -> PathBuf {
        self.root.join(class).join(name)
    }

    /// Create a device directory populated with `attributes`
    ///
    /// Existing attribute files are overwritten.
    pub fn device(self, class: &str, name: &str, attributes: &[(&str, &str)]) -> io::Result<Self> {
        let dir = self.device_path(class, name);
        fs::create_dir_all(&dir)?;
        for (attribute, value) in attributes {
            fs::write(dir.join(attribute), format!("{}\n", value))?;
        }
        Ok(self)
    }

    /// Change one attribute of an existing device, as the driver would
    pub fn set(&self, class: &str, name: &str, attribute: &str, value: &str) -> io::Result<()> {
        let dir = self.device_path(class, name);
        if !dir.is_dir() {
            return Err(io::ErrorKind::NotFound.into());
        }
        fs::write(dir.join(attribute), format!("{}\n", value))
    }

    /// Current content of one attribute, untrimmed
    pub fn get(&self, class: &str, name: &str, attribute: &str) -> io::Result<String> {
        fs::read_to_string(self.device_path(class, name).join(attribute))
    }

    /// Unplug a device
    pub fn remove(&self, class: &str, name: &str) -> io::Result<()> {
        fs::remove_dir_all(self.device_path(class, name))
    }
}
