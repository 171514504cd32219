//! Hardware abstraction over sysfs device classes
//!
//! The host exposes each device category (motors, sensors, LEDs, power
//! supplies) as a directory under `/sys/class`, with one directory per device
//! and one text file per device attribute. This crate provides the substrate
//! that device-specific code builds on:
//!
//! - [`Resolver`] finds and binds the device matching a [`Query`]
//! - [`Device`] and [`AttributeDir`] read and write attributes, typed
//! - [`Scheduler`] waits for attributes to reach a desired state
//!
//! # Example
//!
//! ```no_run
//! use classdev_hal::{classes, ports, Query, Resolver};
//!
//! fn main() -> anyhow::Result<()> {
//!     let resolver = Resolver::default();
//!     let query = Query::indexed(classes::SENSOR, "sensor(\\d*)", Some(ports::INPUT_2), &[])?;
//!
//!     let sensor = resolver.resolve(&query)?;
//!     if sensor.connected() {
//!         println!("sensor{:?} in mode {}", sensor.index(), sensor.read_raw("mode")?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod attribute;
pub mod classes;
pub mod device;
pub mod mock;
pub mod ports;
pub mod resolver;
pub mod scheduler;

pub use attribute::{AttributeDir, AttributeValue};
pub use classdev_config::{Constraint, DeviceSpec, HalConfig};
pub use device::{Device, DeviceError};
pub use resolver::{Query, Resolver};
pub use scheduler::{Clock, ManualClock, Notified, RequestHandle, Scheduler, ThreadClock, Trigger};

/// HAL Result type
pub type Result<T> = std::result::Result<T, DeviceError>;
