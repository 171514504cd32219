//! Device-class directory names
//!
//! Pass these to [`Query::new`](crate::Query::new).

pub const TACHO_MOTOR: &str = "tacho-motor";
pub const DC_MOTOR: &str = "dc-motor";
pub const SERVO_MOTOR: &str = "servo-motor";
pub const SENSOR: &str = "lego-sensor";
pub const LEDS: &str = "leds";
pub const POWER_SUPPLY: &str = "power_supply";
pub const PORT: &str = "lego-port";
