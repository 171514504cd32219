//! Port addresses, as reported by a device's `address` attribute
//!
//! Use them with [`Query::indexed`](crate::Query::indexed) to pin a device to
//! the port it is plugged into.

pub const INPUT_1: &str = "in1";
pub const INPUT_2: &str = "in2";
pub const INPUT_3: &str = "in3";
pub const INPUT_4: &str = "in4";

pub const OUTPUT_A: &str = "outA";
pub const OUTPUT_B: &str = "outB";
pub const OUTPUT_C: &str = "outC";
pub const OUTPUT_D: &str = "outD";
