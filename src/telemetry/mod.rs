//! Telemetry module
//!
//! Synthetic vital-sign readings and their wire payload.

mod generator;

pub use generator::{
    generate, generate_with, Reading, DIASTOLIC_RANGE, HEART_RATE_RANGE, OXYGEN_SATURATION_RANGE,
    RESPIRATORY_RATE_RANGE, SYSTOLIC_RANGE, TEMPERATURE_RANGE, TIMESTAMP_FORMAT,
};
