//! Vital-Sign Generator
//!
//! Fabricates one [`Reading`] per call. Every field is sampled
//! independently from a uniform distribution over a fixed range; no
//! physiological correlation is modelled.

use std::ops::RangeInclusive;

use chrono::{Local, NaiveDateTime};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::UserId;
use crate::error::Result;

// =============================================================================
// Ranges
// =============================================================================

/// Heart rate, beats per minute.
pub const HEART_RATE_RANGE: RangeInclusive<u32> = 60..=100;

/// Oxygen saturation, percent.
pub const OXYGEN_SATURATION_RANGE: RangeInclusive<u32> = 92..=100;

/// Body temperature, degrees Celsius.
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 36.5..=38.5;

/// Systolic blood pressure, mmHg.
pub const SYSTOLIC_RANGE: RangeInclusive<u32> = 100..=130;

/// Diastolic blood pressure, mmHg.
pub const DIASTOLIC_RANGE: RangeInclusive<u32> = 70..=90;

/// Respiratory rate, breaths per minute.
pub const RESPIRATORY_RATE_RANGE: RangeInclusive<u32> = 12..=20;

/// Local timestamp layout used in payloads.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// Reading
// =============================================================================

/// One synthetic vital-sign record for one user at one point in time.
///
/// Field order matches the wire payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub user_id: String,
    pub heart_rate: u32,
    pub oxygen_saturation: u32,
    /// Rounded to one decimal place
    pub temperature: f64,
    /// `"{systolic}/{diastolic}"`
    pub blood_pressure: String,
    pub respiratory_rate: u32,
    /// Local time, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
}

impl Reading {
    /// Serialize to the JSON payload published on the broker.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

// =============================================================================
// Generation
// =============================================================================

/// Generate a reading for `user_id` using the thread-local RNG and the
/// current local time.
pub fn generate(user_id: &UserId) -> Reading {
    generate_with(
        &mut rand::thread_rng(),
        user_id,
        Local::now().naive_local(),
    )
}

/// Generate a reading with an explicit RNG and clock value.
pub fn generate_with<R: Rng>(rng: &mut R, user_id: &UserId, now: NaiveDateTime) -> Reading {
    let systolic = rng.gen_range(SYSTOLIC_RANGE);
    let diastolic = rng.gen_range(DIASTOLIC_RANGE);

    Reading {
        user_id: user_id.to_string(),
        heart_rate: rng.gen_range(HEART_RATE_RANGE),
        oxygen_saturation: rng.gen_range(OXYGEN_SATURATION_RANGE),
        temperature: round_to_tenth(rng.gen_range(TEMPERATURE_RANGE)),
        blood_pressure: format!("{}/{}", systolic, diastolic),
        respiratory_rate: rng.gen_range(RESPIRATORY_RATE_RANGE),
        timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap()
    }

    fn parse_blood_pressure(value: &str) -> (u32, u32) {
        let (systolic, diastolic) = value.split_once('/').unwrap();
        (systolic.parse().unwrap(), diastolic.parse().unwrap())
    }

    fn temperature_text(reading: &Reading) -> String {
        let value = serde_json::to_value(reading).unwrap();
        value["temperature"].to_string()
    }

    proptest! {
        #[test]
        fn prop_fields_within_ranges(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let reading = generate_with(&mut rng, &UserId::new("u1"), fixed_time());

            prop_assert!(HEART_RATE_RANGE.contains(&reading.heart_rate));
            prop_assert!(OXYGEN_SATURATION_RANGE.contains(&reading.oxygen_saturation));
            prop_assert!(TEMPERATURE_RANGE.contains(&reading.temperature));
            prop_assert!(RESPIRATORY_RATE_RANGE.contains(&reading.respiratory_rate));

            let (systolic, diastolic) = parse_blood_pressure(&reading.blood_pressure);
            prop_assert!(SYSTOLIC_RANGE.contains(&systolic));
            prop_assert!(DIASTOLIC_RANGE.contains(&diastolic));
        }

        #[test]
        fn prop_temperature_has_one_fractional_digit(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let reading = generate_with(&mut rng, &UserId::new("u1"), fixed_time());

            let text = temperature_text(&reading);
            let (_, fraction) = text.split_once('.').unwrap();
            prop_assert_eq!(fraction.len(), 1, "temperature rendered as {}", text);
        }
    }

    #[test]
    fn test_timestamp_format() {
        let mut rng = StdRng::seed_from_u64(1);
        let reading = generate_with(&mut rng, &UserId::new("u1"), fixed_time());
        assert_eq!(reading.timestamp, "2025-03-14 09:05:07");
    }

    #[test]
    fn test_generate_uses_user_id() {
        let reading = generate(&UserId::new("65f1c0ffee"));
        assert_eq!(reading.user_id, "65f1c0ffee");
        assert_eq!(reading.timestamp.len(), "YYYY-MM-DD HH:MM:SS".len());
    }

    #[test]
    fn test_payload_keys_and_order() {
        let mut rng = StdRng::seed_from_u64(7);
        let reading = generate_with(&mut rng, &UserId::new("u1"), fixed_time());

        let payload = String::from_utf8(reading.to_payload().unwrap()).unwrap();
        let keys = [
            "\"userId\"",
            "\"heartRate\"",
            "\"oxygenSaturation\"",
            "\"temperature\"",
            "\"bloodPressure\"",
            "\"respiratoryRate\"",
            "\"timestamp\"",
        ];

        let positions: Vec<usize> = keys.iter().map(|k| payload.find(k).unwrap()).collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);

        let value: serde_json::Value = serde_json::from_slice(&reading.to_payload().unwrap()).unwrap();
        assert_eq!(value.as_object().unwrap().len(), keys.len());
    }

    #[test]
    fn test_independent_samples_share_field_names() {
        let user = UserId::new("u1");
        let mut rng = StdRng::seed_from_u64(42);

        let first = serde_json::to_value(generate_with(&mut rng, &user, fixed_time())).unwrap();
        let samples: Vec<serde_json::Value> = (0..32)
            .map(|_| serde_json::to_value(generate_with(&mut rng, &user, fixed_time())).unwrap())
            .collect();

        let first_keys: Vec<&String> = first.as_object().unwrap().keys().collect();
        for sample in &samples {
            let keys: Vec<&String> = sample.as_object().unwrap().keys().collect();
            assert_eq!(keys, first_keys);
        }

        // With 33 draws across five ranges, identical readings every time
        // would mean the generator is caching.
        assert!(samples.iter().any(|s| s != &first));
    }

    #[test]
    fn test_round_to_tenth() {
        assert_eq!(round_to_tenth(36.54), 36.5);
        assert_eq!(round_to_tenth(36.56), 36.6);
        assert_eq!(round_to_tenth(38.5), 38.5);
    }
}
