use serde::Serialize;

use crate::error::{InvalidName, InvalidSpec};
use crate::query::{check_literal, LookbackDays};

pub const CLIMATE_SENSOR: &str = "DHT22";
pub const MOTION_SENSOR: &str = "MPU6050";

pub const CLIMATE_MEASUREMENT: &str = "studio-dht22";
pub const MOTION_MEASUREMENT: &str = "mpu6050";

pub const CLIMATE_FIELDS: [&str; 3] = ["humedad", "temperatura", "sensacion_termica"];
pub const MOTION_FIELDS: [&str; 7] = [
    "accel_x",
    "accel_y",
    "accel_z",
    "gyro_x",
    "gyro_y",
    "gyro_z",
    "temperature",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorFamily {
    /// Humidity, temperature and heat index.
    Climate,
    /// 3-axis acceleration, 3-axis angular rate and die temperature.
    Motion,
}

/// Measurement and field set queried for one sensor family.
///
/// Names are checked once at construction so they can be embedded in Flux
/// string literals without escaping. Field order is kept as given and
/// duplicates are dropped. The lookback is the window used when a caller
/// does not pick one and is at least one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorQuerySpec {
    measurement: String,
    fields: Vec<String>,
    lookback_days: LookbackDays,
}

impl SensorQuerySpec {
    pub fn new<I, S>(
        measurement: impl Into<String>,
        fields: I,
        lookback_days: i64,
    ) -> Result<Self, InvalidSpec>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lookback = LookbackDays::new(lookback_days).map_err(|_| InvalidSpec::Lookback {
            days: lookback_days,
        })?;
        let measurement = measurement.into();
        check_literal("measurement", &measurement)?;

        let mut unique: Vec<String> = Vec::new();
        for field in fields {
            let field = field.into();
            check_literal("field", &field)?;
            if !unique.contains(&field) {
                unique.push(field);
            }
        }
        if unique.is_empty() {
            return Err(InvalidSpec::Name(InvalidName {
                kind: "field",
                value: String::new(),
                reason: "a sensor needs at least one field",
            }));
        }

        Ok(Self {
            measurement,
            fields: unique,
            lookback_days: lookback,
        })
    }

    // Builtin names are plain identifiers; `builtin_names_are_valid_literals` covers them.
    fn from_static(measurement: &'static str, fields: &[&'static str]) -> Self {
        Self {
            measurement: measurement.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            lookback_days: LookbackDays::DEFAULT,
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Lookback used when the caller does not choose one.
    pub fn lookback_days(&self) -> LookbackDays {
        self.lookback_days
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredSensor {
    pub name: String,
    pub family: SensorFamily,
    pub spec: SensorQuerySpec,
}

/// Fixed mapping from sensor name to query spec, iterated in insertion order.
#[derive(Debug, Clone)]
pub struct SensorRegistry {
    entries: Vec<RegisteredSensor>,
}

impl SensorRegistry {
    pub fn new(entries: Vec<RegisteredSensor>) -> Self {
        Self { entries }
    }

    pub fn builtin() -> Self {
        let climate = SensorQuerySpec::from_static(CLIMATE_MEASUREMENT, &CLIMATE_FIELDS);
        let motion = SensorQuerySpec::from_static(MOTION_MEASUREMENT, &MOTION_FIELDS);

        Self::new(vec![
            RegisteredSensor {
                name: CLIMATE_SENSOR.to_string(),
                family: SensorFamily::Climate,
                spec: climate,
            },
            RegisteredSensor {
                name: MOTION_SENSOR.to_string(),
                family: SensorFamily::Motion,
                spec: motion,
            },
        ])
    }

    /// Replaces every sensor's default lookback.
    pub fn with_default_lookback(mut self, lookback: LookbackDays) -> Self {
        for entry in &mut self.entries {
            entry.spec.lookback_days = lookback;
        }
        self
    }

    /// Case-insensitive lookup by sensor name.
    pub fn get(&self, name: &str) -> Option<&RegisteredSensor> {
        let name = name.trim();
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSensor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_covers_both_families() {
        let registry = SensorRegistry::builtin();
        assert_eq!(registry.len(), 2);

        let names: Vec<&str> = registry.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![CLIMATE_SENSOR, MOTION_SENSOR]);

        let climate = registry.get("dht22").expect("climate");
        assert_eq!(climate.family, SensorFamily::Climate);
        assert_eq!(climate.spec.measurement(), "studio-dht22");
        assert_eq!(climate.spec.fields().len(), 3);

        let motion = registry.get("MPU6050").expect("motion");
        assert_eq!(motion.family, SensorFamily::Motion);
        assert_eq!(motion.spec.measurement(), "mpu6050");
        assert_eq!(motion.spec.fields().len(), 7);
        assert_eq!(motion.spec.lookback_days().get(), 3);

        assert!(registry.get("bme280").is_none());
    }

    #[test]
    fn builtin_names_are_valid_literals() {
        for entry in SensorRegistry::builtin().iter() {
            let checked = SensorQuerySpec::new(
                entry.spec.measurement(),
                entry.spec.fields().to_vec(),
                entry.spec.lookback_days().get(),
            )
            .expect("builtin spec passes validation");
            assert_eq!(checked, entry.spec);
        }
    }

    #[test]
    fn spec_drops_duplicate_fields_and_keeps_order() {
        let spec = SensorQuerySpec::new("m", ["b", "a", "b"], 1).unwrap();
        assert_eq!(spec.fields(), &["b".to_string(), "a".to_string()]);
        assert!(spec.contains_field("a"));
        assert!(!spec.contains_field("c"));
    }

    #[test]
    fn spec_rejects_unsafe_names() {
        let err = SensorQuerySpec::new("m\" or true", ["a"], 1).unwrap_err();
        assert!(matches!(
            err,
            InvalidSpec::Name(InvalidName { kind: "measurement", .. })
        ));

        let err = SensorQuerySpec::new("m", ["a", "b\\"], 1).unwrap_err();
        assert!(matches!(
            err,
            InvalidSpec::Name(InvalidName { kind: "field", .. })
        ));

        let err = SensorQuerySpec::new("m", Vec::<String>::new(), 1).unwrap_err();
        assert!(matches!(
            err,
            InvalidSpec::Name(InvalidName { kind: "field", .. })
        ));
    }

    #[test]
    fn spec_rejects_non_positive_lookback() {
        assert_eq!(
            SensorQuerySpec::new("m", ["a"], 0).unwrap_err(),
            InvalidSpec::Lookback { days: 0 }
        );
        assert_eq!(
            SensorQuerySpec::new("m", ["a"], -4).unwrap_err(),
            InvalidSpec::Lookback { days: -4 }
        );
        let spec = SensorQuerySpec::new("m", ["a"], 1).unwrap();
        assert_eq!(spec.lookback_days().get(), 1);
    }

    #[test]
    fn default_lookback_can_be_replaced() {
        let registry =
            SensorRegistry::builtin().with_default_lookback(LookbackDays::new(7).unwrap());
        assert!(registry.iter().all(|e| e.spec.lookback_days().get() == 7));
    }
}
