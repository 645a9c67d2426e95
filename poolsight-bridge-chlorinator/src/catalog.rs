//! Register catalog for the chlorinator controller.
//!
//! Every field the bridge reads is described by a [`RegisterSpec`]: where it
//! lives on the bus, which function code reads it and how the raw word
//! becomes a physical value.

use std::collections::HashSet;

use crate::decode::DecodeRule;

/// Modbus read function used for a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// Function 0x04, 16-bit read-only words.
    InputRegister,
    /// Function 0x02, single read-only bits.
    DiscreteInput,
    /// Function 0x03, 16-bit read/write words.
    HoldingRegister,
}

impl FunctionCode {
    /// Return the string name for this function.
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionCode::InputRegister => "input",
            FunctionCode::DiscreteInput => "discrete",
            FunctionCode::HoldingRegister => "holding",
        }
    }

    /// The protocol function code number.
    pub fn code(&self) -> u8 {
        match self {
            FunctionCode::InputRegister => 0x04,
            FunctionCode::DiscreteInput => 0x02,
            FunctionCode::HoldingRegister => 0x03,
        }
    }
}

/// Poll cadence group a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Measured every cycle.
    Sensor,
    /// Alarm/regulation flag, measured on status cycles only.
    Status,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Sensor => "sensor",
            FieldKind::Status => "status",
        }
    }
}

/// Definition of one readable field.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSpec {
    /// Stable identifier, also the last topic segment.
    pub key: &'static str,
    /// Human-readable name used in diagnostics.
    pub label: &'static str,
    pub address: u16,
    pub function: FunctionCode,
    pub slave_id: u8,
    pub decode: DecodeRule,
    /// Engineering unit; empty for flags.
    pub unit: &'static str,
    pub kind: FieldKind,
}

/// Catalog construction errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("Duplicate register key '{0}'")]
    DuplicateKey(String),
    #[error("Register '{key}': divisor must be positive, got {divisor}")]
    InvalidDivisor { key: String, divisor: f64 },
    #[error("Register '{key}': boolean decode requires a discrete input")]
    BooleanOnWord { key: String },
}

/// Immutable, validated set of register definitions.
#[derive(Debug, Clone)]
pub struct Catalog {
    specs: Vec<RegisterSpec>,
}

struct Field {
    key: &'static str,
    label: &'static str,
    address: u16,
    decode: DecodeRule,
    unit: &'static str,
}

const SENSORS: &[Field] = &[
    Field {
        key: "orp",
        label: "ORP",
        address: 0x0000,
        decode: DecodeRule::SignedScaled(1.0),
        unit: "mV",
    },
    Field {
        key: "ph",
        label: "pH",
        address: 0x0001,
        decode: DecodeRule::UnsignedScaled(100.0),
        unit: "pH",
    },
    Field {
        key: "ec",
        label: "Electrical Conductivity",
        address: 0x0002,
        decode: DecodeRule::UnsignedRaw,
        unit: "ppm",
    },
    // Divisor of 10 is assumed from the controller's other temperature channels.
    Field {
        key: "pool_temp",
        label: "Pool Temperature",
        address: 0x0003,
        decode: DecodeRule::SignedScaled(10.0),
        unit: "°C",
    },
    Field {
        key: "chlorine",
        label: "Chlorine Production",
        address: 0x0005,
        decode: DecodeRule::UnsignedRaw,
        unit: "%",
    },
];

const FLAGS: &[(&str, &str, u16)] = &[
    ("power_supply_abnormal", "Power Supply Abnormal", 0x0000),
    ("ph_regulation", "pH Regulation", 0x0001),
    ("orp_regulation", "ORP Regulation", 0x0002),
    (
        "controller_over_temperature",
        "Controller Over-temperature Protection",
        0x0003,
    ),
    ("no_flow", "No Flow", 0x0030),
];

impl Catalog {
    /// Build a catalog, checking key uniqueness and decode rules.
    pub fn new(specs: Vec<RegisterSpec>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.key) {
                return Err(CatalogError::DuplicateKey(spec.key.to_string()));
            }
            if let Some(divisor) = spec.decode.divisor() {
                if !(divisor > 0.0) {
                    return Err(CatalogError::InvalidDivisor {
                        key: spec.key.to_string(),
                        divisor,
                    });
                }
            }
            if spec.decode == DecodeRule::Boolean && spec.function != FunctionCode::DiscreteInput {
                return Err(CatalogError::BooleanOnWord {
                    key: spec.key.to_string(),
                });
            }
        }
        Ok(Self { specs })
    }

    /// The register map of the Aquark salt chlorinator, addressed to `slave_id`.
    pub fn chlorinator(slave_id: u8) -> Self {
        let sensors = SENSORS.iter().map(|f| RegisterSpec {
            key: f.key,
            label: f.label,
            address: f.address,
            function: FunctionCode::InputRegister,
            slave_id,
            decode: f.decode,
            unit: f.unit,
            kind: FieldKind::Sensor,
        });
        let flags = FLAGS.iter().map(|&(key, label, address)| RegisterSpec {
            key,
            label,
            address,
            function: FunctionCode::DiscreteInput,
            slave_id,
            decode: DecodeRule::Boolean,
            unit: "",
            kind: FieldKind::Status,
        });

        Self {
            specs: sensors.chain(flags).collect(),
        }
    }

    /// Look up a field by key.
    pub fn get(&self, key: &str) -> Option<&RegisterSpec> {
        self.specs.iter().find(|s| s.key == key)
    }

    /// All fields, in read order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisterSpec> {
        self.specs.iter()
    }

    /// Fields of one cadence group, in read order.
    pub fn of_kind(&self, kind: FieldKind) -> impl Iterator<Item = &RegisterSpec> {
        self.specs.iter().filter(move |s| s.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chlorinator_catalog_is_valid() {
        let catalog = Catalog::chlorinator(8);
        let rebuilt = Catalog::new(catalog.iter().cloned().collect()).unwrap();
        assert_eq!(rebuilt.len(), 10);
        assert!(catalog.iter().all(|s| s.slave_id == 8));
    }

    #[test]
    fn test_sensor_fields() {
        let catalog = Catalog::chlorinator(8);
        let keys: Vec<_> = catalog.of_kind(FieldKind::Sensor).map(|s| s.key).collect();
        assert_eq!(keys, vec!["orp", "ph", "ec", "pool_temp", "chlorine"]);

        let ph = catalog.get("ph").unwrap();
        assert_eq!(ph.address, 0x0001);
        assert_eq!(ph.function, FunctionCode::InputRegister);
        assert_eq!(ph.decode, DecodeRule::UnsignedScaled(100.0));

        let chlorine = catalog.get("chlorine").unwrap();
        assert_eq!(chlorine.address, 0x0005);
        assert_eq!(chlorine.unit, "%");

        let temp = catalog.get("pool_temp").unwrap();
        assert_eq!(temp.decode, DecodeRule::SignedScaled(10.0));
    }

    #[test]
    fn test_status_flags() {
        let catalog = Catalog::chlorinator(8);
        let flags: Vec<_> = catalog.of_kind(FieldKind::Status).collect();
        assert_eq!(flags.len(), 5);
        assert!(flags.iter().all(|f| f.function == FunctionCode::DiscreteInput));
        assert!(flags.iter().all(|f| f.decode == DecodeRule::Boolean));
        assert_eq!(catalog.get("no_flow").unwrap().address, 0x0030);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let orp = Catalog::chlorinator(8).get("orp").cloned().unwrap();
        let err = Catalog::new(vec![orp.clone(), orp]).unwrap_err();
        assert_eq!(err, CatalogError::DuplicateKey("orp".to_string()));
    }

    #[test]
    fn test_invalid_divisor_rejected() {
        let mut ph = Catalog::chlorinator(8).get("ph").cloned().unwrap();
        ph.decode = DecodeRule::UnsignedScaled(0.0);
        assert!(matches!(
            Catalog::new(vec![ph]),
            Err(CatalogError::InvalidDivisor { .. })
        ));
    }

    #[test]
    fn test_boolean_on_word_rejected() {
        let mut ec = Catalog::chlorinator(8).get("ec").cloned().unwrap();
        ec.decode = DecodeRule::Boolean;
        assert!(matches!(
            Catalog::new(vec![ec]),
            Err(CatalogError::BooleanOnWord { .. })
        ));
    }

    #[test]
    fn test_function_codes() {
        assert_eq!(FunctionCode::InputRegister.code(), 0x04);
        assert_eq!(FunctionCode::DiscreteInput.code(), 0x02);
        assert_eq!(FunctionCode::HoldingRegister.code(), 0x03);
        assert_eq!(FunctionCode::DiscreteInput.as_str(), "discrete");
    }
}
