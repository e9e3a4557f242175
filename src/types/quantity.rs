use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QuantityKind {
    Acceleration,
    Velocity,
    Mass,
    Force,
    Angle,
    Temperature,
    Length,
}

impl QuantityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantityKind::Acceleration => "acceleration",
            QuantityKind::Velocity => "velocity",
            QuantityKind::Mass => "mass",
            QuantityKind::Force => "force",
            QuantityKind::Angle => "angle",
            QuantityKind::Temperature => "temperature",
            QuantityKind::Length => "length",
        }
    }
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A number with a recognized unit, as found in exercise text.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
    pub std_value: f64,
    pub std_unit: &'static str,
    pub kind: QuantityKind,
    /// Text surrounding the match; only used for naming and diagnostics.
    pub context: String,
}
