use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const UNKNOWN_EXERCISE_TYPE: &str = "unknown";
pub const DIRECT_INPUT_SOURCE: &str = "direct_input";
const DEFAULT_TOLERANCE: f64 = 0.01;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    Physics,
    Chemistry,
    Biology,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Physics => "physics",
            Domain::Chemistry => "chemistry",
            Domain::Biology => "biology",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "physics" => Ok(Domain::Physics),
            "chemistry" => Ok(Domain::Chemistry),
            "biology" => Ok(Domain::Biology),
            other => Err(format!("Unknown domain '{}' (expected physics, chemistry or biology)", other)),
        }
    }
}

/// How an exercise reached its canonical form.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMethod {
    #[serde(rename = "gemma_3n")]
    LanguageModel,
    #[default]
    #[serde(rename = "rule_based")]
    RuleBased,
    #[serde(rename = "yaml_template")]
    YamlTemplate,
    #[serde(rename = "json_template")]
    JsonTemplate,
}

/// A 2D vector. Accepts `{x, y}`, `[x, y]` or a bare scalar `v` meaning `(v, 0)`
/// on input and always serializes as `{x, y}`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(from = "Vec2Repr")]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Vec2Repr {
    Components {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    Pair(Vec<f64>),
    Scalar(f64),
}

impl From<Vec2Repr> for Vec2 {
    fn from(repr: Vec2Repr) -> Self {
        match repr {
            Vec2Repr::Components { x, y } => Vec2 { x, y },
            Vec2Repr::Pair(values) => Vec2 {
                x: values.first().copied().unwrap_or(0.0),
                y: values.get(1).copied().unwrap_or(0.0),
            },
            Vec2Repr::Scalar(x) => Vec2 { x, y: 0.0 },
        }
    }
}

/// A tunable simulation parameter. A bare number on input is read as `{value: n}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(from = "ParameterRepr")]
pub struct ParameterSpec {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterSpec {
    /// Slider bounds default to `0..=100` with step 1, widened so the value always fits.
    pub fn new(value: f64) -> Self {
        Self {
            value,
            min: if value < 0.0 { value * 2.0 } else { 0.0 },
            max: if value > 100.0 { value * 2.0 } else { 100.0 },
            step: 1.0,
            unit: None,
            description: None,
        }
    }

    /// Explicit bounds are kept when they contain `value` and widened when
    /// they do not; missing ones take the defaults of [`ParameterSpec::new`].
    pub fn bounded(value: f64, min: Option<f64>, max: Option<f64>, step: Option<f64>) -> Self {
        let defaults = Self::new(value);
        Self {
            min: min.unwrap_or(defaults.min).min(value),
            max: max.unwrap_or(defaults.max).max(value),
            step: step.unwrap_or(defaults.step),
            ..defaults
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

enum ParameterRepr {
    Bare(f64),
    Full(FullParameter),
}

#[derive(Deserialize)]
struct FullParameter {
    value: f64,
    min: Option<f64>,
    max: Option<f64>,
    step: Option<f64>,
    unit: Option<String>,
    description: Option<String>,
}

// A malformed map form reports the offending field.
impl<'de> Deserialize<'de> for ParameterRepr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReprVisitor;

        impl<'de> Visitor<'de> for ReprVisitor {
            type Value = ParameterRepr;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or a map with a `value` field")
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
                Ok(ParameterRepr::Bare(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                Ok(ParameterRepr::Bare(value as f64))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(ParameterRepr::Bare(value as f64))
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                FullParameter::deserialize(de::value::MapAccessDeserializer::new(map)).map(ParameterRepr::Full)
            }
        }

        deserializer.deserialize_any(ReprVisitor)
    }
}

impl From<ParameterRepr> for ParameterSpec {
    fn from(repr: ParameterRepr) -> Self {
        match repr {
            ParameterRepr::Bare(value) => ParameterSpec::new(value),
            ParameterRepr::Full(full) => ParameterSpec {
                unit: full.unit,
                description: full.description,
                ..ParameterSpec::bounded(full.value, full.min, full.max, full.step)
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SimObject {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "initial_position")]
    pub position: Vec2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_velocity: Option<Vec2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Numeric,
    #[serde(other)]
    Unsupported,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Target {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: TargetKind,
    pub value: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Hint {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Feedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incorrect: Option<String>,
}

/// The canonical exercise: the only shape the session manager ever sees.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Exercise {
    #[serde(rename = "type", alias = "simulation_type", default = "unknown_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Domain,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    pub objects: Vec<SimObject>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub hints: Vec<Hint>,
    #[serde(default)]
    pub feedback: Feedback,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub parse_method: ParseMethod,
}

fn unknown_type() -> String {
    UNKNOWN_EXERCISE_TYPE.to_string()
}

impl Default for Exercise {
    fn default() -> Self {
        Exercise::new(UNKNOWN_EXERCISE_TYPE, ParseMethod::RuleBased)
    }
}

impl Exercise {
    pub fn new(kind: &str, parse_method: ParseMethod) -> Self {
        Exercise {
            kind: kind.to_string(),
            name: None,
            domain: Domain::Physics,
            parameters: BTreeMap::new(),
            objects: Vec::new(),
            targets: Vec::new(),
            hints: Vec::new(),
            feedback: Feedback::default(),
            source: String::new(),
            parse_method,
        }
    }

    /// Fills in the identifiers later stages rely on: unnamed objects become
    /// `obj_<index>` and hints without an id become `hint_<index>`.
    pub fn normalize(&mut self) {
        for (index, object) in self.objects.iter_mut().enumerate() {
            if object.name.trim().is_empty() {
                object.name = format!("obj_{}", index);
            }
        }
        for (index, hint) in self.hints.iter_mut().enumerate() {
            if hint.id.trim().is_empty() {
                hint.id = format!("hint_{}", index);
            }
        }
    }

    /// Hint targets that do not name any target of this exercise.
    pub fn dangling_hint_targets(&self) -> Vec<&str> {
        self.hints
            .iter()
            .filter_map(|hint| hint.target.as_deref())
            .filter(|target_id| !self.targets.iter().any(|t| t.id == *target_id))
            .collect()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed Exercise")
    }
}

/// A structural document as found on disk: one exercise, or a list of candidates.
#[derive(Debug)]
pub enum ExerciseDocument {
    One(Box<Exercise>),
    Many(Vec<Exercise>),
}

impl ExerciseDocument {
    /// The top-level shape is checked first so that errors come from the
    /// concrete exercise type and name the offending field.
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        if value.is_sequence() {
            serde_yaml::from_str(text).map(ExerciseDocument::Many)
        } else {
            serde_yaml::from_str(text).map(|exercise| ExerciseDocument::One(Box::new(exercise)))
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.is_array() {
            serde_json::from_str(text).map(ExerciseDocument::Many)
        } else {
            serde_json::from_str(text).map(|exercise| ExerciseDocument::One(Box::new(exercise)))
        }
    }

    /// Collapses the document to a single exercise: the first candidate that
    /// defines objects, else the first candidate. `None` for an empty list.
    pub fn into_exercise(self) -> Option<Exercise> {
        let mut exercise = match self {
            ExerciseDocument::One(exercise) => *exercise,
            ExerciseDocument::Many(candidates) => {
                let with_objects = candidates.iter().position(|c| !c.objects.is_empty());
                let index = with_objects.unwrap_or(0);
                candidates.into_iter().nth(index)?
            }
        };
        exercise.normalize();
        Some(exercise)
    }
}
