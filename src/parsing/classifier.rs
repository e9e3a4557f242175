use crate::types::quantity::{Quantity, QuantityKind};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExerciseType {
    ProjectileMotion,
    FreeFall,
    InclinedPlane,
    SpringMass,
    Unknown,
}

impl ExerciseType {
    /// Identifier shared with template ids and the exercise `type` field.
    pub fn id(&self) -> &'static str {
        match self {
            ExerciseType::ProjectileMotion => "projectile_motion",
            ExerciseType::FreeFall => "free_fall",
            ExerciseType::InclinedPlane => "inclined_plane",
            ExerciseType::SpringMass => "spring_mass",
            ExerciseType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

const PROJECTILE_TERMS: &[&str] = &["projectile", "thrown", "launched", "fired"];
const FREE_FALL_TERMS: &[&str] = &["fall", "dropped", "free fall"];
const INCLINE_TERMS: &[&str] = &["inclined", "slope", "ramp", "angle of"];

/// First matching rule wins; the order encodes keyword specificity.
pub fn classify(normalized_text: &str, quantities: &[Quantity]) -> ExerciseType {
    let text = normalized_text.to_lowercase();
    let mentions = |terms: &[&str]| terms.iter().any(|term| text.contains(term));
    let has = |kind: QuantityKind| quantities.iter().any(|q| q.kind == kind);

    if mentions(PROJECTILE_TERMS) && has(QuantityKind::Angle) {
        ExerciseType::ProjectileMotion
    } else if mentions(FREE_FALL_TERMS) && has(QuantityKind::Acceleration) {
        ExerciseType::FreeFall
    } else if mentions(INCLINE_TERMS) && has(QuantityKind::Angle) {
        ExerciseType::InclinedPlane
    } else if text.contains("spring") && (text.contains("stretch") || text.contains("compress")) {
        ExerciseType::SpringMass
    } else {
        ExerciseType::Unknown
    }
}
