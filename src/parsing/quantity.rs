use crate::types::quantity::{Quantity, QuantityKind};
use regex::Regex;
use tracing::debug;

const CONTEXT_CHARS: usize = 20;

/// Recognized unit → (kind, factor to the standard unit, standard unit).
pub const UNIT_TABLE: &[(&str, QuantityKind, f64, &str)] = &[
    ("m/s²", QuantityKind::Acceleration, 1.0, "m/s²"),
    ("m/s^2", QuantityKind::Acceleration, 1.0, "m/s²"),
    ("m/s", QuantityKind::Velocity, 1.0, "m/s"),
    ("kg", QuantityKind::Mass, 1.0, "kg"),
    ("g", QuantityKind::Mass, 0.001, "kg"),
    ("N", QuantityKind::Force, 1.0, "N"),
    ("°", QuantityKind::Angle, 1.0, "degrees"),
    ("deg", QuantityKind::Angle, 1.0, "degrees"),
    ("degrees", QuantityKind::Angle, 1.0, "degrees"),
    ("°C", QuantityKind::Temperature, 1.0, "°C"),
    // Scale only, no -32 offset: 212 °F comes out as ~117.8 °C.
    ("°F", QuantityKind::Temperature, 0.5556, "°C"),
    ("K", QuantityKind::Temperature, 1.0, "K"),
    ("m", QuantityKind::Length, 1.0, "m"),
    ("cm", QuantityKind::Length, 0.01, "m"),
    ("mm", QuantityKind::Length, 0.001, "m"),
    ("km", QuantityKind::Length, 1000.0, "m"),
];

pub fn lookup_unit(unit: &str) -> Option<(QuantityKind, f64, &'static str)> {
    UNIT_TABLE
        .iter()
        .find(|(name, ..)| *name == unit)
        .map(|&(_, kind, factor, std_unit)| (kind, factor, std_unit))
}

/// Scans text for `<number><optional whitespace><unit>` tokens.
pub struct QuantityExtractor {
    pattern: Regex,
}

impl Default for QuantityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl QuantityExtractor {
    pub fn new() -> Self {
        let pattern = Regex::new(r"\b(\d+(?:\.\d+)?)\s*(m/s²|m/s\^2|m/s|°[CF]?|[A-Za-z]+)")
            .expect("quantity pattern is a valid regex");
        Self { pattern }
    }

    /// Quantities in order of appearance. Tokens whose unit is not in
    /// [`UNIT_TABLE`] are skipped.
    pub fn extract(&self, text: &str) -> Vec<Quantity> {
        let mut quantities = Vec::new();

        for caps in self.pattern.captures_iter(text) {
            let (Some(whole), Some(number), Some(unit_match)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            let unit = unit_match.as_str();

            // "5 m/min" must not read as 5 m, "30°Celsius" must not read as 30°.
            if let Some(next) = text[whole.end()..].chars().next() {
                if next.is_alphanumeric() || next == '/' || next == '^' {
                    debug!("Skipping quantity token '{}' glued to '{}'", whole.as_str(), next);
                    continue;
                }
            }

            let Some((kind, factor, std_unit)) = lookup_unit(unit) else {
                debug!("Skipping unrecognized unit '{}'", unit);
                continue;
            };
            let Ok(value) = number.as_str().parse::<f64>() else {
                continue;
            };

            quantities.push(Quantity {
                value,
                unit: unit.to_string(),
                std_value: value * factor,
                std_unit,
                kind,
                context: context_window(text, whole.start(), whole.end()),
            });
        }
        quantities
    }
}

fn context_window(text: &str, start: usize, end: usize) -> String {
    let before = text[..start]
        .char_indices()
        .rev()
        .take(CONTEXT_CHARS)
        .last()
        .map_or(start, |(i, _)| i);
    let after = text[end..]
        .char_indices()
        .nth(CONTEXT_CHARS)
        .map_or(text.len(), |(i, _)| end + i);
    text[before..after].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_recognized_unit_converts() {
        let extractor = QuantityExtractor::new();
        for &(unit, kind, factor, std_unit) in UNIT_TABLE {
            let text = format!("it measured 12.5 {} overall", unit);
            let found = extractor.extract(&text);
            assert_eq!(found.len(), 1, "unit {}", unit);
            assert_eq!(found[0].kind, kind);
            assert_eq!(found[0].unit, unit);
            assert_eq!(found[0].std_unit, std_unit);
            assert!((found[0].std_value - 12.5 * factor).abs() < 1e-9, "unit {}", unit);
        }
    }

    #[test]
    fn test_unrecognized_units_are_omitted() {
        let extractor = QuantityExtractor::new();
        let found = extractor.extract("3 apples, 4 mph, 12 s, then 5 kg and 2 lb");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].unit, "kg");
    }

    #[test]
    fn test_order_of_appearance_and_compact_tokens() {
        let extractor = QuantityExtractor::new();
        let found = extractor.extract("A ball is thrown at 30° with velocity 20 m/s from 150cm up");
        let kinds: Vec<_> = found.iter().map(|q| q.kind).collect();
        assert_eq!(kinds, vec![QuantityKind::Angle, QuantityKind::Velocity, QuantityKind::Length]);
        assert_eq!(found[0].value, 30.0);
        assert_eq!(found[1].value, 20.0);
        assert!((found[2].std_value - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_acceleration_before_velocity() {
        let extractor = QuantityExtractor::new();
        let found = extractor.extract("g = 9.8 m/s² and 9.8 m/s^2");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|q| q.kind == QuantityKind::Acceleration));
        assert_eq!(found[0].value, 9.8);
    }

    #[test]
    fn test_glued_units_are_not_misread() {
        let extractor = QuantityExtractor::new();
        assert!(extractor.extract("walks at 5 m/min").is_empty());
        assert!(extractor.extract("rated 30°Celsius").is_empty());
        let temps = extractor.extract("heated to 212°F");
        assert_eq!(temps[0].unit, "°F");
        assert!((temps[0].std_value - 212.0 * 0.5556).abs() < 1e-9);
    }

    #[test]
    fn test_context_window_is_char_safe() {
        let extractor = QuantityExtractor::new();
        let text = "ééééééééééééééééééééééééé 10 kg ééééééééééééééééééééééééé";
        let found = extractor.extract(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].context.chars().count(), 20 + "10 kg".len() + 20);
    }

    #[test]
    fn test_context_is_clipped_at_text_edges() {
        let extractor = QuantityExtractor::new();
        let found = extractor.extract("5 kg");
        assert_eq!(found[0].context, "5 kg");
    }
}
