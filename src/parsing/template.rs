use crate::types::exercise::{Exercise, Feedback, Hint, ParameterSpec, SimObject, Target};
use crate::types::quantity::{Quantity, QuantityKind};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("projectile_motion.yaml", include_str!("../../templates/projectile_motion.yaml")),
    ("free_fall.yaml", include_str!("../../templates/free_fall.yaml")),
    ("inclined_plane.yaml", include_str!("../../templates/inclined_plane.yaml")),
    ("spring_mass.yaml", include_str!("../../templates/spring_mass.yaml")),
];

/// How a template parameter gets its value: a fixed `value`, or the first
/// extracted quantity of kind `quantity`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct TemplateParameter {
    pub value: Option<f64>,
    pub quantity: Option<QuantityKind>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Template {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, TemplateParameter>,
    #[serde(default)]
    pub objects: Vec<SimObject>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub hints: Vec<Hint>,
    #[serde(default)]
    pub feedback: Option<Feedback>,
}

/// Binds a template's parameters to extracted quantities and copies its
/// objects, targets and hints into `partial`.
///
/// A quantity-bound parameter with no matching quantity is left out entirely;
/// it is never defaulted to zero.
pub fn apply(template: &Template, quantities: &[Quantity], mut partial: Exercise) -> Exercise {
    for (param_name, param_config) in &template.parameters {
        let bound = if let Some(value) = param_config.value {
            Some((value, None))
        } else if let Some(kind) = param_config.quantity {
            quantities
                .iter()
                .find(|q| q.kind == kind)
                .map(|q| (q.std_value, Some(q.std_unit)))
        } else {
            None
        };

        let Some((value, std_unit)) = bound else {
            debug!("Template '{}' leaves parameter '{}' unset", template.id, param_name);
            continue;
        };

        partial.parameters.insert(
            param_name.clone(),
            ParameterSpec {
                unit: param_config.unit.clone().or_else(|| std_unit.map(String::from)),
                description: param_config.description.clone(),
                ..ParameterSpec::bounded(value, param_config.min, param_config.max, param_config.step)
            },
        );
    }

    partial.objects = template.objects.clone();
    partial.targets = template.targets.clone();
    partial.hints = template.hints.clone();
    if template.name.is_some() {
        partial.name = template.name.clone();
    }
    if let Some(feedback) = &template.feedback {
        partial.feedback = feedback.clone();
    }
    partial.normalize();
    partial
}

/// Templates keyed by exercise type id.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: HashMap<String, Template>,
}

impl TemplateSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The templates shipped with the crate.
    pub fn builtin() -> Self {
        let mut set = Self::empty();
        for (file_name, contents) in BUILTIN_TEMPLATES {
            match serde_yaml::from_str::<Template>(contents) {
                Ok(template) => set.insert(template),
                Err(e) => warn!("Built-in template {} failed to parse: {}", file_name, e),
            }
        }
        set
    }

    /// Overlays every `*.yaml`/`*.yml` file in `dir`. Unreadable files and
    /// documents without an `id` are skipped with a warning.
    pub fn with_directory(mut self, dir: &Path) -> Self {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read templates directory {}: {}", dir.display(), e);
                return self;
            }
        };

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"))
            })
            .collect();
        paths.sort();

        for path in paths {
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|contents| serde_yaml::from_str::<Template>(&contents).map_err(|e| e.to_string()));
            match parsed {
                Ok(template) if !template.id.trim().is_empty() => {
                    info!("Loaded template '{}' from {}", template.id, path.display());
                    self.insert(template);
                }
                Ok(_) => warn!("Template {} has an empty id, skipping", path.display()),
                Err(e) => warn!("Skipping template {}: {}", path.display(), e),
            }
        }
        self
    }

    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::quantity::QuantityExtractor;
    use crate::types::exercise::ParseMethod;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_templates_all_parse() {
        let set = TemplateSet::builtin();
        assert_eq!(set.len(), BUILTIN_TEMPLATES.len());
        for id in ["projectile_motion", "free_fall", "inclined_plane", "spring_mass"] {
            let template = set.get(id).unwrap();
            assert!(!template.objects.is_empty(), "{}", id);
            assert!(!template.targets.is_empty(), "{}", id);
        }
    }

    #[test]
    fn test_builtin_hints_reference_existing_targets() {
        let set = TemplateSet::builtin();
        for id in ["projectile_motion", "free_fall", "inclined_plane", "spring_mass"] {
            let exercise = apply(set.get(id).unwrap(), &[], Exercise::new(id, ParseMethod::RuleBased));
            assert!(exercise.dangling_hint_targets().is_empty(), "{}", id);
        }
    }

    #[test]
    fn test_apply_binds_first_quantity_of_each_kind() {
        let set = TemplateSet::builtin();
        let quantities = QuantityExtractor::new().extract("thrown at 30° with 20 m/s, then again at 45° with 5 m/s");
        let exercise = apply(
            set.get("projectile_motion").unwrap(),
            &quantities,
            Exercise::new("projectile_motion", ParseMethod::RuleBased),
        );
        assert_eq!(exercise.parameters["angle"].value, 30.0);
        assert_eq!(exercise.parameters["angle"].max, 90.0);
        assert_eq!(exercise.parameters["initial_velocity"].value, 20.0);
        assert_eq!(exercise.parameters["gravity"].value, 9.81);
        assert_eq!(exercise.name.as_deref(), Some("Projectile motion"));
        assert_eq!(exercise.objects[0].name, "projectile");
    }

    #[test]
    fn test_missing_quantity_leaves_parameter_unset() {
        let set = TemplateSet::builtin();
        let quantities = QuantityExtractor::new().extract("dropped with g = 9.8 m/s²");
        let exercise = apply(
            set.get("free_fall").unwrap(),
            &quantities,
            Exercise::new("free_fall", ParseMethod::RuleBased),
        );
        assert_eq!(exercise.parameters["gravity"].value, 9.8);
        assert!(!exercise.parameters.contains_key("height"));
        assert!(!exercise.parameters.contains_key("mass"));
    }

    #[test]
    fn test_template_bounds_widen_to_bound_value() {
        let set = TemplateSet::builtin();
        let quantities = QuantityExtractor::new().extract("A stone is dropped from 250 m, g = 9.8 m/s²");
        let exercise = apply(
            set.get("free_fall").unwrap(),
            &quantities,
            Exercise::new("free_fall", ParseMethod::RuleBased),
        );
        let height = &exercise.parameters["height"];
        assert_eq!(height.value, 250.0);
        assert_eq!((height.min, height.max, height.step), (0.0, 250.0, 0.5));
        assert_eq!(exercise.parameters["gravity"].max, 25.0);
    }

    #[test]
    fn test_unit_falls_back_to_quantity_standard_unit() {
        let mut template = Template {
            id: "custom".into(),
            name: None,
            parameters: BTreeMap::new(),
            objects: Vec::new(),
            targets: Vec::new(),
            hints: Vec::new(),
            feedback: None,
        };
        template.parameters.insert(
            "distance".into(),
            TemplateParameter { quantity: Some(QuantityKind::Length), ..Default::default() },
        );
        let quantities = QuantityExtractor::new().extract("runs 3 km");
        let exercise = apply(&template, &quantities, Exercise::default());
        assert_eq!(exercise.parameters["distance"].value, 3000.0);
        assert_eq!(exercise.parameters["distance"].unit.as_deref(), Some("m"));
        assert_eq!(exercise.parameters["distance"].max, 6000.0);
    }

    #[test]
    fn test_directory_overlay() {
        let dir = tempdir().unwrap();
        let mut file = File::create(dir.path().join("free_fall.yaml")).unwrap();
        writeln!(file, "id: free_fall\nname: Custom fall\nparameters:\n  gravity:\n    value: 1.62").unwrap();
        let mut broken = File::create(dir.path().join("broken.yml")).unwrap();
        writeln!(broken, "id: [unclosed").unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();

        let set = TemplateSet::builtin().with_directory(dir.path());
        assert_eq!(set.len(), BUILTIN_TEMPLATES.len());
        assert_eq!(set.get("free_fall").unwrap().name.as_deref(), Some("Custom fall"));
    }

    #[test]
    fn test_missing_directory_keeps_existing_templates() {
        let set = TemplateSet::builtin().with_directory(Path::new("/no/such/templates"));
        assert_eq!(set.len(), BUILTIN_TEMPLATES.len());
    }
}
