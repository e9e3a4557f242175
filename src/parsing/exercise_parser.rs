use crate::config::Config;
use crate::llm::{CommandBackend, Sampling};
use crate::parsing::classifier::{self, ExerciseType};
use crate::parsing::llm_parser::{LlmParser, PromptSet};
use crate::parsing::quantity::QuantityExtractor;
use crate::parsing::template::{self, TemplateSet};
use crate::types::exercise::{Domain, Exercise, ParameterSpec, ParseMethod};
use crate::types::quantity::Quantity;
use std::collections::BTreeMap;
use tracing::{info, warn};

const CHEMISTRY_TERMS: &[&str] = &[
    "chemical", "reaction", "mole", "molar", "compound", "element", "acid", "base", "ph", "molecule", "atom",
    "bond",
];
const BIOLOGY_TERMS: &[&str] = &[
    "cell", "organism", "species", "dna", "rna", "protein", "ecosystem", "population", "evolution",
    "photosynthesis",
];

/// Circuit breaker for the language-model path. Once it trips it stays
/// tripped for the lifetime of the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmState {
    Untried,
    Available,
    PermanentlyDisabled,
}

/// Single entry point from exercise text to a canonical [`Exercise`].
pub struct ExerciseParser {
    llm: Option<LlmParser>,
    llm_state: LlmState,
    extractor: QuantityExtractor,
    templates: TemplateSet,
}

impl ExerciseParser {
    pub fn new(llm: Option<LlmParser>, templates: TemplateSet) -> Self {
        let llm_state = if llm.is_some() {
            LlmState::Untried
        } else {
            LlmState::PermanentlyDisabled
        };
        Self {
            llm,
            llm_state,
            extractor: QuantityExtractor::new(),
            templates,
        }
    }

    pub fn rule_based(templates: TemplateSet) -> Self {
        Self::new(None, templates)
    }

    pub fn from_config(config: &Config) -> Self {
        let mut templates = TemplateSet::builtin();
        if let Some(dir) = &config.templates_dir {
            templates = templates.with_directory(dir);
        }

        let llm = config.llm.enabled.then(|| {
            LlmParser::new(
                Box::new(CommandBackend::from_config(&config.llm)),
                PromptSet::from_config(&config.llm),
                Sampling::from(&config.llm),
            )
        });
        Self::new(llm, templates)
    }

    pub fn llm_state(&self) -> LlmState {
        self.llm_state
    }

    /// Never fails: any language-model problem trips the breaker and the
    /// rule-based result is returned instead.
    pub fn parse(&mut self, description: &str, domain: Option<Domain>) -> Exercise {
        if self.llm_state != LlmState::PermanentlyDisabled {
            if let Some(llm) = self.llm.as_mut() {
                let domain = domain.unwrap_or_else(|| infer_domain(description));
                match llm.generate(description, domain) {
                    Ok(mut exercise) => {
                        self.llm_state = LlmState::Available;
                        exercise.parse_method = ParseMethod::LanguageModel;
                        exercise.domain = domain;
                        info!("Parsed exercise with the language model as '{}'", exercise.kind);
                        return exercise;
                    }
                    Err(e) => {
                        warn!("Language-model parsing failed, falling back to rule-based parsing: {}", e);
                        self.llm_state = LlmState::PermanentlyDisabled;
                        self.llm = None;
                    }
                }
            }
        }
        self.parse_rule_based(description)
    }

    /// Always tagged as physics: the keyword rules only know physics exercises.
    fn parse_rule_based(&self, description: &str) -> Exercise {
        let normalized = description.to_lowercase();
        let quantities = self.extractor.extract(description);
        let exercise_type = classifier::classify(&normalized, &quantities);

        let mut exercise = Exercise::new(exercise_type.id(), ParseMethod::RuleBased);
        exercise.domain = Domain::Physics;

        let template = match exercise_type {
            ExerciseType::Unknown => None,
            known => self.templates.get(known.id()),
        };
        let exercise = match template {
            Some(template) => template::apply(template, &quantities, exercise),
            None => {
                exercise.parameters = extract_generic_parameters(&quantities);
                exercise
            }
        };
        info!(
            "Rule-based parse: type '{}', {} quantities, {} parameters",
            exercise.kind,
            quantities.len(),
            exercise.parameters.len()
        );
        exercise
    }
}

/// Every quantity becomes a parameter named `<kind>_<n>`, counted over all
/// quantities in order of appearance.
pub fn extract_generic_parameters(quantities: &[Quantity]) -> BTreeMap<String, ParameterSpec> {
    quantities
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let mut spec = ParameterSpec::new(q.std_value).with_unit(q.std_unit);
            spec.description = Some(format!("{} {} from context: {}", q.value, q.unit, q.context.trim()));
            (format!("{}_{}", q.kind, i + 1), spec)
        })
        .collect()
}

/// Keyword guess at the subject area; physics unless chemistry or biology
/// vocabulary shows up.
pub fn infer_domain(text: &str) -> Domain {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let mentions = |terms: &[&str]| {
        words
            .iter()
            .any(|word| terms.iter().any(|term| *word == *term || word.strip_suffix('s') == Some(*term)))
    };

    if mentions(CHEMISTRY_TERMS) {
        Domain::Chemistry
    } else if mentions(BIOLOGY_TERMS) {
        Domain::Biology
    } else {
        Domain::Physics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::llm::{BackendError, LoadedModel, TextBackend};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct FakeBackend {
        responses: Rc<RefCell<Vec<String>>>,
        calls: Rc<Cell<usize>>,
        fail_load: bool,
    }

    struct FakeModel {
        responses: Rc<RefCell<Vec<String>>>,
        calls: Rc<Cell<usize>>,
    }

    impl LoadedModel for FakeModel {
        fn generate(&mut self, _prompt: &str, _sampling: &Sampling) -> Result<String, BackendError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.responses.borrow_mut().remove(0))
        }
    }

    impl TextBackend for FakeBackend {
        fn load(&self) -> Result<Box<dyn LoadedModel>, BackendError> {
            if self.fail_load {
                return Err(BackendError::NotConfigured);
            }
            Ok(Box::new(FakeModel { responses: self.responses.clone(), calls: self.calls.clone() }))
        }
    }

    fn parser_with(responses: &[&str], fail_load: bool) -> (ExerciseParser, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let backend = FakeBackend {
            responses: Rc::new(RefCell::new(responses.iter().map(|s| s.to_string()).collect())),
            calls: calls.clone(),
            fail_load,
        };
        let llm = LlmParser::new(Box::new(backend), PromptSet::default(), Sampling::from(&LlmConfig::default()));
        (ExerciseParser::new(Some(llm), TemplateSet::builtin()), calls)
    }

    #[test]
    fn test_projectile_scenario_rule_based() {
        let mut parser = ExerciseParser::rule_based(TemplateSet::builtin());
        let exercise = parser.parse("A ball is thrown at 30° with velocity 20 m/s", None);
        assert_eq!(exercise.kind, "projectile_motion");
        assert_eq!(exercise.parameters["angle"].value, 30.0);
        assert_eq!(exercise.parameters["initial_velocity"].value, 20.0);
        assert_eq!(exercise.parse_method, ParseMethod::RuleBased);
        assert_eq!(exercise.domain, Domain::Physics);
    }

    #[test]
    fn test_classified_type_without_template_uses_generic_extraction() {
        let mut parser = ExerciseParser::rule_based(TemplateSet::empty());
        let exercise = parser.parse("A ball is thrown at 30° with velocity 20 m/s", None);
        assert_eq!(exercise.kind, "projectile_motion");
        assert_eq!(exercise.parameters["angle_1"].value, 30.0);
        assert_eq!(exercise.parameters["velocity_2"].value, 20.0);
        assert!(exercise.objects.is_empty());
    }

    #[test]
    fn test_unknown_exercise_generic_parameters() {
        let mut parser = ExerciseParser::rule_based(TemplateSet::builtin());
        let exercise = parser.parse("A 1200 kg car pushes with 500 N over 2 km", None);
        assert_eq!(exercise.kind, "unknown");
        assert_eq!(exercise.parameters.len(), 3);
        assert_eq!(exercise.parameters["mass_1"].unit.as_deref(), Some("kg"));
        assert_eq!(exercise.parameters["force_2"].value, 500.0);
        assert_eq!(exercise.parameters["length_3"].value, 2000.0);
        assert!(exercise.parameters["mass_1"].description.as_deref().unwrap().starts_with("1200 kg from context:"));
    }

    #[test]
    fn test_llm_success_tags_method_and_domain() {
        let (mut parser, _) = parser_with(&[r#"{"simulation_type": "chemistry/gas", "parameters": {"t": 300}}"#], false);
        let exercise = parser.parse("A chemical reaction heats a gas", None);
        assert_eq!(exercise.parse_method, ParseMethod::LanguageModel);
        assert_eq!(exercise.domain, Domain::Chemistry);
        assert_eq!(exercise.parameters["t"].value, 300.0);
        assert_eq!(parser.llm_state(), LlmState::Available);
    }

    #[test]
    fn test_explicit_domain_wins_over_inference() {
        let (mut parser, _) = parser_with(&[r#"{"simulation_type": "x"}"#], false);
        let exercise = parser.parse("A chemical reaction", Some(Domain::Biology));
        assert_eq!(exercise.domain, Domain::Biology);
    }

    #[test]
    fn test_circuit_breaker_trips_once_and_stays_tripped() {
        let (mut parser, calls) = parser_with(&["no json at all", r#"{"simulation_type": "never"}"#], false);
        assert_eq!(parser.llm_state(), LlmState::Untried);

        let first = parser.parse("A ball is thrown at 30° with velocity 20 m/s", None);
        assert_eq!(first.parse_method, ParseMethod::RuleBased);
        assert_eq!(first.kind, "projectile_motion");
        assert_eq!(parser.llm_state(), LlmState::PermanentlyDisabled);

        let second = parser.parse("A ball is thrown at 45° with velocity 10 m/s", None);
        assert_eq!(second.parse_method, ParseMethod::RuleBased);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_backend_load_failure_falls_back() {
        let (mut parser, calls) = parser_with(&[], true);
        let exercise = parser.parse("A spring is compressed by 5 cm", None);
        assert_eq!(exercise.kind, "spring_mass");
        assert_eq!(exercise.parse_method, ParseMethod::RuleBased);
        assert_eq!(parser.llm_state(), LlmState::PermanentlyDisabled);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_rule_based_parser_starts_disabled() {
        let parser = ExerciseParser::rule_based(TemplateSet::builtin());
        assert_eq!(parser.llm_state(), LlmState::PermanentlyDisabled);
    }

    #[test]
    fn test_infer_domain() {
        assert_eq!(infer_domain("Balance the chemical equation"), Domain::Chemistry);
        assert_eq!(infer_domain("Two atoms share a bond"), Domain::Chemistry);
        assert_eq!(infer_domain("How many cells are in the organism?"), Domain::Biology);
        assert_eq!(infer_domain("A ball is thrown at a graph of phase"), Domain::Physics);
        assert_eq!(infer_domain(""), Domain::Physics);
    }
}
