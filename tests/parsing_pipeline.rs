mod common;

use common::write_file;
use simlab::config::{load_config_from_file, Config};
use simlab::parsing::exercise_parser::LlmState;
use simlab::parsing::quantity::QuantityExtractor;
use simlab::types::exercise::{ParseMethod, UNKNOWN_EXERCISE_TYPE};
use simlab::types::quantity::QuantityKind;
use simlab::ExerciseParser;
use tempfile::tempdir;

#[test]
fn projectile_sentence_becomes_rule_based_exercise() {
    let mut parser = ExerciseParser::from_config(&Config::default());
    let exercise = parser.parse("A ball is thrown at 30° with velocity 20 m/s", None);

    assert_eq!(exercise.kind, "projectile_motion");
    assert_eq!(exercise.parameters["angle"].value, 30.0);
    assert_eq!(exercise.parameters["initial_velocity"].value, 20.0);
    assert_eq!(exercise.parse_method, ParseMethod::RuleBased);
    assert_eq!(exercise.targets.len(), 2);
}

#[test]
fn parsed_value_outside_template_bounds_stays_reachable() {
    let mut parser = ExerciseParser::from_config(&Config::default());
    let exercise = parser.parse("A stone is dropped from 250 m, g = 9.8 m/s²", None);

    assert_eq!(exercise.kind, "free_fall");
    let height = &exercise.parameters["height"];
    assert_eq!(height.value, 250.0);
    assert!(height.min <= height.value && height.value <= height.max);
    assert_eq!(height.max, 250.0);
}

#[test]
fn unreachable_model_command_trips_the_breaker() {
    let mut config = Config::default();
    config.llm.enabled = true;
    config.llm.command = vec!["simlab-test-no-such-model-runner".to_string()];
    let mut parser = ExerciseParser::from_config(&config);
    assert_eq!(parser.llm_state(), LlmState::Untried);

    let exercise = parser.parse("A chemical reaction releases 30 kg of gas", None);
    assert_eq!(exercise.parse_method, ParseMethod::RuleBased);
    assert_eq!(exercise.kind, UNKNOWN_EXERCISE_TYPE);
    assert_eq!(exercise.parameters["mass_1"].value, 30.0);
    assert_eq!(parser.llm_state(), LlmState::PermanentlyDisabled);
}

#[test]
fn config_templates_dir_overrides_builtin_template() {
    let dir = tempdir().unwrap();
    let templates = dir.path().join("templates");
    std::fs::create_dir(&templates).unwrap();
    write_file(
        &templates,
        "spring_mass.yaml",
        "id: spring_mass\nname: Lab spring\nparameters:\n  stretch:\n    quantity: length\nobjects:\n  - type: box\n",
    );
    let config_path = write_file(
        dir.path(),
        "config.toml",
        &format!("templates_dir = {:?}\n", templates.to_str().unwrap()),
    );

    let config = load_config_from_file(config_path.to_str().unwrap()).unwrap();
    let mut parser = ExerciseParser::from_config(&config);
    let exercise = parser.parse("A spring is stretched by 10 cm", None);
    assert_eq!(exercise.name.as_deref(), Some("Lab spring"));
    assert!((exercise.parameters["stretch"].value - 0.1).abs() < 1e-12);
    assert_eq!(exercise.objects[0].name, "obj_0");
}

#[test]
fn extractor_reports_kinds_in_order() {
    let found = QuantityExtractor::new().extract("Heat 2 kg of water from 20°C by pushing with 5 N over 3 km");
    let kinds: Vec<_> = found.iter().map(|q| q.kind).collect();
    assert_eq!(
        kinds,
        vec![QuantityKind::Mass, QuantityKind::Temperature, QuantityKind::Force, QuantityKind::Length]
    );
}
