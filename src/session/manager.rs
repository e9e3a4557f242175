use super::events::{CallbackResult, Event, EventBus, EventKind};
use super::grading::{self, GradeReport, EMPTY_HINT, NO_MORE_HINTS};
use super::results_io::{self, ResultsIoError, ResultsRecord};
use crate::config::Config;
use crate::error::SessionError;
use crate::parsing::exercise_parser::ExerciseParser;
use crate::simulation::{EngineError, ObjectHandle, ObjectProps, ParameterConfig, SimulationEngine, World2d};
use crate::types::exercise::{
    Domain, Exercise, ExerciseDocument, ParameterSpec, ParseMethod, DIRECT_INPUT_SOURCE,
};
use chrono::Local;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Runtime state of the loaded exercise. Replaced wholesale on every load.
#[derive(Debug, Clone)]
pub struct Session {
    exercise: Exercise,
    parameters: BTreeMap<String, ParameterSpec>,
    user_answers: BTreeMap<String, String>,
    hints_shown: BTreeSet<String>,
}

impl Session {
    fn new(exercise: Exercise) -> Self {
        Self {
            parameters: exercise.parameters.clone(),
            exercise,
            user_answers: BTreeMap::new(),
            hints_shown: BTreeSet::new(),
        }
    }

    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    /// Working copy of the parameters, as changed through `update_parameter`.
    pub fn parameters(&self) -> &BTreeMap<String, ParameterSpec> {
        &self.parameters
    }

    pub fn user_answers(&self) -> &BTreeMap<String, String> {
        &self.user_answers
    }

    pub fn hints_shown(&self) -> &BTreeSet<String> {
        &self.hints_shown
    }
}

/// Owns the parser, the engine and the single active session, and tells
/// registered listeners about everything that happens to them.
pub struct SessionManager<E: SimulationEngine> {
    parser: ExerciseParser,
    engine: E,
    results_dir: PathBuf,
    session: Option<Session>,
    events: EventBus,
}

impl SessionManager<World2d> {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ExerciseParser::from_config(config),
            World2d::new(config.engine.clone()),
            config.results_dir.clone(),
        )
    }
}

impl<E: SimulationEngine> SessionManager<E> {
    pub fn new(parser: ExerciseParser, engine: E, results_dir: PathBuf) -> Self {
        Self {
            parser,
            engine,
            results_dir,
            session: None,
            events: EventBus::new(),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn exercise(&self) -> Option<&Exercise> {
        self.session.as_ref().map(|s| &s.exercise)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn parser(&self) -> &ExerciseParser {
        &self.parser
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn register_callback<F>(&mut self, kind: EventKind, callback: F)
    where
        F: FnMut(&Event<'_>) -> CallbackResult + 'static,
    {
        self.events.register(kind, callback);
    }

    /// Loads an exercise from a template file, a text file or literal text.
    ///
    /// On failure the previous session stays active.
    pub fn load(&mut self, source: &str, domain: Option<Domain>) -> Result<&Exercise, SessionError> {
        let exercise = match self.read_exercise(source, domain) {
            Ok(exercise) => exercise,
            Err(message) => return Err(self.fail(SessionError::LoadFailure(message))),
        };
        for target in exercise.dangling_hint_targets() {
            warn!("Hint refers to unknown target '{}'", target);
        }

        if let Err(e) = configure_engine(&mut self.engine, &exercise, &exercise.parameters) {
            self.restore_engine();
            return Err(self.fail(SessionError::LoadFailure(e.to_string())));
        }

        info!(
            "Loaded '{}' ({}, {:?}) with {} parameters, {} objects, {} targets",
            exercise.display_name(),
            exercise.kind,
            exercise.parse_method,
            exercise.parameters.len(),
            exercise.objects.len(),
            exercise.targets.len()
        );
        let session = self.session.insert(Session::new(exercise));
        self.events.notify(&Event::ParseComplete(&session.exercise));
        Ok(&session.exercise)
    }

    /// Puts the engine back in step with the retained session after a load
    /// left it half configured.
    fn restore_engine(&mut self) {
        let Some(session) = self.session.as_ref() else {
            self.engine.reset();
            return;
        };
        if let Err(e) = configure_engine(&mut self.engine, &session.exercise, &session.parameters) {
            warn!("Could not restore the engine for '{}': {}", session.exercise.display_name(), e);
        }
    }

    fn read_exercise(&mut self, source: &str, domain: Option<Domain>) -> Result<Exercise, String> {
        let path = Path::new(source);
        if !path.is_file() {
            if has_structural_extension(path) {
                warn!("'{}' is not a readable file; parsing it as exercise text", source);
            }
            let mut exercise = self.parser.parse(source, domain);
            exercise.source = DIRECT_INPUT_SOURCE.to_string();
            return Ok(exercise);
        }

        let contents = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
        let (document, parse_method) = match lowercase_extension(path).as_deref() {
            Some("yaml") | Some("yml") => (
                ExerciseDocument::from_yaml_str(&contents).map_err(|e| format!("{}: {}", path.display(), e))?,
                ParseMethod::YamlTemplate,
            ),
            Some("json") => (
                ExerciseDocument::from_json_str(&contents).map_err(|e| format!("{}: {}", path.display(), e))?,
                ParseMethod::JsonTemplate,
            ),
            _ => {
                let mut exercise = self.parser.parse(&contents, domain);
                exercise.source = source.to_string();
                return Ok(exercise);
            }
        };

        let mut exercise = document
            .into_exercise()
            .ok_or_else(|| format!("{} contains no exercise", path.display()))?;
        exercise.source = source.to_string();
        exercise.parse_method = parse_method;
        Ok(exercise)
    }

    /// No-op without a session or for a parameter the exercise does not define.
    pub fn update_parameter(&mut self, name: &str, value: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(parameter) = session.parameters.get_mut(name) else {
            debug!("Ignoring update of unknown parameter '{}'", name);
            return;
        };
        parameter.value = value;
        self.engine.update_parameter(name, value);
        self.events.notify(&Event::ParameterChange { name, value });
    }

    /// Puts every working parameter back to the value the exercise was loaded with.
    pub fn reset_parameters(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        for (name, original) in &session.exercise.parameters {
            if let Some(parameter) = session.parameters.get_mut(name) {
                parameter.value = original.value;
            }
            self.engine.update_parameter(name, original.value);
            self.events.notify(&Event::ParameterChange {
                name,
                value: original.value,
            });
        }
    }

    /// Rebuilds the engine from the session (current parameter values, the
    /// exercise's objects and their initial velocities) and runs it.
    pub fn run_simulation(&mut self) -> Result<(), SessionError> {
        let Some(session) = self.session.as_ref() else {
            return Err(self.fail(SessionError::NoActiveSession));
        };

        let outcome = configure_engine(&mut self.engine, &session.exercise, &session.parameters).and_then(
            |handles| {
                for (handle, object) in handles.iter().zip(&session.exercise.objects) {
                    if let Some(velocity) = object.initial_velocity {
                        self.engine.set_velocity(*handle, velocity)?;
                    }
                }
                self.engine.run()
            },
        );

        match outcome {
            Ok(()) => {
                self.events.notify(&Event::SimulationUpdate);
                Ok(())
            }
            Err(e) => Err(self.fail(SessionError::SimulationFailure(e))),
        }
    }

    /// Grades `answers` against every target and records the answers given
    /// for known targets.
    pub fn check_answers(&mut self, answers: &BTreeMap<String, String>) -> Result<GradeReport, SessionError> {
        let Some(session) = self.session.as_mut() else {
            return Err(self.fail(SessionError::NoActiveSession));
        };

        let report = grading::grade(&session.exercise.targets, &session.exercise.feedback, answers);
        for target in &session.exercise.targets {
            if let Some(answer) = answers.get(&target.id) {
                session.user_answers.insert(target.id.clone(), answer.clone());
            }
        }
        for id in answers.keys().filter(|id| !report.results.contains_key(*id)) {
            debug!("Ignoring answer for unknown target '{}'", id);
        }

        self.events.notify(&Event::Feedback(&report));
        Ok(report)
    }

    /// Next unseen hint, for `target` when it has hints of its own.
    pub fn get_hint(&mut self, target: Option<&str>) -> String {
        let Some(session) = self.session.as_mut() else {
            return NO_MORE_HINTS.to_string();
        };
        match grading::select_hint(&session.exercise.hints, &session.hints_shown, target) {
            Some(hint) => {
                session.hints_shown.insert(hint.id.clone());
                if hint.text.is_empty() {
                    EMPTY_HINT.to_string()
                } else {
                    hint.text.clone()
                }
            }
            None => NO_MORE_HINTS.to_string(),
        }
    }

    /// Writes the session's results under the results directory and returns
    /// the written path.
    pub fn save_results(&mut self, filename: Option<&str>) -> Result<PathBuf, SessionError> {
        let Some(session) = self.session.as_ref() else {
            return Err(self.fail(SessionError::NoActiveSession));
        };

        let now = Local::now();
        let path = self.results_dir.join(results_io::results_file_name(filename, &now));
        let record = ResultsRecord {
            timestamp: now.to_rfc3339(),
            exercise: session.exercise.display_name().to_string(),
            parameters: session.parameters.clone(),
            user_answers: session.user_answers.clone(),
            targets: session.exercise.targets.clone(),
        };

        match results_io::save_results_record(&record, &path) {
            Ok(()) => {
                info!("Saved results to {}", path.display());
                Ok(path)
            }
            Err(e) => Err(self.fail(SessionError::SaveFailure {
                path: path.display().to_string(),
                reason: e.to_string(),
            })),
        }
    }

    pub fn load_results(&self, path: &Path) -> Result<ResultsRecord, ResultsIoError> {
        results_io::load_results_record(path)
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        let message = error.to_string();
        warn!("{}", message);
        self.events.notify(&Event::Error(&message));
        error
    }
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn has_structural_extension(path: &Path) -> bool {
    matches!(lowercase_extension(path).as_deref(), Some("yaml" | "yml" | "json"))
}

/// Resets `engine` and registers `parameters` and the exercise's objects.
/// Handles come back in object order.
fn configure_engine<E: SimulationEngine>(
    engine: &mut E,
    exercise: &Exercise,
    parameters: &BTreeMap<String, ParameterSpec>,
) -> Result<Vec<ObjectHandle>, EngineError> {
    engine.reset();
    for (name, spec) in parameters {
        engine.add_parameter(name, ParameterConfig::from(spec));
    }
    exercise
        .objects
        .iter()
        .map(|object| engine.add_object(&object.name, &object.kind, &ObjectProps::from(object)))
        .collect()
}
