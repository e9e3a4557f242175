#![allow(dead_code)]

use simlab::parsing::template::TemplateSet;
use simlab::simulation::{EngineError, ObjectHandle, ObjectProps, ParameterConfig, SimulationEngine};
use simlab::types::exercise::Vec2;
use simlab::{ExerciseParser, SessionManager};
use std::fs;
use std::path::{Path, PathBuf};

/// Engine double that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    pub calls: Vec<String>,
    pub parameters: Vec<(String, f64)>,
    pub velocities: Vec<(usize, Vec2)>,
    objects: usize,
}

impl SimulationEngine for RecordingEngine {
    fn reset(&mut self) {
        self.objects = 0;
        self.parameters.clear();
        self.velocities.clear();
        self.calls.push("reset".to_string());
    }

    fn add_parameter(&mut self, name: &str, config: ParameterConfig) {
        self.parameters.push((name.to_string(), config.value));
    }

    fn update_parameter(&mut self, name: &str, value: f64) {
        self.calls.push(format!("update {}={}", name, value));
    }

    fn add_object(&mut self, name: &str, kind: &str, _props: &ObjectProps) -> Result<ObjectHandle, EngineError> {
        if kind != "circle" && kind != "box" {
            return Err(EngineError::UnsupportedObject(kind.to_string()));
        }
        self.calls.push(format!("object {}", name));
        self.objects += 1;
        Ok(ObjectHandle(self.objects - 1))
    }

    fn set_velocity(&mut self, handle: ObjectHandle, velocity: Vec2) -> Result<(), EngineError> {
        self.velocities.push((handle.0, velocity));
        Ok(())
    }

    fn step(&mut self, _dt: f64) -> Result<(), EngineError> {
        Ok(())
    }

    fn run(&mut self) -> Result<(), EngineError> {
        self.calls.push("run".to_string());
        Ok(())
    }
}

pub fn manager_in(results_dir: &Path) -> SessionManager<RecordingEngine> {
    SessionManager::new(
        ExerciseParser::rule_based(TemplateSet::builtin()),
        RecordingEngine::default(),
        results_dir.to_path_buf(),
    )
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write test fixture");
    path
}

pub const HEIGHT_EXERCISE_YAML: &str = r#"
type: projectile_motion
name: Cliff throw
parameters:
  height: { value: 12.25, min: 0, max: 50, step: 0.25, unit: m }
  gravity: 9.81
objects:
  - type: circle
    radius: 0.2
    position: [0, 12.25]
    initial_velocity: 5
targets:
  - id: h_max
    type: numeric
    value: 12.25
    tolerance: 0.1
  - id: label
    type: multiple_choice
    value: 1
hints:
  - id: h1
    target: h_max
    text: Start from the launch height.
  - target: h_max
    text: Vertical speed is zero at the top.
  - id: g1
    text: Sketch the path first.
feedback:
  correct: Spot on.
"#;
