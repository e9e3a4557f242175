pub mod world;

use crate::types::exercise::{ParameterSpec, SimObject, Vec2};
use thiserror::Error;

pub use world::World2d;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unsupported object type: {0}")]
    UnsupportedObject(String),

    #[error("Object '{object}' has invalid {property} {value}")]
    InvalidProperty {
        object: String,
        property: &'static str,
        value: f64,
    },

    #[error("Unknown object handle {0:?}")]
    UnknownHandle(ObjectHandle),

    #[error("Invalid time step {0}")]
    InvalidTimeStep(f64),

    #[error("Simulation diverged at t = {time:.3}s: body '{body}' left the finite range")]
    Diverged { time: f64, body: String },
}

/// Opaque reference to a body owned by an engine. Only valid until the
/// engine's next `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub usize);

/// Slider description for a tunable engine parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterConfig {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl From<&ParameterSpec> for ParameterConfig {
    fn from(spec: &ParameterSpec) -> Self {
        ParameterConfig {
            value: spec.value,
            min: spec.min,
            max: spec.max,
            step: spec.step,
        }
    }
}

/// Physical properties of a body; unset fields take the engine's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObjectProps {
    pub position: Vec2,
    pub radius: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub mass: Option<f64>,
    pub elasticity: Option<f64>,
    pub friction: Option<f64>,
}

impl From<&SimObject> for ObjectProps {
    fn from(object: &SimObject) -> Self {
        ObjectProps {
            position: object.position,
            radius: object.radius,
            width: object.width,
            height: object.height,
            mass: object.mass,
            elasticity: object.elasticity,
            friction: object.friction,
        }
    }
}

/// What the session manager needs from a 2D physics engine. Handles are
/// only meaningful to the engine that issued them.
pub trait SimulationEngine {
    /// Drops every body and parameter.
    fn reset(&mut self);

    fn add_parameter(&mut self, name: &str, config: ParameterConfig);

    /// Ignored for names that were never added.
    fn update_parameter(&mut self, name: &str, value: f64);

    fn add_object(&mut self, name: &str, kind: &str, props: &ObjectProps) -> Result<ObjectHandle, EngineError>;

    fn set_velocity(&mut self, handle: ObjectHandle, velocity: Vec2) -> Result<(), EngineError>;

    fn step(&mut self, dt: f64) -> Result<(), EngineError>;

    /// Runs to completion with the engine's own time step.
    fn run(&mut self) -> Result<(), EngineError>;
}
