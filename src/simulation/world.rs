//! Headless 2D world backed by Rapier.

use super::{EngineError, ObjectHandle, ObjectProps, ParameterConfig, SimulationEngine};
use crate::config::EngineConfig;
use crate::types::exercise::Vec2;
use rapier2d::dynamics::{
    CCDSolver, CoefficientCombineRule, ImpulseJointSet, IntegrationParameters, IslandManager,
    MultibodyJointSet, RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
};
use rapier2d::geometry::{BroadPhaseMultiSap, ColliderBuilder, ColliderHandle, ColliderSet, NarrowPhase};
use rapier2d::math::{Real, Vector};
use rapier2d::pipeline::PhysicsPipeline;
use std::collections::BTreeMap;
use tracing::{debug, info};

const DEFAULT_RADIUS: f64 = 0.25;
const DEFAULT_SIDE: f64 = 0.5;
const DEFAULT_MASS: f64 = 1.0;
const DEFAULT_ELASTICITY: f64 = 0.5;
const DEFAULT_FRICTION: f64 = 0.7;
/// Below this speed a body counts as still.
const REST_SPEED: f64 = 0.05;
/// How long a body must stay still before it is at rest.
const SETTLE_TIME: f64 = 0.25;
const GROUND_HALF_WIDTH: Real = 10_000.0;
const GROUND_HALF_THICKNESS: Real = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle { radius: f64 },
    Box { width: f64, height: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub name: String,
    pub shape: Shape,
    pub mass: f64,
    pub elasticity: f64,
    pub friction: f64,
    /// Centre position after the last step.
    pub position: Vec2,
    pub velocity: Vec2,
    pub peak_height: f64,
    /// Where and when the body first touched the ground after leaving it.
    pub first_landing: Option<(f64, f64)>,
    handle: RigidBodyHandle,
    collider: ColliderHandle,
    launched: bool,
    still_for: f64,
}

impl Body {
    fn at_rest(&self) -> bool {
        self.still_for >= SETTLE_TIME
    }
}

/// Positions of every body at one instant, in registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub time: f64,
    pub positions: Vec<Vec2>,
}

/// Rapier state plus the fixed ground whose top face is `y = 0`.
struct Physics {
    pipeline: PhysicsPipeline,
    integration_params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    ground: ColliderHandle,
}

impl Physics {
    fn new() -> Self {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // Restitution combines with Max and friction with Multiply, so a body
        // bouncing or sliding on the ground gets exactly its own coefficients.
        let ground_body = bodies.insert(RigidBodyBuilder::fixed().build());
        let ground_collider = ColliderBuilder::cuboid(GROUND_HALF_WIDTH, GROUND_HALF_THICKNESS)
            .translation(Vector::new(0.0, -GROUND_HALF_THICKNESS))
            .friction(1.0)
            .friction_combine_rule(CoefficientCombineRule::Multiply)
            .restitution(0.0)
            .restitution_combine_rule(CoefficientCombineRule::Max)
            .build();
        let ground = colliders.insert_with_parent(ground_collider, ground_body, &mut bodies);

        Self {
            pipeline: PhysicsPipeline::new(),
            integration_params: IntegrationParameters::default(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            ground,
        }
    }

    fn step(&mut self, gravity: &Vector<Real>, dt: Real) {
        self.integration_params.dt = dt;

        self.pipeline.step(
            gravity,
            &self.integration_params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    fn touching_ground(&self, collider: ColliderHandle) -> bool {
        self.narrow_phase
            .contact_pair(self.ground, collider)
            .is_some_and(|pair| pair.has_any_active_contact)
    }
}

/// Circles and boxes falling onto a ground plane at `y = 0`, colliding with
/// each other and the ground.
pub struct World2d {
    config: EngineConfig,
    parameters: BTreeMap<String, ParameterConfig>,
    physics: Physics,
    bodies: Vec<Body>,
    time: f64,
    trajectory: Vec<Frame>,
}

impl World2d {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            parameters: BTreeMap::new(),
            physics: Physics::new(),
            bodies: Vec::new(),
            time: 0.0,
            trajectory: Vec::new(),
        }
    }

    /// A registered `gravity` parameter overrides the configured value.
    pub fn gravity(&self) -> f64 {
        self.parameters
            .get("gravity")
            .map_or(self.config.gravity, |p| p.value)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterConfig> {
        self.parameters.get(name)
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn body(&self, handle: ObjectHandle) -> Option<&Body> {
        self.bodies.get(handle.0)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn trajectory(&self) -> &[Frame] {
        &self.trajectory
    }

    fn record_frame(&mut self) {
        self.trajectory.push(Frame {
            time: self.time,
            positions: self.bodies.iter().map(|b| b.position).collect(),
        });
    }
}

fn positive(name: &str, property: &'static str, value: f64) -> Result<Real, EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(value as Real)
    } else {
        Err(EngineError::InvalidProperty {
            object: name.to_string(),
            property,
            value,
        })
    }
}

impl SimulationEngine for World2d {
    fn reset(&mut self) {
        self.parameters.clear();
        self.physics = Physics::new();
        self.bodies.clear();
        self.trajectory.clear();
        self.time = 0.0;
    }

    fn add_parameter(&mut self, name: &str, config: ParameterConfig) {
        self.parameters.insert(name.to_string(), config);
    }

    fn update_parameter(&mut self, name: &str, value: f64) {
        match self.parameters.get_mut(name) {
            Some(parameter) => parameter.value = value,
            None => debug!("Ignoring update of unregistered parameter '{}'", name),
        }
    }

    fn add_object(&mut self, name: &str, kind: &str, props: &ObjectProps) -> Result<ObjectHandle, EngineError> {
        let shape = match kind {
            "circle" => Shape::Circle {
                radius: props.radius.unwrap_or(DEFAULT_RADIUS),
            },
            "box" => Shape::Box {
                width: props.width.unwrap_or(DEFAULT_SIDE),
                height: props.height.unwrap_or(DEFAULT_SIDE),
            },
            other => return Err(EngineError::UnsupportedObject(other.to_string())),
        };
        let mass = props.mass.unwrap_or(DEFAULT_MASS);
        let elasticity = props.elasticity.unwrap_or(DEFAULT_ELASTICITY);
        let friction = props.friction.unwrap_or(DEFAULT_FRICTION);

        let collider = match shape {
            Shape::Circle { radius } => ColliderBuilder::ball(positive(name, "radius", radius)?),
            Shape::Box { width, height } => ColliderBuilder::cuboid(
                positive(name, "width", width)? / 2.0,
                positive(name, "height", height)? / 2.0,
            ),
        }
        .mass(positive(name, "mass", mass)?)
        .restitution(elasticity.max(0.0) as Real)
        .friction(friction.max(0.0) as Real)
        .build();

        let rigid_body = RigidBodyBuilder::dynamic()
            .translation(Vector::new(props.position.x as Real, props.position.y as Real))
            .ccd_enabled(true)
            .build();
        let physics = &mut self.physics;
        let rigid_body_handle = physics.bodies.insert(rigid_body);
        let collider_handle = physics
            .colliders
            .insert_with_parent(collider, rigid_body_handle, &mut physics.bodies);

        let handle = ObjectHandle(self.bodies.len());
        self.bodies.push(Body {
            name: name.to_string(),
            shape,
            mass,
            elasticity,
            friction,
            position: props.position,
            velocity: Vec2::default(),
            peak_height: props.position.y,
            first_landing: None,
            handle: rigid_body_handle,
            collider: collider_handle,
            launched: false,
            still_for: 0.0,
        });
        Ok(handle)
    }

    fn set_velocity(&mut self, handle: ObjectHandle, velocity: Vec2) -> Result<(), EngineError> {
        let body = self
            .bodies
            .get_mut(handle.0)
            .ok_or(EngineError::UnknownHandle(handle))?;
        let rigid_body = self
            .physics
            .bodies
            .get_mut(body.handle)
            .ok_or(EngineError::UnknownHandle(handle))?;
        rigid_body.set_linvel(Vector::new(velocity.x as Real, velocity.y as Real), true);
        body.velocity = velocity;
        body.still_for = 0.0;
        Ok(())
    }

    fn step(&mut self, dt: f64) -> Result<(), EngineError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(EngineError::InvalidTimeStep(dt));
        }
        let gravity = Vector::new(0.0, -self.gravity() as Real);
        self.physics.step(&gravity, dt as Real);
        let time = self.time + dt;

        for body in &mut self.bodies {
            let Some(rigid_body) = self.physics.bodies.get(body.handle) else {
                continue;
            };
            let translation = rigid_body.translation();
            let linvel = rigid_body.linvel();
            let position = Vec2::new(translation.x as f64, translation.y as f64);
            let velocity = Vec2::new(linvel.x as f64, linvel.y as f64);
            let finite = position.x.is_finite()
                && position.y.is_finite()
                && velocity.x.is_finite()
                && velocity.y.is_finite();
            if !finite {
                return Err(EngineError::Diverged {
                    time,
                    body: body.name.clone(),
                });
            }

            if !self.physics.touching_ground(body.collider) {
                body.launched = true;
            } else if body.launched && body.first_landing.is_none() {
                body.first_landing = Some((position.x, time));
            }

            body.position = position;
            body.velocity = velocity;
            body.peak_height = body.peak_height.max(position.y);
            body.still_for = if velocity.x.hypot(velocity.y) < REST_SPEED {
                body.still_for + dt
            } else {
                0.0
            };
        }

        self.time = time;
        self.record_frame();
        Ok(())
    }

    /// Steps until `max_duration` or until every body has settled.
    fn run(&mut self) -> Result<(), EngineError> {
        let dt = self.config.time_step;
        if !(dt.is_finite() && dt > 0.0) {
            return Err(EngineError::InvalidTimeStep(dt));
        }
        self.trajectory.clear();
        self.record_frame();

        let max_steps = (self.config.max_duration / dt).ceil().max(0.0) as usize;
        for _ in 0..max_steps {
            self.step(dt)?;
            if self.bodies.iter().all(Body::at_rest) {
                break;
            }
        }
        info!(
            "Simulated {:.2}s over {} frames with {} bodies",
            self.time,
            self.trajectory.len(),
            self.bodies.len()
        );
        Ok(())
    }
}
