use crate::config::LlmConfig;
use crate::error::ParseFailure;
use crate::llm::{LoadedModel, Sampling, TextBackend};
use crate::types::exercise::{
    Domain, Exercise, Feedback, Hint, ParameterSpec, ParseMethod, SimObject, Target, UNKNOWN_EXERCISE_TYPE,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use tracing::{debug, info, warn};

const EXERCISE_PLACEHOLDER: &str = "{exercise_text}";

const PHYSICS_PROMPT: &str = r#"You are a physics simulation expert. Convert the following exercise into simulation parameters.

Exercise:
{exercise_text}

Instructions:
1. Extract all relevant parameters (e.g., mass, velocity, angle, etc.)
2. Determine the type of simulation (e.g., projectile, pendulum, etc.)
3. Provide values with appropriate units
4. Format the output as a JSON object with the following structure:
{
  "simulation_type": "physics/projectile",
  "parameters": {
    "mass": {"value": 1.0, "unit": "kg"},
    "initial_velocity": {"value": 10.0, "unit": "m/s"},
    "angle": {"value": 45.0, "unit": "degrees"},
    "gravity": {"value": 9.8, "unit": "m/s²"}
  },
  "objects": [
    {
      "type": "circle",
      "name": "projectile",
      "radius": 5,
      "initial_position": {"x": 100, "y": 100}
    }
  ]
}

Response:"#;

const CHEMISTRY_PROMPT: &str = r#"You are a chemistry simulation expert. Convert the following exercise into simulation parameters.

Exercise:
{exercise_text}

Instructions:
1. Extract all relevant quantities (e.g., temperature, mass, concentration)
2. Determine the type of simulation (e.g., gas particles, diffusion, reaction)
3. Provide values with appropriate units
4. Represent particles or containers as 2D objects
5. Format the output as a single JSON object with the following structure:
{
  "simulation_type": "chemistry/ideal_gas",
  "parameters": {
    "temperature": {"value": 300.0, "unit": "K"},
    "particle_count": {"value": 50, "unit": ""}
  },
  "objects": [
    {
      "type": "circle",
      "name": "particle",
      "radius": 1,
      "initial_position": {"x": 10, "y": 10}
    }
  ]
}

Response:"#;

const BIOLOGY_PROMPT: &str = r#"You are a biology simulation expert. Convert the following exercise into simulation parameters.

Exercise:
{exercise_text}

Instructions:
1. Extract all relevant quantities (e.g., population size, growth rate, mass)
2. Determine the type of simulation (e.g., population, motion of an organism)
3. Provide values with appropriate units
4. Represent organisms as 2D objects
5. Format the output as a single JSON object with the following structure:
{
  "simulation_type": "biology/population",
  "parameters": {
    "growth_rate": {"value": 0.1, "unit": "1/day"},
    "initial_population": {"value": 20, "unit": ""}
  },
  "objects": [
    {
      "type": "circle",
      "name": "organism",
      "radius": 2,
      "initial_position": {"x": 50, "y": 50}
    }
  ]
}

Response:"#;

/// Prompt templates per domain, each containing an `{exercise_text}` placeholder.
#[derive(Debug, Clone)]
pub struct PromptSet {
    prompts: BTreeMap<Domain, String>,
}

impl Default for PromptSet {
    fn default() -> Self {
        let mut prompts = BTreeMap::new();
        prompts.insert(Domain::Physics, PHYSICS_PROMPT.to_string());
        prompts.insert(Domain::Chemistry, CHEMISTRY_PROMPT.to_string());
        prompts.insert(Domain::Biology, BIOLOGY_PROMPT.to_string());
        Self { prompts }
    }
}

impl PromptSet {
    /// Built-in prompts, overridden by any prompt files named in the config.
    /// An unreadable file keeps the built-in prompt for that domain.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut set = Self::default();
        for (domain, path) in &config.prompts {
            match fs::read_to_string(path) {
                Ok(template) => {
                    if !template.contains(EXERCISE_PLACEHOLDER) {
                        warn!("Prompt {} has no {} placeholder", path.display(), EXERCISE_PLACEHOLDER);
                    }
                    set.prompts.insert(*domain, template);
                }
                Err(e) => warn!("Failed to read {} prompt {}: {}", domain, path.display(), e),
            }
        }
        set
    }

    pub fn render(&self, domain: Domain, exercise_text: &str) -> String {
        let template = self
            .prompts
            .get(&domain)
            .map(String::as_str)
            .unwrap_or(PHYSICS_PROMPT);
        template.replace(EXERCISE_PLACEHOLDER, exercise_text)
    }
}

/// Returns the first balanced `{...}` object in `text`. Braces inside JSON
/// string literals do not count.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Builds an exercise from whatever the model returned. Fields with the wrong
/// shape are dropped; nothing here fails.
pub fn exercise_from_model_output(value: &Value) -> Exercise {
    let kind = value
        .get("simulation_type")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_EXERCISE_TYPE);
    let mut exercise = Exercise::new(kind, ParseMethod::LanguageModel);
    exercise.name = value.get("name").and_then(Value::as_str).map(String::from);

    if let Some(parameters) = value.get("parameters").and_then(Value::as_object) {
        for (name, raw) in parameters {
            match serde_json::from_value::<ParameterSpec>(raw.clone()) {
                Ok(spec) => {
                    exercise.parameters.insert(name.clone(), spec);
                }
                Err(e) => debug!("Dropping model parameter '{}': {}", name, e),
            }
        }
    }

    if let Some(objects) = value.get("objects").and_then(Value::as_array) {
        for raw in objects {
            match serde_json::from_value::<SimObject>(raw.clone()) {
                Ok(mut object) => {
                    if let Some(dimensions) = raw.get("dimensions") {
                        object.width = object.width.or_else(|| dimensions.get("width").and_then(Value::as_f64));
                        object.height = object.height.or_else(|| dimensions.get("height").and_then(Value::as_f64));
                    }
                    exercise.objects.push(object);
                }
                Err(e) => debug!("Dropping model object {}: {}", raw, e),
            }
        }
    }

    exercise.targets = lenient_list::<Target>(value.get("targets"), "target");
    exercise.hints = lenient_list::<Hint>(value.get("hints"), "hint");
    if let Some(feedback) = value.get("feedback") {
        exercise.feedback = serde_json::from_value::<Feedback>(feedback.clone()).unwrap_or_default();
    }

    exercise.normalize();
    exercise
}

fn lenient_list<T: serde::de::DeserializeOwned>(value: Option<&Value>, what: &str) -> Vec<T> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|raw| match serde_json::from_value::<T>(raw.clone()) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!("Dropping model {} {}: {}", what, raw, e);
                None
            }
        })
        .collect()
}

/// Turns exercise text into an exercise through a language model.
///
/// The model is loaded on the first call and reused afterwards.
pub struct LlmParser {
    backend: Box<dyn TextBackend>,
    model: Option<Box<dyn LoadedModel>>,
    prompts: PromptSet,
    sampling: Sampling,
}

impl LlmParser {
    pub fn new(backend: Box<dyn TextBackend>, prompts: PromptSet, sampling: Sampling) -> Self {
        Self {
            backend,
            model: None,
            prompts,
            sampling,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn generate(&mut self, exercise_text: &str, domain: Domain) -> Result<Exercise, ParseFailure> {
        let prompt = self.prompts.render(domain, exercise_text);

        let loaded = match self.model.take() {
            Some(model) => model,
            None => {
                info!("Loading language model");
                self.backend.load()?
            }
        };
        let model = self.model.insert(loaded);
        let response = model.generate(&prompt, &self.sampling)?;

        let json_text = extract_first_json_object(&response).ok_or(ParseFailure::NoJsonFound)?;
        let value: Value = serde_json::from_str(json_text)?;
        Ok(exercise_from_model_output(&value))
    }
}
