pub mod classifier;
pub mod exercise_parser;
pub mod llm_parser;
pub mod quantity;
pub mod template;

pub use exercise_parser::ExerciseParser;
