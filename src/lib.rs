pub mod config;
pub mod error;
pub mod gui;
pub mod llm;
pub mod parsing;
pub mod session;
pub mod simulation;
pub mod types {
    pub mod exercise;
    pub mod quantity;
}

pub use config::Config;
pub use parsing::ExerciseParser;
pub use session::SessionManager;
pub use types::exercise::Exercise;
