pub mod events;
pub mod grading;
pub mod manager;
pub mod results_io;

pub use events::{Event, EventBus, EventKind};
pub use grading::{GradeReport, TargetResult};
pub use manager::{Session, SessionManager};
