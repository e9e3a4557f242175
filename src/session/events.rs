use super::grading::GradeReport;
use crate::types::exercise::Exercise;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    ParameterChange,
    SimulationUpdate,
    Feedback,
    ParseComplete,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::ParameterChange,
        EventKind::SimulationUpdate,
        EventKind::Feedback,
        EventKind::ParseComplete,
        EventKind::Error,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ParameterChange => "on_parameter_change",
            EventKind::SimulationUpdate => "on_simulation_update",
            EventKind::Feedback => "on_feedback",
            EventKind::ParseComplete => "on_parse_complete",
            EventKind::Error => "on_error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    ParameterChange { name: &'a str, value: f64 },
    SimulationUpdate,
    Feedback(&'a GradeReport),
    ParseComplete(&'a Exercise),
    Error(&'a str),
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ParameterChange { .. } => EventKind::ParameterChange,
            Event::SimulationUpdate => EventKind::SimulationUpdate,
            Event::Feedback(_) => EventKind::Feedback,
            Event::ParseComplete(_) => EventKind::ParseComplete,
            Event::Error(_) => EventKind::Error,
        }
    }
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ParameterChange { name, value } => write!(f, "{}: {} = {}", self.kind(), name, value),
            Event::SimulationUpdate => write!(f, "{}", self.kind()),
            Event::Feedback(report) => write!(f, "{}: {}", self.kind(), report.overall),
            Event::ParseComplete(exercise) => {
                write!(f, "{}: {} ({})", self.kind(), exercise.display_name(), exercise.kind)
            }
            Event::Error(message) => write!(f, "{}: {}", self.kind(), message),
        }
    }
}

pub type CallbackResult = Result<(), Box<dyn std::error::Error>>;
pub type Callback = Box<dyn FnMut(&Event<'_>) -> CallbackResult>;

/// Callbacks keyed by event kind, invoked in registration order.
#[derive(Default)]
pub struct EventBus {
    callbacks: BTreeMap<EventKind, Vec<Callback>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: EventKind, callback: F)
    where
        F: FnMut(&Event<'_>) -> CallbackResult + 'static,
    {
        self.callbacks.entry(kind).or_default().push(Box::new(callback));
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.callbacks.get(&kind).map_or(0, Vec::len)
    }

    /// Delivers `event` to every callback registered for its kind. A callback
    /// that errors or panics is logged and the remaining ones still run.
    /// Returns how many callbacks failed.
    pub fn notify(&mut self, event: &Event<'_>) -> usize {
        let kind = event.kind();
        let Some(callbacks) = self.callbacks.get_mut(&kind) else {
            return 0;
        };

        let mut failures = 0;
        for callback in callbacks.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!("Error in {} callback: {}", kind, e);
                }
                Err(payload) => {
                    failures += 1;
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!("{} callback panicked: {}", kind, message);
                }
            }
        }
        failures
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<&str, usize> = self
            .callbacks
            .iter()
            .map(|(kind, callbacks)| (kind.name(), callbacks.len()))
            .collect();
        f.debug_struct("EventBus").field("callbacks", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_callbacks_run_in_registration_order_per_kind() {
        let mut bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let log = log.clone();
            bus.register(EventKind::Error, move |event| {
                if let Event::Error(message) = event {
                    log.borrow_mut().push(format!("{}: {}", tag, message));
                }
                Ok(())
            });
        }
        let other = log.clone();
        bus.register(EventKind::SimulationUpdate, move |_| {
            other.borrow_mut().push("update".to_string());
            Ok(())
        });

        assert_eq!(bus.notify(&Event::Error("boom")), 0);
        assert_eq!(*log.borrow(), vec!["first: boom", "second: boom"]);
        assert_eq!(bus.listener_count(EventKind::Error), 2);
        assert_eq!(bus.listener_count(EventKind::Feedback), 0);
    }

    #[test]
    fn test_failing_callbacks_are_isolated() {
        let mut bus = EventBus::new();
        let reached = Rc::new(RefCell::new(0));

        bus.register(EventKind::ParameterChange, |_| Err("callback refused".into()));
        bus.register(EventKind::ParameterChange, |_| panic!("callback exploded"));
        let counter = reached.clone();
        bus.register(EventKind::ParameterChange, move |event| {
            if let Event::ParameterChange { name, value } = event {
                assert_eq!(*name, "angle");
                assert_eq!(*value, 45.0);
            }
            *counter.borrow_mut() += 1;
            Ok(())
        });

        let failures = bus.notify(&Event::ParameterChange { name: "angle", value: 45.0 });
        assert_eq!(failures, 2);
        assert_eq!(*reached.borrow(), 1);
    }

    #[test]
    fn test_notify_without_listeners() {
        let mut bus = EventBus::new();
        assert_eq!(bus.notify(&Event::SimulationUpdate), 0);
    }

    #[test]
    fn test_event_display() {
        let event = Event::ParameterChange { name: "angle", value: 45.0 };
        assert_eq!(event.to_string(), "on_parameter_change: angle = 45");
        assert_eq!(Event::Error("bad input").to_string(), "on_error: bad input");
        assert_eq!(Event::SimulationUpdate.to_string(), "on_simulation_update");
    }

    #[test]
    fn test_kind_names() {
        let names: Vec<_> = EventKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(
            names,
            vec!["on_parameter_change", "on_simulation_update", "on_feedback", "on_parse_complete", "on_error"]
        );
    }
}
