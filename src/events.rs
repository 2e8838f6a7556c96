//! Event log port
//!
//! Components that record what they did take a `&dyn EventLog` rather than
//! reaching for a global logger. The binary wires [`TracingLog`] in, which
//! turns each event into a `tracing` record; the subscriber decides where it
//! ends up (stderr, the log file, or both).

/// Something that accepts a line describing an event
pub trait EventLog {
    fn append(&self, event: &str);
}

/// Forwards events to `tracing` at INFO level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn append(&self, event: &str) {
        tracing::info!(target: "gas_network::events", "{event}");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;

    use super::EventLog;

    /// Keeps every appended event for later assertions
    #[derive(Debug, Default)]
    pub struct RecordingLog {
        events: RefCell<Vec<String>>,
    }

    impl RecordingLog {
        pub fn events(&self) -> Vec<String> {
            self.events.borrow().clone()
        }
    }

    impl EventLog for RecordingLog {
        fn append(&self, event: &str) {
            self.events.borrow_mut().push(event.to_string());
        }
    }
}
