use super::{Event, Writable, Writer};

pub struct Logger<'a> {
    /// Whether this [`Logger`] will pass events it receives to the writers
    enabled: bool,

    /// A set of writer sinks that this [`Logger`] will use to write every
    /// Event that it receives.
    writers: Vec<&'a dyn Writer>,
}

impl<'a> Logger<'a> {
    /// Creates a new Logger with no writers and that is enabled.
    pub fn new() -> Logger<'a> {
        Logger {
            enabled: true,
            writers: Vec::new(),
        }
    }

    /// Write an event to every [`Writer`] in this [`Logger`]
    pub fn write(&self, evt: Event) {
        if !self.enabled {
            return;
        }

        for w in &self.writers {
            w.start_event();
            evt.write(*w);
            w.stop_event();
        }
    }

    /// Add a [`Writer`] to this [`Logger`]
    pub fn add_writer(&mut self, w: &'a dyn Writer) {
        self.writers.push(w);
    }

    /// This [`Logger`] will send any event received through `write` to its
    /// [`Writer`]s.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// This [`Logger`] will NOT send events received through `write` to its
    /// [`Writer`]s.
    pub fn disable(&mut self) {
        self.enabled = false;
    }
}

impl<'a> Default for Logger<'a> {
    fn default() -> Self {
        Self::new()
    }
}
