//! Timing records of every operation a run performs.

use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// The kind of operation an event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A request to the model.
    Inference,
    /// A tool invocation.
    ToolInvocation,
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Inference => f.pad("inference"),
            EventKind::ToolInvocation => f.pad("tool"),
        }
    }
}

/// The execution window of one operation attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionEvent {
    /// What kind of operation ran.
    pub kind: EventKind,
    /// The node id, or the round label of the sequential executor.
    pub name: String,
    /// A short diagnostic: the prompt, or the tool name and arguments.
    pub context: String,
    /// When the operation started.
    pub start: Instant,
    /// When the operation finished, successfully or not.
    pub end: Instant,
}

impl ExecutionEvent {
    /// How long the operation took.
    #[inline]
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }

    /// Returns `true` if the two `[start, end)` windows intersect.
    #[inline]
    pub fn overlaps(&self, other: &ExecutionEvent) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// An append-only, thread-safe list of [`ExecutionEvent`]s.
///
/// Clones share the same storage, so executors running nodes on many
/// tasks can all append to the log the caller inspects afterwards.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl EventLog {
    /// Creates an empty log.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn record(&self, event: ExecutionEvent) {
        trace!(
            kind = %event.kind,
            name = %event.name,
            elapsed = ?event.duration(),
            "event recorded"
        );
        self.lock().push(event);
    }

    /// Runs `fut` and appends one event covering its whole duration,
    /// whatever its outcome.
    pub(crate) async fn span<F: Future>(
        &self,
        kind: EventKind,
        name: impl Into<String>,
        context: impl Into<String>,
        fut: F,
    ) -> F::Output {
        let start = Instant::now();
        let output = fut.await;
        self.record(ExecutionEvent {
            kind,
            name: name.into(),
            context: context.into(),
            start,
            end: Instant::now(),
        });
        output
    }

    /// Returns a copy of all events, in the order they were appended.
    pub fn snapshot(&self) -> Vec<ExecutionEvent> {
        self.lock().clone()
    }

    /// Returns the events sorted by their start time.
    pub fn sorted(&self) -> Vec<ExecutionEvent> {
        let mut events = self.snapshot();
        events.sort_by_key(|event| (event.start, event.end));
        events
    }

    /// Finds the first event with the given name.
    pub fn find(&self, name: &str) -> Option<ExecutionEvent> {
        self.lock().iter().find(|event| event.name == name).cloned()
    }

    /// Returns the number of recorded events.
    #[inline]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes every event.
    #[inline]
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Renders the events relative to the earliest start.
    pub fn timeline(&self) -> Timeline {
        let events = self.sorted();
        let Some(origin) = events.first().map(|event| event.start) else {
            return Timeline::default();
        };
        let entries = events
            .into_iter()
            .map(|event| TimelineEntry {
                offset: event.start.saturating_duration_since(origin),
                duration: event.duration(),
                kind: event.kind,
                name: event.name,
                context: event.context,
            })
            .collect();
        Timeline { entries }
    }

    // Appends never leave the list half-written, so a poisoned lock is
    // still safe to use.
    fn lock(&self) -> MutexGuard<'_, Vec<ExecutionEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One row of a [`Timeline`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineEntry {
    /// The kind of the operation.
    pub kind: EventKind,
    /// The node id or round label.
    pub name: String,
    /// The diagnostic context of the operation.
    pub context: String,
    /// Time between the earliest start of the run and this start.
    pub offset: Duration,
    /// How long the operation took.
    pub duration: Duration,
}

impl TimelineEntry {
    /// The offset at which this operation finished.
    #[inline]
    pub fn end(&self) -> Duration {
        self.offset + self.duration
    }
}

/// Events as offset/duration pairs, sorted by start.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// The rows, sorted by offset.
    #[inline]
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Wall-clock time from the first start to the last end.
    pub fn total(&self) -> Duration {
        self.entries
            .iter()
            .map(TimelineEntry::end)
            .max()
            .unwrap_or_default()
    }

    /// Sum of all durations, which exceeds [`total`](Self::total) when
    /// operations overlapped.
    pub fn busy(&self) -> Duration {
        self.entries.iter().map(|entry| entry.duration).sum()
    }
}

impl Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(
                f,
                "{:>8.1}ms +{:>8.1}ms  {:<9} {:<16} {}",
                entry.offset.as_secs_f64() * 1000.0,
                entry.duration.as_secs_f64() * 1000.0,
                entry.kind,
                entry.name,
                entry.context,
            )?;
        }
        write!(f, "total {:.1}ms", self.total().as_secs_f64() * 1000.0)
    }
}
