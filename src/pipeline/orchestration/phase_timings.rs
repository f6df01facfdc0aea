use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};

/// Lifecycle of one `extract_all` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationPhase {
    Idle,
    Running,
    Collecting,
    Aggregating,
    Done,
}

impl OrchestrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestrationPhase::Idle => "idle",
            OrchestrationPhase::Running => "running",
            OrchestrationPhase::Collecting => "collecting",
            OrchestrationPhase::Aggregating => "aggregating",
            OrchestrationPhase::Done => "done",
        }
    }

    /// The phase that follows this one.
    pub fn next(&self) -> Self {
        match self {
            OrchestrationPhase::Idle => OrchestrationPhase::Running,
            OrchestrationPhase::Running => OrchestrationPhase::Collecting,
            OrchestrationPhase::Collecting => OrchestrationPhase::Aggregating,
            OrchestrationPhase::Aggregating | OrchestrationPhase::Done => OrchestrationPhase::Done,
        }
    }
}

impl std::fmt::Display for OrchestrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks time spent per phase and per extractor
#[derive(Debug, Clone, Default)]
pub struct PhaseTimings {
    phase_durations: IndexMap<OrchestrationPhase, Duration>,
    /// Wall time of each extractor task, in registry order
    extractor_durations: IndexMap<String, Duration>,
    current_phase_starts: IndexMap<OrchestrationPhase, Instant>,
}

impl PhaseTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_phase(&mut self, phase: OrchestrationPhase) {
        self.current_phase_starts.insert(phase, Instant::now());
    }

    /// Closes a phase opened with `entry_phase`. Durations accumulate if the
    /// phase is entered more than once.
    pub fn exit_phase(&mut self, phase: OrchestrationPhase) {
        if let Some(started) = self.current_phase_starts.shift_remove(&phase) {
            *self.phase_durations.entry(phase).or_default() += started.elapsed();
        }
    }

    pub fn record_extractor(&mut self, name: impl Into<String>, duration: Duration) {
        self.extractor_durations.insert(name.into(), duration);
    }

    pub fn get_phase_duration(&self, phase: &OrchestrationPhase) -> Duration {
        self.phase_durations.get(phase).copied().unwrap_or_default()
    }

    pub fn get_extractor_duration(&self, name: &str) -> Option<Duration> {
        self.extractor_durations.get(name).copied()
    }

    pub fn get_all_phase_durations(&self) -> &IndexMap<OrchestrationPhase, Duration> {
        &self.phase_durations
    }

    pub fn total(&self) -> Duration {
        self.phase_durations.values().sum()
    }
}

struct Micros<'a, K>(&'a IndexMap<K, Duration>);

impl<K: Serialize> Serialize for Micros<'_, K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, duration) in self.0 {
            map.serialize_entry(key, &(duration.as_micros() as u64))?;
        }
        map.end()
    }
}

// Durations are reported in microseconds, matching the log lines.
impl Serialize for PhaseTimings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PhaseTimings", 2)?;
        state.serialize_field("phases_us", &Micros(&self.phase_durations))?;
        state.serialize_field("extractors_us", &Micros(&self.extractor_durations))?;
        state.end()
    }
}
