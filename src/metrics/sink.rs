use super::MetricsSink;
use crate::error::Result;
use crate::tags::TagSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Forwards measurements to whatever global `metrics` recorder is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderSink;

impl RecorderSink {
    pub fn new() -> Self {
        Self
    }
}

fn labels(tags: &TagSet) -> Vec<(String, String)> {
    tags.iter()
        .map(|t| (t.key.clone(), t.value.clone()))
        .collect()
}

impl MetricsSink for RecorderSink {
    fn record_timer(&self, name: &str, tags: &TagSet, duration: Duration) -> Result<()> {
        let labels = labels(tags);
        ::metrics::histogram!(name.to_owned(), &labels).record(duration.as_secs_f64());
        Ok(())
    }

    fn increment_counter(&self, name: &str, tags: &TagSet) -> Result<()> {
        let labels = labels(tags);
        ::metrics::counter!(name.to_owned(), &labels).increment(1);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementKind {
    Timer(Duration),
    Counter,
}

#[derive(Debug, Clone)]
pub struct RecordedMeasurement {
    pub name: String,
    pub tags: TagSet,
    pub kind: MeasurementKind,
}

/// Keeps every measurement in memory, in arrival order.
#[derive(Debug, Default)]
pub struct InMemorySink {
    measurements: Mutex<Vec<RecordedMeasurement>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn measurements(&self) -> Vec<RecordedMeasurement> {
        self.measurements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn timers(&self, name: &str) -> Vec<RecordedMeasurement> {
        self.filter(name, |kind| matches!(kind, MeasurementKind::Timer(_)))
    }

    pub fn counters(&self, name: &str) -> Vec<RecordedMeasurement> {
        self.filter(name, |kind| matches!(kind, MeasurementKind::Counter))
    }

    pub fn clear(&self) {
        self.measurements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn filter(&self, name: &str, kind: impl Fn(&MeasurementKind) -> bool) -> Vec<RecordedMeasurement> {
        self.measurements()
            .into_iter()
            .filter(|m| m.name == name && kind(&m.kind))
            .collect()
    }

    fn push(&self, measurement: RecordedMeasurement) {
        self.measurements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(measurement);
    }
}

impl MetricsSink for InMemorySink {
    fn record_timer(&self, name: &str, tags: &TagSet, duration: Duration) -> Result<()> {
        self.push(RecordedMeasurement {
            name: name.to_string(),
            tags: tags.clone(),
            kind: MeasurementKind::Timer(duration),
        });
        Ok(())
    }

    fn increment_counter(&self, name: &str, tags: &TagSet) -> Result<()> {
        self.push(RecordedMeasurement {
            name: name.to_string(),
            tags: tags.clone(),
            kind: MeasurementKind::Counter,
        });
        Ok(())
    }
}
