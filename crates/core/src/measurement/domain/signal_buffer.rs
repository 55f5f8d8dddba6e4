use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::measurement::error::MeasurementError;

/// Slack for window boundaries built from float frame timestamps.
const TIMESTAMP_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalEntry {
    pub timestamp_sec: f64,
    pub ppg_value: Option<f64>,
    pub admitted: bool,
}

/// Admitted samples of a window, as parallel arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignalWindow {
    pub timestamps: Vec<f64>,
    pub values: Vec<f64>,
}

impl SignalWindow {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Time between the first and last admitted sample.
    pub fn span_sec(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}

/// Every frame seen while running is recorded, admitted or not, so quality
/// ratios work over any trailing window. Only admitted entries carry signal.
#[derive(Clone, Debug)]
pub struct SignalBuffer {
    entries: VecDeque<SignalEntry>,
    retention_sec: f64,
    bad_signal_sec: f64,
}

impl SignalBuffer {
    /// `retention_sec` bounds the span between the oldest and newest entry.
    pub fn new(retention_sec: f64) -> Self {
        Self {
            entries: VecDeque::new(),
            retention_sec,
            bad_signal_sec: 0.0,
        }
    }

    pub fn retention_sec(&self) -> f64 {
        self.retention_sec
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.entries.back().map(|e| e.timestamp_sec)
    }

    pub fn entries(&self) -> impl Iterator<Item = &SignalEntry> {
        self.entries.iter()
    }

    /// Appends one frame, evicting the oldest entries past the retention
    /// span. Non-admitted frames add their frame interval to the
    /// bad-signal counter.
    pub fn push(&mut self, entry: SignalEntry) -> Result<(), MeasurementError> {
        if let Some(last) = self.last_timestamp() {
            if !(entry.timestamp_sec > last) {
                return Err(MeasurementError::NonMonotonicTimestamp {
                    last,
                    got: entry.timestamp_sec,
                });
            }
            if !entry.admitted {
                self.bad_signal_sec += entry.timestamp_sec - last;
            }
        }

        let entry = SignalEntry {
            ppg_value: entry.ppg_value.filter(|_| entry.admitted),
            ..entry
        };
        self.entries.push_back(entry);

        while let (Some(front), Some(back)) = (self.entries.front(), self.entries.back()) {
            if back.timestamp_sec - front.timestamp_sec <= self.retention_sec {
                break;
            }
            self.entries.pop_front();
        }
        Ok(())
    }

    /// Seconds of non-admitted signal since the session started.
    /// Never decreases, eviction notwithstanding.
    pub fn bad_signal_sec(&self) -> f64 {
        self.bad_signal_sec
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bad_signal_sec = 0.0;
    }

    pub fn set_retention(&mut self, retention_sec: f64) {
        self.retention_sec = retention_sec;
    }

    /// Entries with `timestamp >= last - period_sec`, so a full window
    /// spans exactly `period_sec`.
    pub fn trailing(&self, period_sec: f64) -> impl Iterator<Item = &SignalEntry> {
        let cutoff = self
            .last_timestamp()
            .map_or(f64::INFINITY, |t| t - period_sec - TIMESTAMP_EPSILON);
        let start = self.entries.partition_point(|e| e.timestamp_sec < cutoff);
        self.entries.range(start..)
    }

    /// Admitted samples in the trailing window.
    pub fn window(&self, period_sec: f64) -> SignalWindow {
        collect_admitted(self.trailing(period_sec))
    }

    /// Admitted samples across the whole retained span.
    pub fn full_window(&self) -> SignalWindow {
        collect_admitted(self.entries.iter())
    }

    /// Admitted over attempted frames in the trailing window; `None` when
    /// the window is empty.
    pub fn admitted_ratio(&self, period_sec: f64) -> Option<f64> {
        let (admitted, total) = self
            .trailing(period_sec)
            .fold((0usize, 0usize), |(a, t), e| (a + e.admitted as usize, t + 1));
        (total > 0).then(|| admitted as f64 / total as f64)
    }

    /// Admitted fraction of entries whose timestamps fall in `[from, to]`.
    pub fn admitted_ratio_between(&self, from: f64, to: f64) -> Option<f64> {
        let (admitted, total) = self
            .entries
            .iter()
            .filter(|e| e.timestamp_sec >= from && e.timestamp_sec <= to)
            .fold((0usize, 0usize), |(a, t), e| (a + e.admitted as usize, t + 1));
        (total > 0).then(|| admitted as f64 / total as f64)
    }
}

fn collect_admitted<'a>(entries: impl Iterator<Item = &'a SignalEntry>) -> SignalWindow {
    let mut window = SignalWindow::default();
    for entry in entries {
        if let (true, Some(value)) = (entry.admitted, entry.ppg_value) {
            window.timestamps.push(entry.timestamp_sec);
            window.values.push(value);
        }
    }
    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn entry(t: f64, admitted: bool) -> SignalEntry {
        SignalEntry {
            timestamp_sec: t,
            ppg_value: Some(t),
            admitted,
        }
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let mut buffer = SignalBuffer::new(60.0);
        buffer.push(entry(1.0, true)).unwrap();
        assert_eq!(
            buffer.push(entry(1.0, true)),
            Err(MeasurementError::NonMonotonicTimestamp { last: 1.0, got: 1.0 })
        );
        assert!(buffer.push(entry(0.5, true)).is_err());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_eviction_bounds_span() {
        let mut buffer = SignalBuffer::new(10.05);
        for i in 0..300 {
            buffer.push(entry(i as f64 / 10.0, true)).unwrap();
            let first = buffer.entries().next().unwrap().timestamp_sec;
            assert!(buffer.last_timestamp().unwrap() - first <= 10.05);
        }
        assert_eq!(buffer.len(), 101);
    }

    #[test]
    fn test_non_admitted_entries_carry_no_signal() {
        let mut buffer = SignalBuffer::new(60.0);
        buffer.push(entry(0.0, true)).unwrap();
        buffer.push(entry(0.1, false)).unwrap();
        buffer.push(entry(0.2, true)).unwrap();

        let window = buffer.full_window();
        assert_eq!(window.timestamps, vec![0.0, 0.2]);
        assert!(buffer.entries().nth(1).unwrap().ppg_value.is_none());
    }

    #[test]
    fn test_bad_signal_seconds_accumulate_and_survive_eviction() {
        let mut buffer = SignalBuffer::new(1.0);
        buffer.push(entry(0.0, true)).unwrap();
        buffer.push(entry(0.5, false)).unwrap();
        buffer.push(entry(1.0, false)).unwrap();
        buffer.push(entry(3.0, true)).unwrap();
        assert_relative_eq!(buffer.bad_signal_sec(), 1.0);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_admitted_ratio_over_trailing_window() {
        let mut buffer = SignalBuffer::new(60.0);
        for i in 0..10 {
            buffer.push(entry(i as f64, i >= 6)).unwrap();
        }
        // timestamps 5..=9 fall in the trailing 4 s window
        assert_relative_eq!(buffer.admitted_ratio(4.0).unwrap(), 0.8);
        assert_relative_eq!(buffer.admitted_ratio(3.0).unwrap(), 1.0);
        assert_relative_eq!(buffer.admitted_ratio(100.0).unwrap(), 0.4);
        assert_eq!(buffer.admitted_ratio(4.0), buffer.admitted_ratio(4.0));
    }

    #[test]
    fn test_empty_buffer_has_no_ratio() {
        let buffer = SignalBuffer::new(60.0);
        assert!(buffer.admitted_ratio(10.0).is_none());
        assert!(buffer.window(10.0).is_empty());
    }

    #[test]
    fn test_clear_resets_counter() {
        let mut buffer = SignalBuffer::new(60.0);
        buffer.push(entry(0.0, false)).unwrap();
        buffer.push(entry(1.0, false)).unwrap();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.bad_signal_sec(), 0.0);
        buffer.push(entry(0.0, true)).unwrap();
    }
}
