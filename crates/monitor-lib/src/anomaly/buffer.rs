//! Per-sensor sliding window of readings

use std::collections::VecDeque;

use crate::models::Reading;

/// Bounded FIFO of the most recent readings for one sensor.
///
/// Readings are kept in insertion order; once `capacity` is reached each
/// new reading evicts the oldest one.
#[derive(Debug, Clone)]
pub struct ReadingBuffer {
    readings: VecDeque<Reading>,
    capacity: usize,
}

impl ReadingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest when over capacity
    pub fn add(&mut self, reading: Reading) {
        self.readings.push_back(reading);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
    }

    /// All readings, oldest first
    pub fn all(&self) -> &VecDeque<Reading> {
        &self.readings
    }

    /// Values in chronological order
    pub fn values(&self) -> Vec<f64> {
        self.readings.iter().map(|r| r.value).collect()
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn reading(i: i64) -> Reading {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Reading::new(base + Duration::minutes(i), i as f64, "hvac_temperature")
    }

    #[test]
    fn test_keeps_last_n_in_order() {
        let mut buffer = ReadingBuffer::new(5);
        for i in 0..12 {
            buffer.add(reading(i));
        }

        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.values(), vec![7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(buffer.latest().map(|r| r.value), Some(11.0));
    }

    #[test]
    fn test_below_capacity_keeps_everything() {
        let mut buffer = ReadingBuffer::new(50);
        for i in 0..3 {
            buffer.add(reading(i));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.all().front().map(|r| r.value), Some(0.0));
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        for capacity in 1..8 {
            let mut buffer = ReadingBuffer::new(capacity);
            for i in 0..20 {
                buffer.add(reading(i));
                assert!(buffer.len() <= capacity);
            }
            let expected: Vec<f64> = (20 - capacity as i64..20).map(|i| i as f64).collect();
            assert_eq!(buffer.values(), expected);
        }
    }
}
