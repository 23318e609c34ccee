use super::sample::{Channel, TelemetrySample};

use std::collections::VecDeque;
use std::time::Instant;

/// Default number of samples retained per channel.
pub const DEFAULT_CAPACITY: usize = 300;

/// Rolling, fixed-capacity record of the most recent samples.
///
/// Every channel ring and the time ring hold the same number of entries, so
/// index `i` of each refers to the same sample. Appending to a full history
/// evicts the oldest sample from all of them.
#[derive(Debug)]
pub struct History {
    capacity: usize,
    /// Instant of the first accepted sample. Never reset.
    epoch: Option<Instant>,
    times: VecDeque<f64>,
    channels: [VecDeque<f64>; Channel::COUNT],
}

impl History {
    pub fn new(capacity: usize) -> History {
        let alloc = capacity.min(65_536);
        History {
            capacity,
            epoch: None,
            times: VecDeque::with_capacity(alloc),
            channels: std::array::from_fn(|_| VecDeque::with_capacity(alloc)),
        }
    }

    /// Records `sample` as observed at `timestamp`, returning its time in
    /// seconds relative to the first sample ever appended.
    pub fn append(&mut self, sample: &TelemetrySample, timestamp: Instant) -> f64 {
        let epoch = *self.epoch.get_or_insert(timestamp);
        let t = timestamp.saturating_duration_since(epoch).as_secs_f64();

        self.times.push_back(t);
        for ch in Channel::ALL {
            self.channels[ch.index()].push_back(sample.value(ch));
        }

        while self.times.len() > self.capacity {
            self.times.pop_front();
            for data in self.channels.iter_mut() {
                data.pop_front();
            }
        }
        t
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            times: self.times.iter().copied().collect(),
            channels: std::array::from_fn(|i| self.channels[i].iter().copied().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn epoch(&self) -> Option<Instant> {
        self.epoch
    }

    /// Relative time and value of the newest sample on `channel`.
    pub fn latest(&self, channel: Channel) -> Option<(f64, f64)> {
        Some((*self.times.back()?, *self.channels[channel.index()].back()?))
    }
}

/// Point-in-time copy of a `History`, oldest sample first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub times: Vec<f64>,
    channels: [Vec<f64>; Channel::COUNT],
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn values(&self, channel: Channel) -> &[f64] {
        &self.channels[channel.index()]
    }

    /// `(time, value)` pairs for one channel, ready for a line chart.
    pub fn series(&self, channel: Channel) -> Vec<(f64, f64)> {
        self.times
            .iter()
            .copied()
            .zip(self.values(channel).iter().copied())
            .collect()
    }

    pub fn first_time(&self) -> Option<f64> {
        self.times.first().copied()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    /// Smallest and largest value across the given channels, ignoring NaN.
    pub fn extent(&self, channels: &[Channel]) -> Option<(f64, f64)> {
        channels
            .iter()
            .flat_map(|ch| self.values(*ch).iter().copied())
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
