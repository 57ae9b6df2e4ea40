//! Sliding-window transfer rate smoothing
//!
//! Engines report instantaneous rates once per sampling interval. Tasks expose the mean
//! over the last [`MAX_SAMPLES`] samples instead, so consumers do not see jitter.

use std::collections::VecDeque;
use std::time::Duration;

/// Number of samples kept in the window
pub const MAX_SAMPLES: usize = 30;

/// One download/upload rate pair in bytes per second
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpeedSample {
    /// Download rate
    pub download: u64,
    /// Upload rate
    pub upload: u64,
}

/// Fixed-size circular buffer of rate samples with running sums
#[derive(Clone, Debug)]
pub struct SpeedMonitor {
    samples: VecDeque<SpeedSample>,
    sum: SpeedSample,
}

impl SpeedMonitor {
    /// Create an empty monitor
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_SAMPLES),
            sum: SpeedSample::default(),
        }
    }

    /// Push a sample, evicting the oldest one once the window is full
    pub fn add_sample(&mut self, download: u64, upload: u64) {
        if self.samples.len() == MAX_SAMPLES
            && let Some(oldest) = self.samples.pop_front()
        {
            self.sum.download = self.sum.download.saturating_sub(oldest.download);
            self.sum.upload = self.sum.upload.saturating_sub(oldest.upload);
        }
        self.samples.push_back(SpeedSample { download, upload });
        self.sum.download = self.sum.download.saturating_add(download);
        self.sum.upload = self.sum.upload.saturating_add(upload);
    }

    /// Smoothed download rate
    pub fn down(&self) -> u64 {
        self.average().download
    }

    /// Smoothed upload rate
    pub fn up(&self) -> u64 {
        self.average().upload
    }

    /// Mean of the samples currently in the window
    pub fn average(&self) -> SpeedSample {
        let count = self.samples.len() as u64;
        if count == 0 {
            return SpeedSample::default();
        }
        SpeedSample {
            download: self.sum.download / count,
            upload: self.sum.upload / count,
        }
    }

    /// Number of samples in the window
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no sample has been recorded since creation or the last reset
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop every sample
    pub fn reset(&mut self) {
        self.samples.clear();
        self.sum = SpeedSample::default();
    }

    /// Estimated time to transfer `remaining` bytes at the smoothed download rate
    ///
    /// `None` when the rate is zero.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let rate = self.down();
        if rate == 0 {
            return None;
        }
        Some(Duration::from_secs(remaining.div_ceil(rate)))
    }
}

impl Default for SpeedMonitor {
    fn default() -> Self {
        Self::new()
    }
}
