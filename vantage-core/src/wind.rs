//! Short-term histogram of wind headings.
//!
//! The console shows the dominant directions of the last hour next to the
//! compass rose. The same figure is rebuilt here from the LOOP headings: each
//! heading is timestamped into one of 16 slices, and a query ranks the slices
//! that still hold samples from the last 60 minutes.

use std::collections::VecDeque;

use jiff::{SignedDuration, Timestamp};

const SLICES: usize = 16;
const DEGREES_PER_SLICE: f64 = 360.0 / SLICES as f64;
const HALF_SLICE: f64 = DEGREES_PER_SLICE / 2.0;
const MAX_HEADINGS: usize = 4;
const WINDOW: SignedDuration = SignedDuration::from_mins(60);

#[derive(Debug, Clone, Default)]
pub struct WindHeadingHistogram {
    // Samples are appended in time order, so each slice stays sorted.
    slices: [VecDeque<Timestamp>; SLICES],
}

impl WindHeadingHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_heading(&mut self, degrees: f64) {
        self.add_heading_at(degrees, Timestamp::now());
    }

    pub fn add_heading_at(&mut self, degrees: f64, at: Timestamp) {
        let slice = slice_of(degrees);
        self.slices[slice].push_back(at);
    }

    /// Up to four slice centres, most frequent first.
    pub fn past_headings(&mut self) -> Vec<f64> {
        self.past_headings_at(Timestamp::now())
    }

    pub fn past_headings_at(&mut self, now: Timestamp) -> Vec<f64> {
        for samples in self.slices.iter_mut() {
            while samples
                .front()
                .is_some_and(|&t| now.duration_since(t) > WINDOW)
            {
                samples.pop_front();
            }
        }

        let mut ranked: Vec<(usize, usize, Timestamp)> = self
            .slices
            .iter()
            .enumerate()
            .filter_map(|(i, samples)| samples.back().map(|&last| (i, samples.len(), last)))
            .collect();

        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));

        ranked
            .into_iter()
            .take(MAX_HEADINGS)
            .map(|(slice, _, _)| slice as f64 * DEGREES_PER_SLICE)
            .collect()
    }

    /// Number of samples currently held in the slice containing `degrees`.
    pub fn count(&self, degrees: f64) -> usize {
        self.slices[slice_of(degrees)].len()
    }
}

/// Slice `i` covers `(i*22.5 - 11.25, i*22.5 + 11.25]`.
fn slice_of(degrees: f64) -> usize {
    let mut heading = degrees.rem_euclid(360.0);
    if heading > 360.0 - HALF_SLICE {
        heading -= 360.0;
    }
    let slice = ((heading - HALF_SLICE) / DEGREES_PER_SLICE).ceil() as isize;
    slice.clamp(0, SLICES as isize - 1) as usize
}
