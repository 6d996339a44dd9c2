use crate::error::{MixError, MixResult};

/// Upper bound for the default selection on long sources. Manual selections
/// may extend past it.
pub const MAX_DEFAULT_SELECTION_SECS: f64 = 600.0;

/// Selected region of the attached source, in seconds.
///
/// Always satisfies `0 <= start < end <= duration`; the only constructors are
/// [`TimeRange::normalize`] and [`TimeRange::full_range`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    start: f64,
    end: f64,
    duration: f64,
}

impl TimeRange {
    /// Clamps `start` into `[0, duration]` and `end` into `(start, duration]`.
    ///
    /// Fails with [`MixError::InvalidRange`] when nothing of the region is
    /// left after clamping; callers keep their previous value in that case.
    pub fn normalize(start: f64, end: f64, duration: f64) -> MixResult<Self> {
        let invalid = MixError::InvalidRange {
            start,
            end,
            duration,
        };
        if !(start.is_finite() && end.is_finite() && duration.is_finite()) || duration <= 0.0 {
            return Err(invalid);
        }

        let start = start.clamp(0.0, duration);
        let end = end.min(duration);
        if end <= start {
            return Err(invalid);
        }

        Ok(Self {
            start,
            end,
            duration,
        })
    }

    /// Default selection for a freshly loaded source: from zero to the
    /// duration, capped at [`MAX_DEFAULT_SELECTION_SECS`].
    pub fn full_range(duration: f64) -> MixResult<Self> {
        Self::normalize(0.0, duration.min(MAX_DEFAULT_SELECTION_SECS), duration)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Length of the selected region.
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, at: f64) -> bool {
        at >= self.start && at <= self.end
    }
}
