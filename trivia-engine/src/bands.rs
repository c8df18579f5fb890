//! Label bucketing for continuous metrics.
//!
//! Each band set maps a value to one label from a fixed ordered array and
//! reports how far the value sits from the nearest boundary. That distance is
//! the difficulty margin for band questions: a value right at a boundary makes
//! a hard question.

use crate::metrics::ab_margin;

/// How distance to a boundary is normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryScale {
    /// Relative separation (`ab_margin`) for values spanning magnitudes.
    Relative,
    /// Absolute separation divided by a fixed width, clamped to `[0, 1]`.
    Absolute(f64),
}

/// Fixed ordered set of labels separated by ascending boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSet {
    pub name: &'static str,
    pub boundaries: &'static [f64],
    pub labels: &'static [&'static str],
    pub scale: BoundaryScale,
}

impl BandSet {
    /// Index of the band containing `value`; boundaries belong to the upper band.
    #[must_use]
    pub fn index(&self, value: f64) -> usize {
        self.boundaries
            .iter()
            .position(|boundary| value < *boundary)
            .unwrap_or(self.boundaries.len())
    }

    #[must_use]
    pub fn label(&self, value: f64) -> &'static str {
        self.labels[self.index(value).min(self.labels.len() - 1)]
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Normalized distance from `value` to the nearest boundary.
    #[must_use]
    pub fn boundary_distance(&self, value: f64) -> f64 {
        self.boundaries
            .iter()
            .map(|boundary| match self.scale {
                BoundaryScale::Relative => ab_margin(value.abs(), boundary.abs()).unwrap_or(1.0),
                BoundaryScale::Absolute(width) if width > 0.0 => {
                    ((value - boundary).abs() / width).clamp(0.0, 1.0)
                }
                BoundaryScale::Absolute(_) => 1.0,
            })
            .fold(1.0_f64, f64::min)
    }
}

pub const SIZE_BANDS: BandSet = BandSet {
    name: "size",
    boundaries: &[1.0e7, 1.0e8, 5.0e8, 1.0e9, 5.0e9, 2.0e10],
    labels: &[
        "Under $10M",
        "$10M to $100M",
        "$100M to $500M",
        "$500M to $1B",
        "$1B to $5B",
        "$5B to $20B",
        "Over $20B",
    ],
    scale: BoundaryScale::Relative,
};

/// Rank boundaries sit half-way between integer ranks.
pub const RANK_BANDS: BandSet = BandSet {
    name: "rank",
    boundaries: &[5.5, 10.5, 25.5, 50.5, 100.5],
    labels: &["Top 5", "6 to 10", "11 to 25", "26 to 50", "51 to 100", "Beyond 100"],
    scale: BoundaryScale::Relative,
};

pub const CHANGE_BANDS: BandSet = BandSet {
    name: "change",
    boundaries: &[-0.25, -0.10, -0.02, 0.02, 0.10, 0.25],
    labels: &[
        "Down more than 25%",
        "Down 10% to 25%",
        "Down 2% to 10%",
        "Roughly flat (within 2%)",
        "Up 2% to 10%",
        "Up 10% to 25%",
        "Up more than 25%",
    ],
    scale: BoundaryScale::Absolute(0.25),
};

pub const CONCENTRATION_BANDS: BandSet = BandSet {
    name: "concentration",
    boundaries: &[0.25, 0.5, 0.75, 0.9],
    labels: &["Under 25%", "25% to 50%", "50% to 75%", "75% to 90%", "Over 90%"],
    scale: BoundaryScale::Absolute(0.25),
};

pub const DRAWDOWN_BANDS: BandSet = BandSet {
    name: "drawdown",
    boundaries: &[0.05, 0.25, 0.5, 0.75],
    labels: &[
        "Within 5% of its peak",
        "5% to 25% below its peak",
        "25% to 50% below its peak",
        "50% to 75% below its peak",
        "More than 75% below its peak",
    ],
    scale: BoundaryScale::Absolute(0.25),
};

pub const COUNT_BANDS: BandSet = BandSet {
    name: "count",
    boundaries: &[1.5, 3.5, 7.5, 15.5, 30.5],
    labels: &["1", "2 to 3", "4 to 7", "8 to 15", "16 to 30", "More than 30"],
    scale: BoundaryScale::Relative,
};

pub const PROTOCOL_COUNT_BANDS: BandSet = BandSet {
    name: "protocol_count",
    boundaries: &[25.5, 100.5, 250.5, 500.5, 1000.5],
    labels: &[
        "Fewer than 26",
        "26 to 100",
        "101 to 250",
        "251 to 500",
        "501 to 1,000",
        "More than 1,000",
    ],
    scale: BoundaryScale::Relative,
};

#[must_use]
pub fn size_band(tvl: f64) -> &'static str {
    SIZE_BANDS.label(tvl)
}

#[must_use]
pub fn size_band_distance(tvl: f64) -> f64 {
    SIZE_BANDS.boundary_distance(tvl)
}

#[must_use]
pub fn rank_band(rank: u32) -> &'static str {
    RANK_BANDS.label(f64::from(rank))
}

#[must_use]
pub fn rank_band_distance(rank: u32) -> f64 {
    RANK_BANDS.boundary_distance(f64::from(rank))
}

#[must_use]
pub fn change_band(change: f64) -> &'static str {
    CHANGE_BANDS.label(change)
}

#[must_use]
pub fn change_band_distance(change: f64) -> f64 {
    CHANGE_BANDS.boundary_distance(change)
}

#[must_use]
pub fn concentration_band(share: f64) -> &'static str {
    CONCENTRATION_BANDS.label(share)
}

#[must_use]
pub fn concentration_band_distance(share: f64) -> f64 {
    CONCENTRATION_BANDS.boundary_distance(share)
}
