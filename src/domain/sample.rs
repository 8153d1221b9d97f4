// Telemetry sample domain models
//
// Every field is optional: `None` means the backend did not report it, and the
// reconciler keeps the previous value.
use super::geometry::{InstrumentGeometry, Orientation};
use super::timeseries::TimeSeriesChannel;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum number of beams carried by an intensity sample.
pub const MAX_BEAMS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewKind {
    Tabular,
    Intensity,
    Contour,
    ShipTrack,
    TimeSeries,
    Terminal,
}

impl ViewKind {
    pub const ALL: [ViewKind; 6] = [
        ViewKind::Tabular,
        ViewKind::Intensity,
        ViewKind::Contour,
        ViewKind::ShipTrack,
        ViewKind::TimeSeries,
        ViewKind::Terminal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Tabular => "tabular",
            ViewKind::Intensity => "intensity",
            ViewKind::Contour => "contour",
            ViewKind::ShipTrack => "ship-track",
            ViewKind::TimeSeries => "time-series",
            ViewKind::Terminal => "terminal",
        }
    }

    /// Whether plots of this kind carry a bin/depth axis.
    pub fn has_depth_axis(self) -> bool {
        matches!(self, ViewKind::Intensity | ViewKind::Contour)
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularReadings {
    pub ensemble_num: Option<i64>,
    pub ensemble_time: Option<NaiveDateTime>,
    pub num_ensembles: Option<u64>,
    pub lost_ensembles: Option<u64>,
    pub bad_ensembles: Option<u64>,
    pub percent_bad_bins: Option<f64>,
    pub delta_time: Option<f64>,
    pub heading: Option<f64>,
    pub pitch: Option<f64>,
    pub roll: Option<f64>,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub good_bins: Option<u64>,
    pub top_q: Option<f64>,
    pub measured_q: Option<f64>,
    pub bottom_q: Option<f64>,
    pub left_q: Option<f64>,
    pub right_q: Option<f64>,
    pub total_q: Option<f64>,
    pub boat_speed: Option<f64>,
    pub boat_course: Option<f64>,
    pub water_speed: Option<f64>,
    pub water_dir: Option<f64>,
    pub calc_depth: Option<f64>,
    pub river_length: Option<f64>,
    pub distance_made_good: Option<f64>,
    pub course_made_good: Option<f64>,
    pub duration: Option<f64>,
}

impl TabularReadings {
    /// Overlay every reported field of `incoming` on top of `self`.
    pub fn merged_with(&self, incoming: &TabularReadings) -> TabularReadings {
        TabularReadings {
            ensemble_num: incoming.ensemble_num.or(self.ensemble_num),
            ensemble_time: incoming.ensemble_time.or(self.ensemble_time),
            num_ensembles: incoming.num_ensembles.or(self.num_ensembles),
            lost_ensembles: incoming.lost_ensembles.or(self.lost_ensembles),
            bad_ensembles: incoming.bad_ensembles.or(self.bad_ensembles),
            percent_bad_bins: incoming.percent_bad_bins.or(self.percent_bad_bins),
            delta_time: incoming.delta_time.or(self.delta_time),
            heading: incoming.heading.or(self.heading),
            pitch: incoming.pitch.or(self.pitch),
            roll: incoming.roll.or(self.roll),
            temperature: incoming.temperature.or(self.temperature),
            pressure: incoming.pressure.or(self.pressure),
            good_bins: incoming.good_bins.or(self.good_bins),
            top_q: incoming.top_q.or(self.top_q),
            measured_q: incoming.measured_q.or(self.measured_q),
            bottom_q: incoming.bottom_q.or(self.bottom_q),
            left_q: incoming.left_q.or(self.left_q),
            right_q: incoming.right_q.or(self.right_q),
            total_q: incoming.total_q.or(self.total_q),
            boat_speed: incoming.boat_speed.or(self.boat_speed),
            boat_course: incoming.boat_course.or(self.boat_course),
            water_speed: incoming.water_speed.or(self.water_speed),
            water_dir: incoming.water_dir.or(self.water_dir),
            calc_depth: incoming.calc_depth.or(self.calc_depth),
            river_length: incoming.river_length.or(self.river_length),
            distance_made_good: incoming.distance_made_good.or(self.distance_made_good),
            course_made_good: incoming.course_made_good.or(self.course_made_good),
            duration: incoming.duration.or(self.duration),
        }
    }
}

/// Counts, depth bounds and orientation shared by the depth/bin plot samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeometryFields {
    pub beam_count: Option<u32>,
    pub bin_count: Option<u32>,
    pub min_depth: Option<f64>,
    pub max_depth: Option<f64>,
    pub is_upward: Option<bool>,
}

impl GeometryFields {
    /// A geometry is only derived when every structural field was reported.
    pub fn geometry(&self) -> Option<InstrumentGeometry> {
        Some(InstrumentGeometry::new(
            self.beam_count?,
            self.bin_count?,
            self.min_depth?,
            self.max_depth?,
            Orientation::from_upward_flag(self.is_upward?),
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntensitySample {
    pub geometry: GeometryFields,
    pub bins: Option<Vec<f64>>,
    pub beams: [Option<Vec<f64>>; MAX_BEAMS],
    pub vertical: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContourSample {
    pub geometry: GeometryFields,
    /// One row per bin; `None` marks a bad velocity.
    pub magnitudes: Option<Vec<Vec<Option<f64>>>>,
    pub times: Option<Vec<String>>,
    pub bins: Option<Vec<f64>>,
    pub bottom_track_range: Option<Vec<Option<f64>>>,
    /// Bottom-track range expressed in bins.
    pub bottom_track_bin: Option<Vec<Option<f64>>>,
    pub last_bin_range: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShipTrackSample {
    /// Quiver segments; `None` separates consecutive arrows.
    pub quiver_x: Option<Vec<Option<f64>>>,
    pub quiver_y: Option<Vec<Option<f64>>>,
    pub quiver_text: Option<Vec<String>>,
    pub lat: Option<Vec<f64>>,
    pub lon: Option<Vec<f64>>,
    pub last_lat: Option<f64>,
    pub last_lon: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesSample {
    pub selected: BTreeMap<TimeSeriesChannel, bool>,
    pub series: BTreeMap<TimeSeriesChannel, Vec<Option<f64>>>,
    pub times: Option<Vec<String>>,
    pub max_ens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerminalSample {
    pub is_connected: Option<bool>,
    /// The backend's console buffer: recent serial output, oldest first.
    pub text: Option<String>,
    pub baud: Option<u32>,
    pub comm_port: Option<String>,
}

/// One backend response for a view.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetrySample {
    Tabular(TabularReadings),
    Intensity(IntensitySample),
    Contour(ContourSample),
    ShipTrack(ShipTrackSample),
    TimeSeries(TimeSeriesSample),
    Terminal(TerminalSample),
}

impl TelemetrySample {
    pub fn kind(&self) -> ViewKind {
        match self {
            TelemetrySample::Tabular(_) => ViewKind::Tabular,
            TelemetrySample::Intensity(_) => ViewKind::Intensity,
            TelemetrySample::Contour(_) => ViewKind::Contour,
            TelemetrySample::ShipTrack(_) => ViewKind::ShipTrack,
            TelemetrySample::TimeSeries(_) => ViewKind::TimeSeries,
            TelemetrySample::Terminal(_) => ViewKind::Terminal,
        }
    }

    pub fn geometry(&self) -> Option<InstrumentGeometry> {
        match self {
            TelemetrySample::Intensity(s) => s.geometry.geometry(),
            TelemetrySample::Contour(s) => s.geometry.geometry(),
            _ => None,
        }
    }
}
