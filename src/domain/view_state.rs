// Per-view state published to the presentation layer
use super::layout::PlotSlot;
use super::sample::{TabularReadings, ViewKind, MAX_BEAMS};
use super::timeseries::{TimeSeriesChannel, TimeSeriesOptions};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Identifiers seen so far, in order of first discovery.
///
/// Only ever grows: there is no removal API.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct DiscoveredSet {
    items: Vec<String>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl DiscoveredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `id` was not seen before.
    pub fn insert(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() || self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        self.items.push(id.to_string());
        true
    }

    /// Returns how many identifiers were new.
    pub fn extend<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter().filter(|id| self.insert(id)).count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntensitySeries {
    pub bins: Vec<f64>,
    pub beams: [Vec<f64>; MAX_BEAMS],
    pub vertical: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContourSeries {
    pub magnitudes: Vec<Vec<Option<f64>>>,
    pub times: Vec<String>,
    pub bins: Vec<f64>,
    pub bottom_track_range: Vec<Option<f64>>,
    pub bottom_track_bin: Vec<Option<f64>>,
    pub last_bin_range: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipTrackSeries {
    pub quiver_x: Vec<Option<f64>>,
    pub quiver_y: Vec<Option<f64>>,
    pub quiver_text: Vec<String>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub last_lat: Option<f64>,
    pub last_lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesSeries {
    pub selected: BTreeSet<TimeSeriesChannel>,
    pub series: BTreeMap<TimeSeriesChannel, Vec<Option<f64>>>,
    pub times: Vec<String>,
    pub max_ens: u32,
}

impl Default for TimeSeriesSeries {
    fn default() -> Self {
        let options = TimeSeriesOptions::default();
        Self {
            selected: options.selected,
            series: BTreeMap::new(),
            times: Vec::new(),
            max_ens: options.max_ens,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalStatus {
    /// Backend's own view of the serial link.
    pub backend_connected: bool,
    pub baud: Option<u32>,
    pub comm_port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum ViewSeries {
    Tabular(TabularReadings),
    Intensity(IntensitySeries),
    Contour(ContourSeries),
    ShipTrack(ShipTrackSeries),
    TimeSeries(TimeSeriesSeries),
    Terminal(TerminalStatus),
}

impl ViewSeries {
    pub fn empty(kind: ViewKind) -> Self {
        match kind {
            ViewKind::Tabular => ViewSeries::Tabular(TabularReadings::default()),
            ViewKind::Intensity => ViewSeries::Intensity(IntensitySeries::default()),
            ViewKind::Contour => ViewSeries::Contour(ContourSeries::default()),
            ViewKind::ShipTrack => ViewSeries::ShipTrack(ShipTrackSeries::default()),
            ViewKind::TimeSeries => ViewSeries::TimeSeries(TimeSeriesSeries::default()),
            ViewKind::Terminal => ViewSeries::Terminal(TerminalStatus::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub kind: ViewKind,
    /// Number of samples applied since mount.
    pub revision: u64,
    pub series: ViewSeries,
    pub plot: PlotSlot,
    pub discovered_ports: DiscoveredSet,
    pub baud_rates: Vec<u32>,
    pub cancelled: bool,
}

impl ViewState {
    pub fn new(kind: ViewKind, plot: PlotSlot) -> Self {
        Self {
            kind,
            revision: 0,
            series: ViewSeries::empty(kind),
            plot,
            discovered_ports: DiscoveredSet::new(),
            baud_rates: Vec::new(),
            cancelled: false,
        }
    }

    /// Clears the plotted data after a playback request.
    ///
    /// Discovered ports and the current layout survive a reset.
    pub fn reset_series(&self) -> ViewState {
        let mut next = self.clone();
        next.series = match &self.series {
            // Selection and history length are user settings, not data.
            ViewSeries::TimeSeries(ts) => ViewSeries::TimeSeries(TimeSeriesSeries {
                selected: ts.selected.clone(),
                series: BTreeMap::new(),
                times: Vec::new(),
                max_ens: ts.max_ens,
            }),
            _ => ViewSeries::empty(self.kind),
        };
        next.revision += 1;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovered_set_keeps_first_order() {
        let mut set = DiscoveredSet::new();
        assert_eq!(set.extend(["COM1", "COM3"]), 2);
        assert!(set.insert("COM5"));
        assert!(!set.insert("COM3"));
        assert!(!set.insert("  "));
        assert_eq!(set.as_slice(), &["COM1", "COM3", "COM5"]);
    }
}
