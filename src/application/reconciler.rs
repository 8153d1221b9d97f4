// Telemetry reconciler - folds backend samples into view state
use crate::domain::sample::{
    ContourSample, IntensitySample, ShipTrackSample, TelemetrySample, TerminalSample,
    TimeSeriesSample,
};
use crate::domain::view_state::{
    ContourSeries, IntensitySeries, ShipTrackSeries, TerminalStatus, TimeSeriesSeries, ViewSeries,
    ViewState,
};

/// Produce the state that follows `prev` once `sample` is applied.
///
/// Reported arrays replace the previous ones wholesale; unreported fields keep
/// their previous value. A sample for another view kind leaves `prev` as is.
pub fn reconcile(prev: &ViewState, sample: &TelemetrySample) -> ViewState {
    if sample.kind() != prev.kind {
        tracing::debug!(view = %prev.kind, sample = %sample.kind(), "ignoring sample for another view");
        return prev.clone();
    }

    let mut next = prev.clone();
    next.series = match (&prev.series, sample) {
        (ViewSeries::Tabular(readings), TelemetrySample::Tabular(incoming)) => {
            ViewSeries::Tabular(readings.merged_with(incoming))
        }
        (ViewSeries::Intensity(series), TelemetrySample::Intensity(incoming)) => {
            ViewSeries::Intensity(merge_intensity(series, incoming))
        }
        (ViewSeries::Contour(series), TelemetrySample::Contour(incoming)) => {
            ViewSeries::Contour(merge_contour(series, incoming))
        }
        (ViewSeries::ShipTrack(series), TelemetrySample::ShipTrack(incoming)) => {
            ViewSeries::ShipTrack(merge_ship_track(series, incoming))
        }
        (ViewSeries::TimeSeries(series), TelemetrySample::TimeSeries(incoming)) => {
            ViewSeries::TimeSeries(merge_time_series(series, incoming))
        }
        (ViewSeries::Terminal(status), TelemetrySample::Terminal(incoming)) => {
            if let Some(port) = &incoming.comm_port {
                next.discovered_ports.insert(port);
            }
            ViewSeries::Terminal(merge_terminal(status, incoming))
        }
        (series, _) => series.clone(),
    };
    next.revision += 1;
    next
}

/// Union a comm-port listing into the discovered set.
///
/// Returns `None` when nothing new was reported.
pub fn merge_comm_ports(prev: &ViewState, ports: &[String]) -> Option<ViewState> {
    let unseen = ports.iter().map(|port| port.trim()).any(|port| {
        !port.is_empty() && !prev.discovered_ports.contains(port)
    });
    if !unseen {
        return None;
    }
    let mut next = prev.clone();
    next.discovered_ports.extend(ports.iter().map(String::as_str));
    next.revision += 1;
    Some(next)
}

pub fn merge_baud_rates(prev: &ViewState, baud_rates: &[u32]) -> Option<ViewState> {
    if baud_rates.is_empty() || prev.baud_rates == baud_rates {
        return None;
    }
    let mut next = prev.clone();
    next.baud_rates = baud_rates.to_vec();
    next.revision += 1;
    Some(next)
}

fn pick<T: Clone>(current: &T, incoming: &Option<T>) -> T {
    incoming.as_ref().unwrap_or(current).clone()
}

fn merge_intensity(series: &IntensitySeries, incoming: &IntensitySample) -> IntensitySeries {
    IntensitySeries {
        bins: pick(&series.bins, &incoming.bins),
        beams: std::array::from_fn(|i| match incoming.geometry.beam_count {
            Some(count) if i >= count as usize => Vec::new(),
            _ => pick(&series.beams[i], &incoming.beams[i]),
        }),
        vertical: incoming.vertical.clone().or_else(|| series.vertical.clone()),
    }
}

fn merge_contour(series: &ContourSeries, incoming: &ContourSample) -> ContourSeries {
    ContourSeries {
        magnitudes: pick(&series.magnitudes, &incoming.magnitudes),
        times: pick(&series.times, &incoming.times),
        bins: pick(&series.bins, &incoming.bins),
        bottom_track_range: pick(&series.bottom_track_range, &incoming.bottom_track_range),
        bottom_track_bin: pick(&series.bottom_track_bin, &incoming.bottom_track_bin),
        last_bin_range: pick(&series.last_bin_range, &incoming.last_bin_range),
    }
}

fn merge_ship_track(series: &ShipTrackSeries, incoming: &ShipTrackSample) -> ShipTrackSeries {
    ShipTrackSeries {
        quiver_x: pick(&series.quiver_x, &incoming.quiver_x),
        quiver_y: pick(&series.quiver_y, &incoming.quiver_y),
        quiver_text: pick(&series.quiver_text, &incoming.quiver_text),
        lat: pick(&series.lat, &incoming.lat),
        lon: pick(&series.lon, &incoming.lon),
        last_lat: incoming.last_lat.or(series.last_lat),
        last_lon: incoming.last_lon.or(series.last_lon),
    }
}

fn merge_time_series(series: &TimeSeriesSeries, incoming: &TimeSeriesSample) -> TimeSeriesSeries {
    let mut next = series.clone();
    for (&channel, &on) in &incoming.selected {
        if on {
            next.selected.insert(channel);
        } else {
            next.selected.remove(&channel);
        }
    }
    for (&channel, data) in &incoming.series {
        next.series.insert(channel, data.clone());
    }
    if let Some(times) = &incoming.times {
        next.times = times.clone();
    }
    if let Some(max_ens) = incoming.max_ens {
        next.max_ens = max_ens;
    }
    next
}

fn merge_terminal(status: &TerminalStatus, incoming: &TerminalSample) -> TerminalStatus {
    TerminalStatus {
        backend_connected: incoming.is_connected.unwrap_or(status.backend_connected),
        baud: incoming.baud.or(status.baud),
        comm_port: incoming.comm_port.clone().or_else(|| status.comm_port.clone()),
    }
}
