// Layout policy - decides when plot layouts are rebuilt
use crate::domain::geometry::{InstrumentGeometry, Orientation};
use crate::domain::layout::{Axis, LegendOrientation, PlotLayout, PlotSlot};
use crate::domain::sample::ViewKind;

const BIN_AXIS: &str = "Bin";
const DEPTH_AXIS: &str = "Depth (m)";

/// The layout a view starts with, before any geometry is known.
pub fn initial_slot(kind: ViewKind) -> PlotSlot {
    PlotSlot::new(None, base_layout(kind))
}

fn base_layout(kind: ViewKind) -> PlotLayout {
    let (title, x_axis, legend) = match kind {
        ViewKind::Tabular => ("Ensemble Data", None, LegendOrientation::Vertical),
        ViewKind::Intensity => ("Amplitude", Some(Axis::auto("dB")), LegendOrientation::Vertical),
        ViewKind::Contour => (
            "Water Velocity Magnitude",
            Some(Axis::auto("Date/Time")),
            LegendOrientation::Vertical,
        ),
        ViewKind::ShipTrack => ("Ship Track", Some(Axis::auto("Longitude")), LegendOrientation::Vertical),
        ViewKind::TimeSeries => (
            "Time Series",
            Some(Axis::auto("Date/Time")),
            LegendOrientation::Horizontal,
        ),
        ViewKind::Terminal => ("ADCP Terminal", None, LegendOrientation::Vertical),
    };

    let (y_axis, y_axis2) = if kind.has_depth_axis() {
        (Some(Axis::auto(BIN_AXIS)), Some(Axis::auto(DEPTH_AXIS)))
    } else if kind == ViewKind::ShipTrack {
        (Some(Axis::auto("Latitude")), None)
    } else {
        (None, None)
    };

    PlotLayout {
        title: title.to_string(),
        x_axis,
        y_axis,
        y_axis2,
        legend,
    }
}

/// Bin and depth axes for `geometry`.
///
/// Downward looking: bin 0 and the shallowest depth sit at the top of the
/// plot. Upward looking: bin 0 sits at the bottom.
pub fn depth_axes(geometry: &InstrumentGeometry) -> (Axis, Axis) {
    let bins = f64::from(geometry.bin_count);
    match geometry.orientation {
        Orientation::Downward => (
            Axis::fixed(BIN_AXIS, bins, 0.0),
            Axis::fixed(DEPTH_AXIS, geometry.max_depth, geometry.min_depth),
        ),
        Orientation::Upward => (
            Axis::fixed(BIN_AXIS, 0.0, bins),
            Axis::fixed(DEPTH_AXIS, geometry.min_depth, geometry.max_depth),
        ),
    }
}

/// Returns the layout to show for `new_geometry` and whether it was rebuilt.
pub fn update_layout(
    prev_geometry: Option<&InstrumentGeometry>,
    prev_layout: &PlotLayout,
    new_geometry: &InstrumentGeometry,
) -> (PlotLayout, bool) {
    if prev_geometry.is_some_and(|prev| prev.approx_eq(new_geometry)) {
        return (prev_layout.clone(), false);
    }

    let (bin_axis, depth_axis) = depth_axes(new_geometry);
    let layout = PlotLayout {
        y_axis: Some(bin_axis),
        y_axis2: Some(depth_axis),
        ..prev_layout.clone()
    };
    (layout, true)
}

/// Replace the geometry/layout pair of `slot` when `geometry` demands it.
///
/// A sample without geometry keeps the previous pair.
pub fn apply_geometry(slot: &PlotSlot, geometry: Option<InstrumentGeometry>) -> Option<PlotSlot> {
    let geometry = geometry?;
    let (layout, changed) = update_layout(slot.geometry.as_ref(), &slot.layout, &geometry);
    changed.then(|| PlotSlot::new(Some(geometry), layout))
}
