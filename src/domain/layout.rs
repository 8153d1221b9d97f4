// Plot layout domain model
use super::geometry::InstrumentGeometry;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Axis {
    pub title: String,
    /// `[bottom, top]` (or `[left, right]`); `None` lets the renderer autoscale.
    pub range: Option<[f64; 2]>,
}

impl Axis {
    pub fn auto(title: &str) -> Self {
        Self {
            title: title.to_string(),
            range: None,
        }
    }

    pub fn fixed(title: &str, bottom: f64, top: f64) -> Self {
        Self {
            title: title.to_string(),
            range: Some([bottom, top]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LegendOrientation {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotLayout {
    pub title: String,
    pub x_axis: Option<Axis>,
    /// Bin axis for depth plots.
    pub y_axis: Option<Axis>,
    /// Depth axis overlaying the bin axis.
    pub y_axis2: Option<Axis>,
    pub legend: LegendOrientation,
}

/// A layout together with the geometry it was built from.
///
/// The two are only ever replaced as a pair, so a view never shows a layout
/// that disagrees with its current geometry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotSlot {
    pub geometry: Option<InstrumentGeometry>,
    pub layout: PlotLayout,
}

impl PlotSlot {
    pub fn new(geometry: Option<InstrumentGeometry>, layout: PlotLayout) -> Self {
        Self { geometry, layout }
    }
}
