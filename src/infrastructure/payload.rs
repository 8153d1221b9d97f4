// Mapper from backend JSON payloads to domain samples
//
// Fields are decoded one at a time: a missing or mistyped field becomes "not
// reported" instead of failing the whole sample.
use crate::application::data_channel::ChannelError;
use crate::domain::sample::{
    ContourSample, GeometryFields, IntensitySample, ShipTrackSample, TabularReadings,
    TerminalSample, TimeSeriesSample, MAX_BEAMS,
};
use crate::domain::timeseries::{TimeSeriesChannel, TimeSeriesOptions};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// True when the backend answered but had nothing to report.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, ChannelError> {
    serde_json::from_value(value).map_err(|e| ChannelError::Decode(format!("{}: {}", what, e)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TabularPayload {
    #[serde(deserialize_with = "lenient")]
    ensemble_num: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    ensemble_date_time_str: Option<String>,
    #[serde(deserialize_with = "lenient")]
    num_ensembles: Option<u64>,
    #[serde(deserialize_with = "lenient", alias = "lostEnsemble")]
    lost_ensembles: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    bad_ensembles: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    percent_bad_bins: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    delta_time: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    heading: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pitch: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    roll: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    temperature: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pressure: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    good_bins: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    top_q: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    measured_q: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    bottom_q: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    left_q: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    right_q: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    total_q: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    boat_speed: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    boat_course: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    water_speed: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    water_dir: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    calc_depth: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    river_length: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    distance_made_good: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    course_made_good: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    duration: Option<f64>,
}

pub fn tabular_from_payload(value: Value) -> Result<TabularReadings, ChannelError> {
    let p: TabularPayload = decode(value, "tabular sample")?;
    let ensemble_time = p
        .ensemble_date_time_str
        .as_deref()
        .and_then(|s| s.parse::<NaiveDateTime>().ok());

    Ok(TabularReadings {
        ensemble_num: p.ensemble_num,
        ensemble_time,
        num_ensembles: p.num_ensembles,
        lost_ensembles: p.lost_ensembles,
        bad_ensembles: p.bad_ensembles,
        percent_bad_bins: p.percent_bad_bins,
        delta_time: p.delta_time,
        heading: p.heading,
        pitch: p.pitch,
        roll: p.roll,
        temperature: p.temperature,
        pressure: p.pressure,
        good_bins: p.good_bins,
        top_q: p.top_q,
        measured_q: p.measured_q,
        bottom_q: p.bottom_q,
        left_q: p.left_q,
        right_q: p.right_q,
        total_q: p.total_q,
        boat_speed: p.boat_speed,
        boat_course: p.boat_course,
        water_speed: p.water_speed,
        water_dir: p.water_dir,
        calc_depth: p.calc_depth,
        river_length: p.river_length,
        distance_made_good: p.distance_made_good,
        course_made_good: p.course_made_good,
        duration: p.duration,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeometryPayload {
    #[serde(deserialize_with = "lenient")]
    num_beams: Option<u32>,
    #[serde(deserialize_with = "lenient")]
    num_bins: Option<u32>,
    #[serde(deserialize_with = "lenient")]
    min_bin_depth: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    max_bin_depth: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    is_upward: Option<bool>,
}

impl From<GeometryPayload> for GeometryFields {
    fn from(p: GeometryPayload) -> Self {
        GeometryFields {
            beam_count: p.num_beams,
            bin_count: p.num_bins,
            min_depth: p.min_bin_depth,
            max_depth: p.max_bin_depth,
            is_upward: p.is_upward,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IntensityPayload {
    #[serde(flatten)]
    geometry: GeometryPayload,
    #[serde(deserialize_with = "lenient")]
    bin_data: Option<Vec<f64>>,
    #[serde(deserialize_with = "lenient")]
    beam0_data: Option<Vec<f64>>,
    #[serde(deserialize_with = "lenient")]
    beam1_data: Option<Vec<f64>>,
    #[serde(deserialize_with = "lenient")]
    beam2_data: Option<Vec<f64>>,
    #[serde(deserialize_with = "lenient")]
    beam3_data: Option<Vec<f64>>,
    #[serde(deserialize_with = "lenient")]
    is_vert_avail: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    vert_data: Option<Vec<f64>>,
}

pub fn intensity_from_payload(value: Value) -> Result<IntensitySample, ChannelError> {
    let p: IntensityPayload = decode(value, "intensity sample")?;
    let geometry = GeometryFields::from(p.geometry);

    // Beams past the reported beam count are stale leftovers; the
    // reconciler clears them from the view.
    let beam_count = geometry.beam_count.map_or(MAX_BEAMS, |n| n as usize);
    let mut beams = [p.beam0_data, p.beam1_data, p.beam2_data, p.beam3_data];
    for beam in beams.iter_mut().skip(beam_count) {
        *beam = None;
    }

    Ok(IntensitySample {
        geometry,
        bins: p.bin_data,
        beams,
        vertical: p.vert_data.filter(|_| p.is_vert_avail.unwrap_or(false)),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ContourPayload {
    #[serde(flatten)]
    geometry: GeometryPayload,
    #[serde(deserialize_with = "lenient")]
    contour_data: Option<Vec<Vec<Option<f64>>>>,
    #[serde(rename = "X_dt", deserialize_with = "lenient")]
    x_dt: Option<Vec<String>>,
    #[serde(rename = "Y_bin", deserialize_with = "lenient")]
    y_bin: Option<Vec<f64>>,
    #[serde(deserialize_with = "lenient")]
    bt_range: Option<Vec<Option<f64>>>,
    #[serde(deserialize_with = "lenient")]
    bt_range_to_bin: Option<Vec<Option<f64>>>,
    #[serde(deserialize_with = "lenient")]
    last_bin_range: Option<Vec<f64>>,
}

pub fn contour_from_payload(value: Value) -> Result<ContourSample, ChannelError> {
    let p: ContourPayload = decode(value, "contour sample")?;
    Ok(ContourSample {
        geometry: p.geometry.into(),
        magnitudes: p.contour_data,
        times: p.x_dt,
        bins: p.y_bin,
        bottom_track_range: p.bt_range,
        bottom_track_bin: p.bt_range_to_bin,
        last_bin_range: p.last_bin_range,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ShipTrackPayload {
    #[serde(deserialize_with = "lenient")]
    quiver_x: Option<Vec<Option<f64>>>,
    #[serde(deserialize_with = "lenient")]
    quiver_y: Option<Vec<Option<f64>>>,
    #[serde(deserialize_with = "lenient")]
    quiver_text: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient")]
    lat: Option<Vec<f64>>,
    #[serde(deserialize_with = "lenient")]
    lon: Option<Vec<f64>>,
    #[serde(deserialize_with = "lenient")]
    last_lat: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    last_lon: Option<f64>,
}

pub fn ship_track_from_payload(value: Value) -> Result<ShipTrackSample, ChannelError> {
    let p: ShipTrackPayload = decode(value, "ship track sample")?;
    Ok(ShipTrackSample {
        quiver_x: p.quiver_x,
        quiver_y: p.quiver_y,
        quiver_text: p.quiver_text,
        lat: p.lat,
        lon: p.lon,
        last_lat: p.last_lat,
        last_lon: p.last_lon,
    })
}

fn as_object(value: Value, what: &str) -> Result<Map<String, Value>, ChannelError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ChannelError::Decode(format!(
            "{}: expected an object, got {}",
            what, other
        ))),
    }
}

fn field<T: DeserializeOwned>(map: &Map<String, Value>, key: &str) -> Option<T> {
    map.get(key)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

pub fn time_series_from_payload(value: Value) -> Result<TimeSeriesSample, ChannelError> {
    let map = as_object(value, "time series sample")?;
    let mut sample = TimeSeriesSample {
        times: field(&map, "X_dt"),
        max_ens: field(&map, "maxEns"),
        ..Default::default()
    };
    for channel in TimeSeriesChannel::ALL {
        let (flag_key, data_key) = channel.wire_keys();
        if let Some(on) = field::<bool>(&map, flag_key) {
            sample.selected.insert(channel, on);
        }
        if let Some(data) = field::<Vec<Option<f64>>>(&map, data_key) {
            sample.series.insert(channel, data);
        }
    }
    Ok(sample)
}

/// Options as reported by the backend. Unreported flags count as unselected.
pub fn options_from_payload(value: Value) -> Result<TimeSeriesOptions, ChannelError> {
    let map = as_object(value, "time series options")?;
    let defaults = TimeSeriesOptions::default();
    Ok(TimeSeriesOptions {
        selected: TimeSeriesChannel::ALL
            .into_iter()
            .filter(|channel| field::<bool>(&map, channel.wire_keys().0).unwrap_or(false))
            .collect(),
        max_ens: field(&map, "maxEns").unwrap_or(defaults.max_ens),
    })
}

/// Positional arguments for `set_timeseries_options`: one flag per channel in
/// legend order, then the history length.
pub fn options_to_args(options: &TimeSeriesOptions) -> Value {
    let mut args: Vec<Value> = TimeSeriesChannel::ALL
        .into_iter()
        .map(|channel| Value::Bool(options.is_selected(channel)))
        .collect();
    args.push(Value::from(options.max_ens));
    Value::Array(args)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TerminalPayload {
    #[serde(deserialize_with = "lenient")]
    is_connected: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    term_data: Option<String>,
    baud: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    comm_port: Option<String>,
}

pub fn terminal_from_payload(value: Value) -> Result<TerminalSample, ChannelError> {
    let p: TerminalPayload = decode(value, "terminal sample")?;
    Ok(TerminalSample {
        is_connected: p.is_connected,
        text: p.term_data,
        baud: p.baud.as_ref().and_then(baud_from_value),
        comm_port: p.comm_port.filter(|port| !port.trim().is_empty()),
    })
}

fn baud_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Baud rates arrive as numbers or numeric strings depending on the backend.
pub fn baud_rates_from_payload(value: Value) -> Result<Vec<u32>, ChannelError> {
    let items: Vec<Value> = decode(value, "baud rate list")?;
    Ok(items.iter().filter_map(baud_from_value).collect())
}

pub fn comm_ports_from_payload(value: Value) -> Result<Vec<String>, ChannelError> {
    decode(value, "comm port list")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Orientation;
    use serde_json::json;

    #[test]
    fn test_tabular_missing_and_mistyped_fields() {
        let readings = tabular_from_payload(json!({
            "ensembleNum": 42,
            "ensembleDateTimeStr": "2019-03-04T10:15:30.250000",
            "lostEnsemble": 3,
            "heading": "n/a",
            "pitch": 1.25
        }))
        .unwrap();

        assert_eq!(readings.ensemble_num, Some(42));
        assert_eq!(readings.lost_ensembles, Some(3));
        assert_eq!(readings.heading, None);
        assert_eq!(readings.pitch, Some(1.25));
        assert_eq!(readings.roll, None);
        assert_eq!(
            readings.ensemble_time.unwrap().to_string(),
            "2019-03-04 10:15:30.250"
        );
    }

    #[test]
    fn test_intensity_geometry_and_beams() {
        let sample = intensity_from_payload(json!({
            "numBeams": 3,
            "numBins": 2,
            "minBinDepth": 0.5,
            "maxBinDepth": 2.5,
            "isUpward": true,
            "binData": [0, 1],
            "beam0Data": [50.1, 48.0],
            "beam1Data": [51.0, 47.2],
            "beam2Data": [49.9, 46.5],
            "beam3Data": [10.0, 10.0],
            "isVertAvail": false,
            "vertData": [1.0, 2.0]
        }))
        .unwrap();

        let geometry = sample.geometry.geometry().unwrap();
        assert_eq!(geometry.bin_count, 2);
        assert_eq!(geometry.orientation, Orientation::Upward);
        assert!(sample.beams[2].is_some());
        assert!(sample.beams[3].is_none());
        assert!(sample.vertical.is_none());
    }

    #[test]
    fn test_contour_keeps_bad_velocity_gaps() {
        let sample = contour_from_payload(json!({
            "contourData": [[0.4, null], [0.6, 0.7]],
            "X_dt": ["10:00:00", "10:00:01"],
            "Y_bin": [0, 1],
            "btRange": [null, 12.5],
            "btRangeToBin": [null, 24.0]
        }))
        .unwrap();

        assert_eq!(
            sample.magnitudes.unwrap(),
            vec![vec![Some(0.4), None], vec![Some(0.6), Some(0.7)]]
        );
        assert_eq!(sample.bottom_track_range.unwrap(), vec![None, Some(12.5)]);
        assert_eq!(sample.bottom_track_bin.unwrap(), vec![None, Some(24.0)]);
        assert!(sample.geometry.geometry().is_none());
        assert!(sample.last_bin_range.is_none());
    }

    #[test]
    fn test_time_series_dynamic_keys() {
        let sample = time_series_from_payload(json!({
            "isHeading": true,
            "headingData": [10.0, null, 12.0],
            "isPitch": false,
            "X_dt": ["a", "b", "c"],
            "maxEns": 30
        }))
        .unwrap();

        assert_eq!(sample.selected.get(&TimeSeriesChannel::Heading), Some(&true));
        assert_eq!(sample.selected.get(&TimeSeriesChannel::Pitch), Some(&false));
        assert!(!sample.selected.contains_key(&TimeSeriesChannel::Roll));
        assert_eq!(sample.series[&TimeSeriesChannel::Heading], vec![Some(10.0), None, Some(12.0)]);
        assert_eq!(sample.max_ens, Some(30));

        assert!(time_series_from_payload(json!([1, 2])).is_err());
    }

    #[test]
    fn test_options_wire_order() {
        let options = TimeSeriesOptions {
            selected: [TimeSeriesChannel::BoatSpeed, TimeSeriesChannel::WaterDir]
                .into_iter()
                .collect(),
            max_ens: 25,
        };
        let args = options_to_args(&options);
        let args = args.as_array().unwrap();
        assert_eq!(args.len(), 12);
        assert_eq!(args[0], json!(true));
        assert_eq!(args[2], json!(false));
        assert_eq!(args[10], json!(true));
        assert_eq!(args[11], json!(25));

        let decoded = options_from_payload(json!({"isBoatSpeed": true, "isWaterDir": true, "maxEns": 25})).unwrap();
        assert_eq!(decoded, options);
    }

    #[test]
    fn test_terminal_and_lists() {
        let sample = terminal_from_payload(json!({
            "isConnected": true,
            "termData": "\u{6}\r\n",
            "baud": "115200",
            "commPort": ""
        }))
        .unwrap();
        assert_eq!(sample.baud, Some(115200));
        assert_eq!(sample.comm_port, None);
        assert_eq!(sample.text.as_deref(), Some("\u{6}\r\n"));

        assert_eq!(
            baud_rates_from_payload(json!(["9600", 115200, "bogus"])).unwrap(),
            vec![9600, 115200]
        );
        assert!(comm_ports_from_payload(json!({"port": 1})).is_err());
    }

    #[test]
    fn test_empty_results() {
        assert!(is_empty(&Value::Null));
        assert!(is_empty(&json!({})));
        assert!(!is_empty(&json!({"heading": 1.0})));
        assert!(!is_empty(&json!([])));
    }
}
