// Time series channel selection
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default number of ensembles kept in each time series.
pub const DEFAULT_MAX_ENSEMBLES: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeSeriesChannel {
    BoatSpeed,
    BoatDir,
    Heading,
    Pitch,
    Roll,
    Temperature,
    GnssQual,
    GnssHdop,
    NumSat,
    WaterSpeed,
    WaterDir,
}

impl TimeSeriesChannel {
    pub const ALL: [TimeSeriesChannel; 11] = [
        TimeSeriesChannel::BoatSpeed,
        TimeSeriesChannel::BoatDir,
        TimeSeriesChannel::Heading,
        TimeSeriesChannel::Pitch,
        TimeSeriesChannel::Roll,
        TimeSeriesChannel::Temperature,
        TimeSeriesChannel::GnssQual,
        TimeSeriesChannel::GnssHdop,
        TimeSeriesChannel::NumSat,
        TimeSeriesChannel::WaterSpeed,
        TimeSeriesChannel::WaterDir,
    ];

    /// Payload keys for the selection flag and the data array.
    pub fn wire_keys(self) -> (&'static str, &'static str) {
        match self {
            TimeSeriesChannel::BoatSpeed => ("isBoatSpeed", "boatSpeedData"),
            TimeSeriesChannel::BoatDir => ("isBoatDir", "boatDirData"),
            TimeSeriesChannel::Heading => ("isHeading", "headingData"),
            TimeSeriesChannel::Pitch => ("isPitch", "pitchData"),
            TimeSeriesChannel::Roll => ("isRoll", "rollData"),
            TimeSeriesChannel::Temperature => ("isTemperature", "temperatureData"),
            TimeSeriesChannel::GnssQual => ("isGnssQual", "gnssQualData"),
            TimeSeriesChannel::GnssHdop => ("isGnssHdop", "gnssHdopData"),
            TimeSeriesChannel::NumSat => ("isNumSat", "numSatData"),
            TimeSeriesChannel::WaterSpeed => ("isWaterSpeed", "waterSpeedData"),
            TimeSeriesChannel::WaterDir => ("isWaterDir", "waterDirData"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesOptions {
    pub selected: BTreeSet<TimeSeriesChannel>,
    pub max_ens: u32,
}

impl TimeSeriesOptions {
    pub fn is_selected(&self, channel: TimeSeriesChannel) -> bool {
        self.selected.contains(&channel)
    }
}

impl Default for TimeSeriesOptions {
    fn default() -> Self {
        Self {
            selected: [TimeSeriesChannel::Heading, TimeSeriesChannel::Temperature]
                .into_iter()
                .collect(),
            max_ens: DEFAULT_MAX_ENSEMBLES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selection() {
        let options = TimeSeriesOptions::default();
        assert!(options.is_selected(TimeSeriesChannel::Heading));
        assert!(options.is_selected(TimeSeriesChannel::Temperature));
        assert!(!options.is_selected(TimeSeriesChannel::Pitch));
        assert_eq!(options.max_ens, 20);
    }

    #[test]
    fn test_wire_keys_are_unique() {
        let mut flags = BTreeSet::new();
        let mut data = BTreeSet::new();
        for channel in TimeSeriesChannel::ALL {
            let (flag, series) = channel.wire_keys();
            assert!(flags.insert(flag));
            assert!(data.insert(series));
        }
    }
}
