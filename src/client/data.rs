//! Typed results returned by the controller facade.
//!
//! Frame-backed results are built from decoded [`ResponseFields`]; JSON-RPC
//! results are deserialized with serde using the device's camelCase names.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::protocol::ResponseFields;

/// Controller firmware version (`8B`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    /// Major.
    pub major: u8,
    /// Minor.
    pub minor: u8,
    /// Patch.
    pub patch: u16,
}

impl FirmwareVersion {
    pub(crate) fn from_fields(fields: &ResponseFields) -> Result<Self> {
        Ok(Self {
            major: fields.uint("major")? as u8,
            minor: fields.uint("minor")? as u8,
            patch: fields.uint("patch")? as u16,
        })
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Seasonal adjustment for one program (`B0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaterBudget {
    /// Program index.
    pub program: u8,
    /// Seasonal adjustment in percent.
    pub seasonal_adjust: u16,
}

impl WaterBudget {
    pub(crate) fn from_fields(fields: &ResponseFields) -> Result<Self> {
        Ok(Self {
            program: fields.uint("programCode")? as u8,
            seasonal_adjust: fields.uint("seasonalAdjust")? as u16,
        })
    }
}

/// Answer to `CommandSupportRequest` (`84`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandSupport {
    /// Opcode that was tested.
    pub command_echo: u8,
    /// Whether the controller implements it.
    pub supported: bool,
}

/// Timestamp of one controller event (`CA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventTimestamp {
    /// Event id.
    pub event_id: u8,
    /// Raw controller timestamp.
    pub timestamp: u32,
}

/// Snapshot from `CombinedControllerStateRequest` (`CC`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControllerState {
    /// Controller clock.
    pub device_time: NaiveDateTime,
    /// Rain delay in days.
    pub delay_setting: u16,
    /// Rain sensor tripped.
    pub sensor_state: bool,
    /// Irrigation enabled.
    pub irrigation_state: bool,
    /// Seasonal adjustment.
    pub seasonal_adjust: u16,
    /// Minutes left on the running station.
    pub remaining_runtime: u16,
    /// Running station, 0 when idle.
    pub active_station: u8,
}

impl ControllerState {
    pub(crate) fn from_fields(fields: &ResponseFields) -> Result<Self> {
        let date = date_from_fields(fields)?;
        let time = time_from_fields(fields)?;
        Ok(Self {
            device_time: date.and_time(time),
            delay_setting: fields.uint("delaySetting")? as u16,
            sensor_state: fields.uint("sensorState")? != 0,
            irrigation_state: fields.uint("irrigationState")? != 0,
            seasonal_adjust: fields.uint("seasonalAdjust")? as u16,
            remaining_runtime: fields.uint("remainingRuntime")? as u16,
            active_station: fields.uint("activeStation")? as u8,
        })
    }
}

pub(crate) fn time_from_fields(fields: &ResponseFields) -> Result<NaiveTime> {
    let (hour, minute, second) = (
        fields.uint("hour")?,
        fields.uint("minute")?,
        fields.uint("second")?,
    );
    NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32).ok_or_else(|| {
        Error::MalformedFrame(format!("invalid time {:02}:{:02}:{:02}", hour, minute, second))
    })
}

pub(crate) fn date_from_fields(fields: &ResponseFields) -> Result<NaiveDate> {
    let (year, month, day) = (
        fields.uint("year")?,
        fields.uint("month")?,
        fields.uint("day")?,
    );
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .ok_or_else(|| Error::MalformedFrame(format!("invalid date {}-{}-{}", year, month, day)))
}

/// `getWifiParams`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WifiParams {
    /// MAC address of the WiFi module.
    pub mac_address: Option<String>,
    /// LAN address.
    pub local_ip_address: Option<String>,
    /// LAN netmask.
    pub local_netmask: Option<String>,
    /// LAN gateway.
    pub local_gateway: Option<String>,
    /// Signal strength.
    pub rssi: Option<i32>,
    /// Joined network.
    pub wifi_ssid: Option<String>,
    /// Network password as stored on the module.
    pub wifi_password: Option<String>,
    /// Network security mode.
    pub wifi_security: Option<String>,
    /// Access point timeout without LAN.
    pub ap_timeout_no_lan: Option<u32>,
    /// Access point idle timeout.
    pub ap_timeout_idle: Option<u32>,
    /// Access point security mode.
    pub ap_security: Option<String>,
    /// Module firmware string.
    pub stick_version: Option<String>,
}

/// `getSettings`, and the `settings` member of the cloud schedule reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Number of programs.
    pub num_programs: u8,
    /// Programs excluded from weather adjustment, as hex.
    pub program_opt_out_mask: String,
    /// Postal code.
    #[serde(default)]
    pub code: Option<String>,
    /// Country.
    #[serde(default)]
    pub country: Option<String>,
    /// Weather adjustment disabled for every program.
    pub global_disable: bool,
    /// Soil type per program.
    #[serde(default, alias = "SoilTypes")]
    pub soil_types: Vec<i64>,
    /// Flow rate per program.
    #[serde(default, rename = "FlowRates")]
    pub flow_rates: Vec<i64>,
    /// Flow unit per program.
    #[serde(default, rename = "FlowUnits")]
    pub flow_units: Vec<i64>,
}

/// `getProgramInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProgramInfo {
    /// Soil type per program.
    pub soil_types: Vec<i64>,
    /// Flow rate per program.
    pub flow_rates: Vec<i64>,
    /// Flow unit per program.
    pub flow_units: Vec<i64>,
}

/// `getWeatherAdjustmentMask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherAdjustmentMask {
    /// Weather adjustment disabled for every program.
    pub global_disable: bool,
    /// Number of programs.
    pub num_programs: u8,
    /// Programs excluded from weather adjustment, as hex.
    pub program_opt_out_mask: String,
}

/// `getZipCode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipCode {
    /// Postal code.
    pub code: String,
    /// Country.
    pub country: String,
}

/// `getNetworkStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// LAN link up.
    pub network_up: bool,
    /// Internet reachable.
    pub internet_up: bool,
}

/// `getServerMode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMode {
    /// Cloud relay enabled.
    pub server_mode: bool,
    /// Check-in interval.
    pub check_in_interval: u32,
    /// Relay server URL.
    pub server_url: String,
    /// Relay timeout.
    pub relay_timeout: u32,
    /// Missed check-ins.
    pub missed_checkins: u32,
}

/// Cloud `requestScheduleAndSettings`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleAndSettings {
    /// Device status, e.g. `good`.
    pub status: Option<String>,
    /// Device settings.
    pub settings: Option<Settings>,
    /// Raw schedule frames keyed by request hex.
    pub schedule: BTreeMap<String, String>,
}

/// Controller section of the cloud weather reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudController {
    /// Configured stations.
    pub available_stations: Vec<u8>,
    /// User-assigned controller name.
    pub custom_name: Option<String>,
    /// User-assigned program names.
    pub custom_program_names: BTreeMap<String, String>,
    /// User-assigned station names.
    pub custom_station_names: BTreeMap<String, String>,
}

/// One forecast entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Forecast {
    /// Epoch seconds.
    #[serde(rename = "dateTime")]
    pub date_time: Option<i64>,
    /// Icon name.
    pub icon: Option<String>,
    /// Text summary.
    pub description: Option<String>,
    /// High temperature.
    pub high: Option<i32>,
    /// Low temperature.
    pub low: Option<i32>,
    /// Chance of rain in percent.
    pub chance_of_rain: Option<i32>,
    /// Precipitation.
    pub precip: Option<f64>,
}

/// Weather section of the cloud weather reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Weather {
    /// City.
    pub city: Option<String>,
    /// Forecast days.
    pub forecast: Vec<Forecast>,
    /// Location label.
    pub location: Option<String>,
    /// IANA zone id.
    pub time_zone_id: Option<String>,
    /// Raw UTC offset.
    pub time_zone_raw_offset: Option<String>,
}

/// Cloud `requestWeatherAndStatus`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WeatherAndStatus {
    /// Module id.
    pub stick_id: Option<String>,
    /// Controller names and stations.
    pub controller: Option<CloudController>,
    /// Forecasted rain, passed through.
    pub forecasted_rain: Option<serde_json::Value>,
    /// Weather and forecast.
    pub weather: Option<Weather>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandTable, ProtocolFrame};
    use serde_json::json;

    fn fields(hex: &str) -> ResponseFields {
        CommandTable::global()
            .decode_response(&ProtocolFrame::from_hex(hex).unwrap())
            .unwrap()
    }

    #[test]
    fn test_combined_state() {
        let state = ControllerState::from_fields(&fields("CC140B230817E700030001FFFF000000")).unwrap();
        assert_eq!(
            state.device_time,
            NaiveDate::from_ymd_opt(2023, 1, 8)
                .unwrap()
                .and_hms_opt(20, 11, 35)
                .unwrap()
        );
        assert_eq!(state.delay_setting, 3);
        assert!(!state.sensor_state);
        assert!(state.irrigation_state);
        assert_eq!(state.seasonal_adjust, 0xFFFF);
        assert_eq!(state.remaining_runtime, 0);
        assert_eq!(state.active_station, 0);
    }

    #[test]
    fn test_firmware_version() {
        let version = FirmwareVersion::from_fields(&fields("8B012F0000")).unwrap();
        assert_eq!((version.major, version.minor, version.patch), (1, 47, 0));
        assert_eq!(version.to_string(), "1.47.0");
    }

    #[test]
    fn test_invalid_time_is_malformed() {
        let err = time_from_fields(&fields("90190000")).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn test_wifi_params() {
        let params: WifiParams = serde_json::from_value(json!({
            "macAddress": "11:22:33:44:55:66",
            "localIpAddress": "192.168.1.10",
            "rssi": -59,
            "wifiSsid": "some-ssid",
            "apTimeoutNoLan": 20,
            "stickVersion": "Rain Bird Stick Rev C/1.63",
        }))
        .unwrap();
        assert_eq!(params.mac_address.as_deref(), Some("11:22:33:44:55:66"));
        assert_eq!(params.rssi, Some(-59));
        assert_eq!(params.ap_timeout_no_lan, Some(20));
        assert_eq!(params.local_gateway, None);
    }

    #[test]
    fn test_settings_both_soil_spellings() {
        let local: Settings = serde_json::from_value(json!({
            "country": "US",
            "code": "90210",
            "globalDisable": true,
            "numPrograms": 3,
            "programOptOutMask": "07",
            "SoilTypes": [1, 0, 0],
            "FlowRates": [0, 0, 0],
            "FlowUnits": [0, 0, 0],
        }))
        .unwrap();
        assert_eq!(local.soil_types, vec![1, 0, 0]);
        assert!(local.global_disable);

        let cloud: Settings = serde_json::from_value(json!({
            "FlowRates": [],
            "FlowUnits": [],
            "globalDisable": false,
            "numPrograms": 2,
            "programOptOutMask": "07",
            "soilTypes": [1, 0, 0],
        }))
        .unwrap();
        assert_eq!(cloud.soil_types, vec![1, 0, 0]);
        assert_eq!(cloud.code, None);
    }

    #[test]
    fn test_weather_and_status() {
        let status: WeatherAndStatus = serde_json::from_value(json!({
            "StickId": "0123",
            "Controller": {
                "availableStations": [1, 2],
                "customName": "Backyard",
                "customStationNames": {"1": "Lawn"},
            },
            "Weather": {
                "city": "Mountain View",
                "forecast": [{"dateTime": 1672531200, "high": 70, "precip": 0.1}],
                "timeZoneId": "America/Los_Angeles",
            },
        }))
        .unwrap();
        let controller = status.controller.unwrap();
        assert_eq!(controller.available_stations, vec![1, 2]);
        assert_eq!(controller.custom_station_names["1"], "Lawn");
        let weather = status.weather.unwrap();
        assert_eq!(weather.forecast[0].high, Some(70));
        assert_eq!(weather.time_zone_id.as_deref(), Some("America/Los_Angeles"));
    }
}
