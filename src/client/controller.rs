//! The controller facade.
//!
//! `Controller` turns the command table, payload coder and transport into
//! typed operations. Cheap to clone: clones share the binding, the cache and
//! the retry slot. [`Controller::with_retry`] gives a clone its own retry
//! slot while keeping the same binding.

use std::future::Future;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::core::{Error, Result};
use crate::protocol::{
    CommandTable, Decoded, ModelAndVersion, ProtocolFrame, Queue, QueueAssembler, ResponseFields,
    Schedule, ScheduleAssembler, SchedulePage, SchedulePlan, StationSet,
};
use crate::payload::RpcChannel;
use crate::transport::{RetryPolicy, TransportBinding, with_optional_retry};

use super::data::{
    CommandSupport, ControllerState, EventTimestamp, FirmwareVersion, NetworkStatus, ProgramInfo,
    ScheduleAndSettings, ServerMode, Settings, WaterBudget, WeatherAdjustmentMask,
    WeatherAndStatus, WifiParams, ZipCode, date_from_fields, time_from_fields,
};

#[derive(Debug, Default)]
struct ControllerCache {
    model: RwLock<Option<ModelAndVersion>>,
    stations: RwLock<Option<StationSet>>,
    serial: RwLock<Option<u64>>,
}

async fn cached<T, F, Fut>(slot: &RwLock<Option<T>>, key: &'static str, load: F) -> Result<T>
where
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Some(value) = slot.read().await.as_ref() {
        trace!(key, "cache hit");
        return Ok(value.clone());
    }
    let value = load().await?;
    *slot.write().await = Some(value.clone());
    Ok(value)
}

/// Typed access to one controller.
#[derive(Debug, Clone)]
pub struct Controller {
    local: RpcChannel,
    cloud: Option<RpcChannel>,
    cache: Arc<ControllerCache>,
    retry: Arc<RwLock<Option<RetryPolicy>>>,
    busy_policy: RetryPolicy,
}

impl Controller {
    /// Build a facade over a local channel and an optional cloud channel.
    ///
    /// `busy_policy` is switched on when the model reports that it needs it.
    pub fn new(local: RpcChannel, cloud: Option<RpcChannel>, busy_policy: RetryPolicy) -> Self {
        Self {
            local,
            cloud,
            cache: Arc::new(ControllerCache::default()),
            retry: Arc::new(RwLock::new(None)),
            busy_policy,
        }
    }

    /// The local binding, shared with every clone.
    pub fn binding(&self) -> &Arc<TransportBinding> {
        self.local.binding()
    }

    /// Retry policy currently in force.
    pub async fn retry_policy(&self) -> Option<RetryPolicy> {
        *self.retry.read().await
    }

    /// A clone that retries busy replies under `policy`.
    ///
    /// The binding and cache are shared; discovery is not run again.
    pub fn with_retry(&self, policy: RetryPolicy) -> Self {
        Self {
            retry: Arc::new(RwLock::new(Some(policy))),
            ..self.clone()
        }
    }

    /// Record a model answer obtained elsewhere, e.g. by discovery.
    pub async fn seed_model(&self, model: ModelAndVersion) {
        *self.cache.model.write().await = Some(model);
        self.apply_model_policy(&model).await;
    }

    async fn apply_model_policy(&self, model: &ModelAndVersion) {
        if model.model_info().retries {
            debug!(model = %model, "enabling busy retry");
            *self.retry.write().await = Some(self.busy_policy);
        }
    }

    /// Send any registered command by name and return the decoded reply.
    pub async fn send(&self, command: &str, params: &[(&str, u64)]) -> Result<Decoded> {
        let table = CommandTable::global();
        let descriptor = table.command(command)?;
        let frame = table.encode(command, params)?;
        let policy = *self.retry.read().await;
        let local = &self.local;
        let frame = &frame;
        with_optional_retry(policy, move || local.execute(descriptor, frame)).await
    }

    async fn fields(&self, command: &'static str, params: &[(&str, u64)]) -> Result<ResponseFields> {
        match self.send(command, params).await? {
            Decoded::Fields(fields) => Ok(fields),
            other => Err(unexpected(command, &other)),
        }
    }

    async fn ack(&self, command: &'static str, params: &[(&str, u64)]) -> Result<()> {
        match self.send(command, params).await? {
            Decoded::Ack { .. } => Ok(()),
            other => Err(unexpected(command, &other)),
        }
    }

    async fn page(&self, command: &'static str, params: &[(&str, u64)]) -> Result<ProtocolFrame> {
        match self.send(command, params).await? {
            Decoded::Page(_, frame) => Ok(frame),
            other => Err(unexpected(command, &other)),
        }
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        channel: &RpcChannel,
        method: &'static str,
        params: Value,
    ) -> Result<T> {
        let policy = *self.retry.read().await;
        let params = &params;
        let result =
            with_optional_retry(policy, move || channel.call(method, params.clone())).await?;
        serde_json::from_value(result).map_err(|e| Error::UnexpectedResponse {
            command: method,
            expected: "result object".into(),
            actual: e.to_string(),
        })
    }

    fn cloud(&self) -> Result<&RpcChannel> {
        self.cloud
            .as_ref()
            .ok_or_else(|| Error::Config("cloud client not configured".into()))
    }

    /// Model and protocol revision. Cached; may enable busy retry.
    pub async fn get_model_and_version(&self) -> Result<ModelAndVersion> {
        if let Some(model) = *self.cache.model.read().await {
            trace!(key = "model", "cache hit");
            return Ok(model);
        }
        let model = ModelAndVersion::from_fields(&self.fields("ModelAndVersionRequest", &[]).await?)?;
        self.seed_model(model).await;
        Ok(model)
    }

    /// Stations configured on the controller. Cached.
    pub async fn get_available_stations(&self) -> Result<StationSet> {
        cached(&self.cache.stations, "stations", || async move {
            let fields = self.fields("AvailableStationsRequest", &[("page", 0)]).await?;
            fields.stations("setStations").cloned()
        })
        .await
    }

    /// Serial number. Cached.
    pub async fn get_serial_number(&self) -> Result<u64> {
        cached(&self.cache.serial, "serial", || async move {
            self.fields("SerialNumberRequest", &[]).await?.uint("serialNumber")
        })
        .await
    }

    /// Firmware version.
    pub async fn get_controller_firmware_version(&self) -> Result<FirmwareVersion> {
        FirmwareVersion::from_fields(&self.fields("ControllerFirmwareVersionRequest", &[]).await?)
    }

    /// Controller clock time.
    pub async fn get_current_time(&self) -> Result<NaiveTime> {
        time_from_fields(&self.fields("CurrentTimeRequest", &[]).await?)
    }

    /// Set the controller clock time.
    pub async fn set_current_time(&self, time: NaiveTime) -> Result<()> {
        let params = [
            ("hour", u64::from(time.hour())),
            ("minute", u64::from(time.minute())),
            ("second", u64::from(time.second())),
        ];
        self.ack("SetCurrentTimeRequest", &params).await
    }

    /// Controller calendar date.
    pub async fn get_current_date(&self) -> Result<NaiveDate> {
        date_from_fields(&self.fields("CurrentDateRequest", &[]).await?)
    }

    /// Set the controller calendar date.
    pub async fn set_current_date(&self, date: NaiveDate) -> Result<()> {
        let year = u64::try_from(date.year()).map_err(|_| Error::InvalidParameter {
            command: "SetCurrentDateRequest",
            field: "year".into(),
            reason: format!("{} is negative", date.year()),
        })?;
        let params = [
            ("day", u64::from(date.day())),
            ("month", u64::from(date.month())),
            ("year", year),
        ];
        self.ack("SetCurrentDateRequest", &params).await
    }

    /// Seasonal adjustment for `program`.
    pub async fn water_budget(&self, program: u8) -> Result<WaterBudget> {
        let params = [("programCode", u64::from(program))];
        WaterBudget::from_fields(&self.fields("WaterBudgetRequest", &params).await?)
    }

    /// Whether the rain sensor is tripped.
    pub async fn get_rain_sensor_state(&self) -> Result<bool> {
        let fields = self.fields("CurrentRainSensorStateRequest", &[]).await?;
        Ok(fields.uint("sensorState")? != 0)
    }

    /// Stations currently running.
    pub async fn get_zone_states(&self) -> Result<StationSet> {
        let fields = self.fields("CurrentStationsActiveRequest", &[("page", 0)]).await?;
        fields.stations("activeStations").cloned()
    }

    /// Whether `zone` is running.
    pub async fn get_zone_state(&self, zone: u8) -> Result<bool> {
        Ok(self.get_zone_states().await?.contains(zone))
    }

    /// Start a program.
    pub async fn set_program(&self, program: u8) -> Result<()> {
        self.ack("ManuallyRunProgramRequest", &[("program", u64::from(program))])
            .await
    }

    /// Run a station briefly to test it.
    pub async fn test_zone(&self, zone: u8) -> Result<()> {
        self.ack("TestStationsRequest", &[("zone", u64::from(zone))]).await
    }

    /// Run `zone` for `minutes`.
    pub async fn irrigate_zone(&self, zone: u8, minutes: u8) -> Result<()> {
        let params = [("zone", u64::from(zone)), ("minutes", u64::from(minutes))];
        self.ack("ManuallyRunStationRequest", &params).await
    }

    /// Stop all irrigation.
    pub async fn stop_irrigation(&self) -> Result<()> {
        self.ack("StopIrrigationRequest", &[]).await
    }

    /// Rain delay in days.
    pub async fn get_rain_delay(&self) -> Result<u16> {
        let fields = self.fields("RainDelayGetRequest", &[]).await?;
        Ok(fields.uint("delaySetting")? as u16)
    }

    /// Set the rain delay in days.
    pub async fn set_rain_delay(&self, days: u16) -> Result<()> {
        self.ack("RainDelaySetRequest", &[("days", u64::from(days))]).await
    }

    /// Advance to the next station.
    pub async fn advance_zone(&self, param: u8) -> Result<()> {
        self.ack("AdvanceStationRequest", &[("param", u64::from(param))])
            .await
    }

    /// Whether irrigation is enabled.
    pub async fn get_current_irrigation(&self) -> Result<bool> {
        let fields = self.fields("CurrentIrrigationStateRequest", &[]).await?;
        Ok(fields.uint("irrigationState")? != 0)
    }

    /// Enable or disable irrigation.
    pub async fn set_irrigation_state(&self, enabled: bool) -> Result<()> {
        self.ack("IrrigationStateSetRequest", &[("state", u64::from(enabled))])
            .await
    }

    /// Timestamp of controller event `event_id`.
    pub async fn get_event_timestamp(&self, event_id: u8) -> Result<EventTimestamp> {
        let fields = self
            .fields("ControllerEventTimestampRequest", &[("eventId", u64::from(event_id))])
            .await?;
        Ok(EventTimestamp {
            event_id: fields.uint("eventId")? as u8,
            timestamp: fields.uint("timestamp")? as u32,
        })
    }

    /// Clock, rain delay, sensor and irrigation state in one request.
    pub async fn get_combined_controller_state(&self) -> Result<ControllerState> {
        ControllerState::from_fields(&self.fields("CombinedControllerStateRequest", &[]).await?)
    }

    /// Whether the controller implements `opcode`.
    pub async fn test_command_support(&self, opcode: u8) -> Result<CommandSupport> {
        let fields = self
            .fields("CommandSupportRequest", &[("commandToTest", u64::from(opcode))])
            .await?;
        Ok(CommandSupport {
            command_echo: fields.uint("commandEcho")? as u8,
            supported: fields.uint("support")? != 0,
        })
    }

    /// One raw schedule page.
    pub async fn get_schedule_command(&self, code: u16) -> Result<SchedulePage> {
        let frame = self
            .page("RetrieveScheduleRequest", &[("commandCode", u64::from(code))])
            .await?;
        SchedulePage::parse(&frame).map(|(_, page)| page)
    }

    /// The full schedule.
    ///
    /// Pages are requested one at a time. A failing page aborts the whole
    /// read with [`Error::SchedulePageFailed`].
    pub async fn get_schedule(&self) -> Result<Schedule> {
        let model = self.get_model_and_version().await?;
        let stations = self.get_available_stations().await?;
        let plan = SchedulePlan::new(model.model_info().max_programs, stations.capacity());
        let pages = plan.pages().to_vec();
        debug!(pages = pages.len(), stations = stations.len(), "loading schedule");

        let mut assembler = ScheduleAssembler::new(plan, stations);
        for page in pages {
            let frame = self
                .page("RetrieveScheduleRequest", &[("commandCode", u64::from(page))])
                .await
                .map_err(|source| Error::SchedulePageFailed {
                    page,
                    source: Box::new(source),
                })?;
            assembler.accept(&frame)?;
        }
        assembler.finish()
    }

    /// Station runs waiting on the controller.
    pub async fn get_queue(&self) -> Result<Queue> {
        let mut assembler = QueueAssembler::new();
        while let Some(page) = assembler.next_page() {
            let frame = self
                .page("CurrentQueueRequest", &[("page", u64::from(page))])
                .await?;
            if assembler.accept(&frame)? {
                break;
            }
        }
        assembler.finish()
    }

    /// `getWifiParams`.
    pub async fn get_wifi_params(&self) -> Result<WifiParams> {
        self.rpc(&self.local, "getWifiParams", json!({})).await
    }

    /// `getSettings`.
    pub async fn get_settings(&self) -> Result<Settings> {
        self.rpc(&self.local, "getSettings", json!({})).await
    }

    /// `getWeatherAdjustmentMask`.
    pub async fn get_weather_adjustment_mask(&self) -> Result<WeatherAdjustmentMask> {
        self.rpc(&self.local, "getWeatherAdjustmentMask", json!({}))
            .await
    }

    /// `getZipCode`.
    pub async fn get_zip_code(&self) -> Result<ZipCode> {
        self.rpc(&self.local, "getZipCode", json!({})).await
    }

    /// `getProgramInfo`.
    pub async fn get_program_info(&self) -> Result<ProgramInfo> {
        self.rpc(&self.local, "getProgramInfo", json!({})).await
    }

    /// `getNetworkStatus`.
    pub async fn get_network_status(&self) -> Result<NetworkStatus> {
        self.rpc(&self.local, "getNetworkStatus", json!({})).await
    }

    /// `getServerMode`.
    pub async fn get_server_mode(&self) -> Result<ServerMode> {
        self.rpc(&self.local, "getServerMode", json!({})).await
    }

    /// Call any local JSON-RPC method and return the raw result.
    pub async fn test_rpc_support(&self, method: &str) -> Result<Value> {
        self.local.call(method, json!({})).await
    }

    /// Schedule and settings from the cloud.
    pub async fn get_schedule_and_settings(&self, stick_id: &str) -> Result<ScheduleAndSettings> {
        let cloud = self.cloud()?;
        self.rpc(cloud, "requestScheduleAndSettings", json!({ "StickId": stick_id }))
            .await
    }

    /// Weather, forecast and display names from the cloud.
    pub async fn get_weather_and_status(
        &self,
        stick_id: &str,
        country: &str,
        zip_code: &str,
    ) -> Result<WeatherAndStatus> {
        let cloud = self.cloud()?;
        let params = json!({
            "Country": country,
            "StickId": stick_id,
            "ZipCode": zip_code,
        });
        self.rpc(cloud, "requestWeatherAndStatus", params).await
    }
}

fn unexpected(command: &'static str, decoded: &Decoded) -> Error {
    let expected = CommandTable::global()
        .command(command)
        .map(|c| format!("{:02X}", c.response_opcode))
        .unwrap_or_default();
    let actual = match decoded {
        Decoded::Ack { .. } => "01".to_string(),
        Decoded::Fields(fields) => format!("{:02X}", fields.opcode),
        Decoded::Page(_, frame) => format!("{:02X}", frame.opcode()),
    };
    Error::UnexpectedResponse {
        command,
        expected,
        actual,
    }
}
