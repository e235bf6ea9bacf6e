//! Controller facade, its configuration and typed results.

mod config;
mod connect;
mod controller;
mod data;

pub use config::{ControllerBuilder, ControllerConfig};
#[cfg(feature = "http")]
pub use connect::create_controller;
pub use controller::Controller;
pub use data::{
    CloudController, CommandSupport, ControllerState, EventTimestamp, FirmwareVersion, Forecast,
    NetworkStatus, ProgramInfo, ScheduleAndSettings, ServerMode, Settings, WaterBudget, Weather,
    WeatherAdjustmentMask, WeatherAndStatus, WifiParams, ZipCode,
};
