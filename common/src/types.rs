use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayFormat {
    #[default]
    OnOff,
    LogicLevel,
}

impl RelayFormat {
    pub fn payload(self, active: bool) -> &'static str {
        match (self, active) {
            (Self::OnOff, true) => "ON",
            (Self::OnOff, false) => "OFF",
            (Self::LogicLevel, true) => "1",
            (Self::LogicLevel, false) => "0",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoomUpdate {
    #[serde(rename = "currentTemperature")]
    pub current: f32,
    #[serde(rename = "targetTemperature")]
    pub target: f32,
    pub heating: bool,
    #[serde(rename = "anyHeating")]
    pub any_heating: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room: String,
    #[serde(rename = "scheduleComplete")]
    pub schedule_complete: bool,
    #[serde(rename = "lastUpdate")]
    pub last_update: Option<RoomUpdate>,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    #[serde(rename = "anyHeating")]
    pub any_heating: bool,
    pub relay: &'static str,
    pub timezone: String,
    pub rooms: Vec<RoomStatus>,
}
