use thiserror::Error;

use crate::schedule::DayOfWeek;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("corrupt schedule: no entry list for {0}")]
    MissingDay(DayOfWeek),
    #[error("corrupt schedule: entry list for {0} is empty")]
    EmptyDay(DayOfWeek),
    #[error("corrupt schedule: invalid time {time:?} on {day}")]
    InvalidTime { day: DayOfWeek, time: String },
    #[error("corrupt schedule: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasurementError {
    #[error("measurement {0:?} is not a number")]
    NotANumber(String),
    #[error("measurement {value} outside plausible range {min}..={max}")]
    OutOfRange { value: f32, min: f32, max: f32 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoomError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Measurement(#[from] MeasurementError),
}
