pub mod aggregate;
pub mod config;
pub mod error;
pub mod hysteresis;
pub mod room;
pub mod schedule;
pub mod topics;
pub mod types;

pub use aggregate::AnyActive;
pub use config::{ControllerConfig, NetworkConfig, RuntimeConfig};
pub use error::{ConfigError, MeasurementError, RoomError};
pub use hysteresis::HysteresisSwitch;
pub use room::RoomController;
pub use schedule::{DayOfWeek, ScheduleResolver, SlotConfig, TimeEntry, WeeklySchedule};
pub use topics::*;
pub use types::{ControllerStatus, RelayFormat, RoomStatus, RoomUpdate};
