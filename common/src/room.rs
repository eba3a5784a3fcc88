use std::sync::Arc;

use chrono::{Datelike, Timelike};

use crate::{
    aggregate::AnyActive,
    config::ControllerConfig,
    error::{MeasurementError, RoomError},
    hysteresis::HysteresisSwitch,
    schedule::{ScheduleResolver, WeeklySchedule},
    topics::heating_source,
    types::{RoomStatus, RoomUpdate},
};

#[derive(Debug)]
pub struct RoomController {
    name: String,
    resolver: Arc<ScheduleResolver>,
    switch: HysteresisSwitch,
    valid_range: (f32, f32),
    last_update: Option<RoomUpdate>,
    last_error: Option<String>,
}

impl RoomController {
    pub fn new(name: impl Into<String>, config: &ControllerConfig, schedule: WeeklySchedule) -> Self {
        Self {
            name: name.into(),
            resolver: Arc::new(ScheduleResolver::new(schedule)),
            switch: HysteresisSwitch::new(config.hysteresis_band),
            valid_range: (config.min_valid_temp, config.max_valid_temp),
            last_update: None,
            last_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolver(&self) -> Arc<ScheduleResolver> {
        self.resolver.clone()
    }

    pub fn replace_schedule(&self, schedule: WeeklySchedule) {
        self.resolver.replace(schedule);
    }

    pub fn last_update(&self) -> Option<RoomUpdate> {
        self.last_update
    }

    pub fn parse_measurement(&self, payload: &str) -> Result<f32, MeasurementError> {
        let value = payload
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| MeasurementError::NotANumber(payload.to_string()))?;

        let (min, max) = self.valid_range;
        if !(min..=max).contains(&value) {
            return Err(MeasurementError::OutOfRange { value, min, max });
        }
        Ok(value)
    }

    /// An error leaves the switch, the aggregate and `last_update` unchanged.
    pub fn handle_measurement<T: Datelike + Timelike>(
        &mut self,
        payload: &str,
        now: &T,
        aggregate: &mut AnyActive,
    ) -> Result<RoomUpdate, RoomError> {
        let result = self.apply(payload, now, aggregate);
        self.last_error = result.as_ref().err().map(ToString::to_string);
        result
    }

    fn apply<T: Datelike + Timelike>(
        &mut self,
        payload: &str,
        now: &T,
        aggregate: &mut AnyActive,
    ) -> Result<RoomUpdate, RoomError> {
        let current = self.parse_measurement(payload)?;
        let target = self.resolver.target_at(now)?;

        let satisfied = self.switch.evaluate(current, target);
        let heating = !satisfied;
        let any_heating = aggregate.report(heating_source(&self.name), heating);

        let update = RoomUpdate {
            current,
            target,
            heating,
            any_heating,
        };
        self.last_update = Some(update);
        Ok(update)
    }

    pub fn status(&self) -> RoomStatus {
        RoomStatus {
            room: self.name.clone(),
            schedule_complete: self.resolver.snapshot().is_complete(),
            last_update: self.last_update,
            last_error: self.last_error.clone(),
        }
    }
}
