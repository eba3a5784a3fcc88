use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use chrono::{Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const MINUTES_PER_DAY: i32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DayOfWeek {
    Sun,
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        Self::Sun,
        Self::Mon,
        Self::Tue,
        Self::Wed,
        Self::Thu,
        Self::Fri,
        Self::Sat,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Sun => 0,
            Self::Mon => 1,
            Self::Tue => 2,
            Self::Wed => 3,
            Self::Thu => 4,
            Self::Fri => 5,
            Self::Sat => 6,
        }
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 7]
    }

    pub fn from_chrono(weekday: Weekday) -> Self {
        Self::from_index(weekday.num_days_from_sunday() as usize)
    }

    pub fn previous(self) -> Self {
        Self::from_index(self.index() + 6)
    }

    pub fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sun => "Sun",
            Self::Mon => "Mon",
            Self::Tue => "Tue",
            Self::Wed => "Wed",
            Self::Thu => "Thu",
            Self::Fri => "Fri",
            Self::Sat => "Sat",
        }
    }
}

impl std::fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayAnchor {
    Previous,
    Same,
    Next,
}

impl DayAnchor {
    fn shift_minutes(self) -> i32 {
        match self {
            Self::Previous => -MINUTES_PER_DAY,
            Self::Same => 0,
            Self::Next => MINUTES_PER_DAY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotConfig {
    pub time: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeEntry {
    time: String,
    minutes: u16,
    temperature: f32,
    anchor: DayAnchor,
}

impl TimeEntry {
    pub fn new(day: DayOfWeek, slot: &SlotConfig) -> Result<Self, ConfigError> {
        let minutes = parse_time_of_day(&slot.time).ok_or_else(|| ConfigError::InvalidTime {
            day,
            time: slot.time.clone(),
        })?;

        Ok(Self {
            time: slot.time.clone(),
            minutes,
            temperature: slot.temperature,
            anchor: DayAnchor::Same,
        })
    }

    pub fn minutes(&self) -> u16 {
        self.minutes
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Minute value on the timeline of the day being resolved. Negative for a
    /// predecessor anchor, 1440 or more for a successor anchor.
    pub fn effective_minutes(&self) -> i32 {
        i32::from(self.minutes) + self.anchor.shift_minutes()
    }

    pub fn as_predecessor(&self) -> Self {
        self.anchored(DayAnchor::Previous)
    }

    pub fn as_successor(&self) -> Self {
        self.anchored(DayAnchor::Next)
    }

    fn anchored(&self, anchor: DayAnchor) -> Self {
        Self {
            anchor,
            ..self.clone()
        }
    }

    fn to_slot(&self) -> SlotConfig {
        SlotConfig {
            time: self.time.clone(),
            temperature: self.temperature,
        }
    }
}

/// Accepts `H:MM` / `HH:MM` with hours 0-23 and minutes 0-59.
fn parse_time_of_day(raw: &str) -> Option<u16> {
    let (hours, minutes) = raw.trim().split_once(':')?;
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(hours) || !all_digits(minutes) {
        return None;
    }

    let hours: u16 = hours.parse().ok()?;
    let minutes: u16 = minutes.parse().ok()?;
    if hours >= 24 || minutes >= 60 {
        return None;
    }
    Some(hours * 60 + minutes)
}

pub type ScheduleConfig = BTreeMap<DayOfWeek, Vec<SlotConfig>>;

// Days may be missing or empty; completeness is checked per lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleConfig", into = "ScheduleConfig")]
pub struct WeeklySchedule {
    days: BTreeMap<DayOfWeek, Vec<TimeEntry>>,
}

impl TryFrom<ScheduleConfig> for WeeklySchedule {
    type Error = ConfigError;

    fn try_from(config: ScheduleConfig) -> Result<Self, Self::Error> {
        let mut days = BTreeMap::new();
        for (day, slots) in config {
            let entries = slots
                .iter()
                .map(|slot| TimeEntry::new(day, slot))
                .collect::<Result<Vec<_>, _>>()?;
            days.insert(day, entries);
        }
        Ok(Self { days })
    }
}

impl From<WeeklySchedule> for ScheduleConfig {
    fn from(schedule: WeeklySchedule) -> Self {
        schedule
            .days
            .into_iter()
            .map(|(day, entries)| (day, entries.iter().map(TimeEntry::to_slot).collect()))
            .collect()
    }
}

impl WeeklySchedule {
    pub fn placeholder() -> Self {
        let mut days = BTreeMap::new();
        days.insert(DayOfWeek::Sun, Vec::new());
        Self { days }
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|err| ConfigError::Malformed(err.to_string()))
    }

    pub fn entries(&self, day: DayOfWeek) -> &[TimeEntry] {
        self.days.get(&day).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        DayOfWeek::ALL
            .iter()
            .all(|day| !self.entries(*day).is_empty())
    }

    fn required_entries(&self, day: DayOfWeek) -> Result<&[TimeEntry], ConfigError> {
        match self.days.get(&day) {
            None => Err(ConfigError::MissingDay(day)),
            Some(entries) if entries.is_empty() => Err(ConfigError::EmptyDay(day)),
            Some(entries) => Ok(entries),
        }
    }

    pub fn target_at<T: Datelike + Timelike>(&self, now: &T) -> Result<f32, ConfigError> {
        let day = DayOfWeek::from_chrono(now.weekday());
        let minute_of_day = (now.hour() * 60 + now.minute()) as i32;

        let today = self.required_entries(day)?;
        let previous = self.required_entries(day.previous())?;
        let next = self.required_entries(day.next())?;

        // Both are non-empty, checked above.
        let (Some(carried), Some(upcoming)) = (previous.last(), next.first()) else {
            return Err(ConfigError::EmptyDay(day));
        };

        let timeline = std::iter::once(carried.as_predecessor())
            .chain(today.iter().cloned())
            .chain(std::iter::once(upcoming.as_successor()));

        // An entry exactly at `minute_of_day` is not in effect yet.
        Ok(timeline
            .take_while(|entry| entry.effective_minutes() < minute_of_day)
            .last()
            .map_or(0.0, |entry| entry.temperature()))
    }
}

#[derive(Debug, Default)]
pub struct ScheduleResolver {
    current: RwLock<Arc<WeeklySchedule>>,
}

impl ScheduleResolver {
    pub fn new(schedule: WeeklySchedule) -> Self {
        Self {
            current: RwLock::new(Arc::new(schedule)),
        }
    }

    pub fn snapshot(&self) -> Arc<WeeklySchedule> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, schedule: WeeklySchedule) {
        let next = Arc::new(schedule);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn target_at<T: Datelike + Timelike>(&self, now: &T) -> Result<f32, ConfigError> {
        self.snapshot().target_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;

    // 2023-10-29 is a Sunday.
    fn at(day_of_month: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 10, day_of_month)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn slots(points: &[(&str, f32)]) -> Vec<SlotConfig> {
        points
            .iter()
            .map(|(time, temperature)| SlotConfig {
                time: time.to_string(),
                temperature: *temperature,
            })
            .collect()
    }

    fn house_schedule() -> WeeklySchedule {
        let mut config = ScheduleConfig::new();
        config.insert(DayOfWeek::Sun, slots(&[("08:00", 19.0), ("23:00", 17.0)]));
        config.insert(DayOfWeek::Mon, slots(&[("08:00", 21.0), ("22:00", 18.0)]));
        config.insert(DayOfWeek::Tue, slots(&[("07:00", 20.0)]));
        config.insert(DayOfWeek::Wed, slots(&[("07:00", 20.0), ("22:00", 17.5)]));
        config.insert(DayOfWeek::Thu, slots(&[("07:00", 20.0), ("22:00", 17.5)]));
        config.insert(DayOfWeek::Fri, slots(&[("07:00", 20.0), ("23:30", 16.0)]));
        config.insert(DayOfWeek::Sat, slots(&[("09:00", 21.5), ("23:30", 16.5)]));
        WeeklySchedule::try_from(config).unwrap()
    }

    #[test]
    fn carries_previous_day_into_early_morning() {
        let schedule = house_schedule();
        assert_eq!(schedule.target_at(&at(30, 3, 0)).unwrap(), 17.0);
    }

    #[test]
    fn exact_transition_minute_keeps_previous_value() {
        let schedule = house_schedule();
        assert_eq!(schedule.target_at(&at(30, 8, 0)).unwrap(), 17.0);
        assert_eq!(schedule.target_at(&at(30, 8, 1)).unwrap(), 21.0);
        assert_eq!(schedule.target_at(&at(30, 22, 0)).unwrap(), 21.0);
        assert_eq!(schedule.target_at(&at(30, 22, 1)).unwrap(), 18.0);
    }

    #[test]
    fn resolves_across_midnight() {
        let schedule = house_schedule();
        // Monday 23:59 still runs on Monday's 22:00 entry.
        assert_eq!(schedule.target_at(&at(30, 23, 59)).unwrap(), 18.0);
        // Tuesday 00:00 carries Monday's last value until Tuesday 07:00 takes over.
        assert_eq!(schedule.target_at(&at(31, 0, 0)).unwrap(), 18.0);
        assert_eq!(schedule.target_at(&at(31, 7, 0)).unwrap(), 18.0);
        assert_eq!(schedule.target_at(&at(31, 7, 1)).unwrap(), 20.0);
    }

    #[test]
    fn ignores_seconds() {
        let schedule = house_schedule();
        let now = NaiveDate::from_ymd_opt(2023, 10, 30)
            .unwrap()
            .and_hms_opt(8, 0, 59)
            .unwrap();
        assert_eq!(schedule.target_at(&now).unwrap(), 17.0);
    }

    #[test]
    fn sunday_wraps_to_saturday() {
        let schedule = house_schedule();
        // Sunday 03:00 carries Saturday 23:30.
        assert_eq!(schedule.target_at(&at(29, 3, 0)).unwrap(), 16.5);
    }

    #[test]
    fn saturday_looks_ahead_to_sunday() {
        let mut config = ScheduleConfig::from(house_schedule());
        config.remove(&DayOfWeek::Sun);
        let schedule = WeeklySchedule::try_from(config).unwrap();

        // 2023-10-28 is a Saturday; Sunday is its successor.
        assert_eq!(
            schedule.target_at(&at(28, 12, 0)),
            Err(ConfigError::MissingDay(DayOfWeek::Sun))
        );
    }

    #[test]
    fn entry_at_midnight_anchors_before_the_day() {
        let mut config = ScheduleConfig::from(house_schedule());
        config.insert(DayOfWeek::Mon, slots(&[("00:00", 22.0)]));
        let schedule = WeeklySchedule::try_from(config).unwrap();

        // Tuesday 00:00: Monday's 00:00 entry sits at -1440 and is in effect.
        assert_eq!(schedule.target_at(&at(31, 0, 0)).unwrap(), 22.0);
        // Monday 00:00: Monday's own 00:00 entry is not in effect yet.
        assert_eq!(schedule.target_at(&at(30, 0, 0)).unwrap(), 17.0);
    }

    #[test]
    fn missing_needed_day_is_config_error() {
        let mut config = ScheduleConfig::from(house_schedule());
        config.remove(&DayOfWeek::Tue);
        let schedule = WeeklySchedule::try_from(config).unwrap();

        assert_eq!(
            schedule.target_at(&at(30, 12, 0)),
            Err(ConfigError::MissingDay(DayOfWeek::Tue))
        );
        // Thursday does not need Tuesday.
        assert_eq!(schedule.target_at(&at(26, 12, 0)).unwrap(), 20.0);
    }

    #[test]
    fn empty_needed_day_is_config_error() {
        let mut config = ScheduleConfig::from(house_schedule());
        config.insert(DayOfWeek::Sun, Vec::new());
        let schedule = WeeklySchedule::try_from(config).unwrap();

        assert_eq!(
            schedule.target_at(&at(30, 12, 0)),
            Err(ConfigError::EmptyDay(DayOfWeek::Sun))
        );
        assert!(!schedule.is_complete());
    }

    #[test]
    fn placeholder_schedule_fails_lookup() {
        let schedule = WeeklySchedule::placeholder();
        assert!(schedule.target_at(&at(29, 12, 0)).is_err());
    }

    #[test]
    fn anchoring_does_not_touch_original_entry() {
        let entry = TimeEntry::new(
            DayOfWeek::Sun,
            &SlotConfig {
                time: "23:00".to_string(),
                temperature: 17.0,
            },
        )
        .unwrap();

        let predecessor = entry.as_predecessor();
        let successor = entry.as_successor();

        assert_eq!(entry.effective_minutes(), 1380);
        assert_eq!(predecessor.effective_minutes(), -60);
        assert_eq!(successor.effective_minutes(), 2820);
        assert_eq!(predecessor.temperature(), 17.0);
        assert_eq!(successor.minutes(), entry.minutes());
    }

    #[test]
    fn rejects_malformed_times() {
        for time in ["8", "24:00", "07:60", "ab:cd", "-1:30", "07:3x"] {
            let raw = format!(r#"{{"Mon": [{{"time": "{time}", "temperature": 20}}]}}"#);
            assert!(WeeklySchedule::from_json(&raw).is_err(), "{time} accepted");
        }
        let raw = r#"{"Mon": [{"time": "7:05", "temperature": 20}]}"#;
        let schedule = WeeklySchedule::from_json(raw).unwrap();
        assert_eq!(schedule.entries(DayOfWeek::Mon)[0].minutes(), 425);
    }

    #[test]
    fn json_keeps_configured_time_text() {
        let raw = r#"{"Sun":[{"time":"7:05","temperature":20.5}]}"#;
        let schedule = WeeklySchedule::from_json(raw).unwrap();
        assert_eq!(serde_json::to_string(&schedule).unwrap(), raw);
    }

    #[test]
    fn resolver_swaps_whole_snapshot() {
        let resolver = ScheduleResolver::new(WeeklySchedule::placeholder());
        let before = resolver.snapshot();
        assert!(resolver.target_at(&at(30, 3, 0)).is_err());

        resolver.replace(house_schedule());

        assert_eq!(resolver.target_at(&at(30, 3, 0)).unwrap(), 17.0);
        assert_eq!(*before, WeeklySchedule::placeholder());
    }
}
