//! Availability profiles: which days and hours a user takes meetings.

use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

/// Which audience a profile applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProfileContext {
    #[default]
    Standard,
    Priority,
}

impl ProfileContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Priority => "priority",
        }
    }
}

impl FromStr for ProfileContext {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "priority" => Ok(Self::Priority),
            other => Err(CalendarError::InvalidQuery(format!(
                "unknown profile context: {}",
                other
            ))),
        }
    }
}

/// Working-hours profile for one user and context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityProfile {
    #[serde(default)]
    pub context: ProfileContext,
    /// Enabled weekdays, e.g. `["mon", "tue"]`.
    #[serde(with = "weekday_list")]
    pub days: Vec<Weekday>,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub buffer_before_minutes: u32,
    #[serde(default)]
    pub buffer_after_minutes: u32,
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

fn default_slot_minutes() -> u32 {
    30
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

impl Default for AvailabilityProfile {
    fn default() -> Self {
        Self {
            context: ProfileContext::Standard,
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
            slot_minutes: default_slot_minutes(),
            time_zone: default_time_zone(),
        }
    }
}

/// Upper bound for buffers and slot sizes (one day).
const MAX_MINUTES: u32 = 24 * 60;

impl AvailabilityProfile {
    pub fn validate(&self) -> Result<(), CalendarError> {
        if self.days.is_empty() {
            return Err(CalendarError::InvalidQuery("at least one weekday is required".into()));
        }
        if self.start_time >= self.end_time {
            return Err(CalendarError::InvalidQuery(
                "window start must be before window end".into(),
            ));
        }
        if self.slot_minutes == 0 || self.slot_minutes > MAX_MINUTES {
            return Err(CalendarError::InvalidQuery(
                "granularity must be between 1 and 1440 minutes".into(),
            ));
        }
        if self.buffer_before_minutes > MAX_MINUTES || self.buffer_after_minutes > MAX_MINUTES {
            return Err(CalendarError::InvalidQuery("buffers cannot exceed one day".into()));
        }
        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, CalendarError> {
        parse_time_zone(&self.time_zone)
    }
}

pub fn parse_time_zone(name: &str) -> Result<Tz, CalendarError> {
    name.parse::<Tz>()
        .map_err(|_| CalendarError::InvalidQuery(format!("unknown time zone: {}", name)))
}

/// Parse a comma-separated weekday list such as `mon,wed,fri`.
pub fn parse_weekdays(value: &str) -> Result<Vec<Weekday>, CalendarError> {
    let mut days = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let day = part
            .parse::<Weekday>()
            .map_err(|_| CalendarError::InvalidQuery(format!("unknown weekday: {}", part)))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

/// Short lowercase weekday name used in storage and JSON.
pub fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime, CalendarError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| CalendarError::InvalidQuery(format!("expected HH:MM, got {}", value)))
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw).map_err(serde::de::Error::custom)
    }
}

mod weekday_list {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(days: &[Weekday], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(days.iter().map(|d| super::weekday_code(*d)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Weekday>, D::Error> {
        let raw = Vec::<String>::deserialize(d)?;
        super::parse_weekdays(&raw.join(",")).map_err(serde::de::Error::custom)
    }
}
