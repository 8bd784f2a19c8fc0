//! Fare modifiers: zone surcharges and time, weather, event and surge multipliers

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::scope::Scope;
use crate::error::ValidationError;

/// Serde adapter for `HH:MM` wall-clock times
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Parse an `HH:MM` string
pub fn parse_hhmm(raw: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|_| ValidationError::TimeOfDay(raw.to_string()))
}

/// Minutes since midnight, the resolution of `HH:MM` windows
fn minute_of_day<T: Timelike>(time: &T) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Inclusive time-of-day window; wraps midnight when `start > end`
pub fn window_contains<T: Timelike>(start: NaiveTime, end: NaiveTime, now: &T) -> bool {
    let (start, end, now) = (minute_of_day(&start), minute_of_day(&end), minute_of_day(now));
    if start <= end {
        start <= now && now <= end
    } else {
        now >= start || now <= end
    }
}

fn validate_days(days: &[u8]) -> Result<(), ValidationError> {
    match days.iter().find(|d| **d > 6) {
        Some(day) => Err(ValidationError::OutOfRange {
            field: "days_of_week",
            reason: format!("{day} not in 0..=6"),
        }),
        None => Ok(()),
    }
}

fn validate_multiplier(value: Decimal) -> Result<(), ValidationError> {
    if value <= Decimal::ZERO {
        return Err(ValidationError::NotPositive { field: "multiplier" });
    }
    Ok(())
}

/// Optional recurring schedule restricting when a zone fee applies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneFeeSchedule {
    /// 0 = Sunday .. 6 = Saturday; empty means every day
    pub days_of_week: Vec<u8>,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

impl ZoneFeeSchedule {
    /// Evaluate against a wall-clock (weekday from Sunday, time of day)
    pub fn is_open<T: Datelike + Timelike>(&self, wall_clock: &T) -> bool {
        let weekday = wall_clock.weekday().num_days_from_sunday() as u8;
        let day_ok = self.days_of_week.is_empty() || self.days_of_week.contains(&weekday);
        day_ok && window_contains(self.start_time, self.end_time, wall_clock)
    }
}

/// Surcharge attached to a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneFee {
    pub id: i64,
    pub version_id: i64,
    pub zone_id: i64,
    /// Free-form tag such as `pickup_fee` or `toll`
    pub fee_type: String,
    pub ride_type_id: Option<i64>,
    pub amount: Decimal,
    /// When set, `amount` is a percentage of the pre-multiplier base sum
    pub is_percentage: bool,
    pub applies_pickup: bool,
    pub applies_dropoff: bool,
    pub schedule: Option<ZoneFeeSchedule>,
}

impl ZoneFee {
    pub fn fixed(zone_id: i64, fee_type: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id: 0,
            version_id: 0,
            zone_id,
            fee_type: fee_type.into(),
            ride_type_id: None,
            amount,
            is_percentage: false,
            applies_pickup: true,
            applies_dropoff: true,
            schedule: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.applies_pickup && !self.applies_dropoff {
            return Err(ValidationError::Other(
                "zone fee must apply to pickup, dropoff, or both".to_string(),
            ));
        }
        if self.amount < Decimal::ZERO {
            return Err(ValidationError::Negative { field: "amount" });
        }
        if self.fee_type.trim().is_empty() {
            return Err(ValidationError::Other("fee_type must not be empty".to_string()));
        }
        if let Some(schedule) = &self.schedule {
            validate_days(&schedule.days_of_week)?;
        }
        Ok(())
    }
}

/// Named window of increased or decreased pricing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeMultiplier {
    pub id: i64,
    pub version_id: i64,
    pub name: String,
    #[serde(flatten)]
    pub scope: Scope,
    /// 0 = Sunday .. 6 = Saturday
    pub days_of_week: Vec<u8>,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub multiplier: Decimal,
    pub priority: i32,
}

impl TimeMultiplier {
    /// Day and time-of-day match, with midnight wrap
    pub fn matches<T: Datelike + Timelike>(&self, wall_clock: &T) -> bool {
        let weekday = wall_clock.weekday().num_days_from_sunday() as u8;
        self.days_of_week.contains(&weekday)
            && window_contains(self.start_time, self.end_time, wall_clock)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.scope.validate_without_zone()?;
        validate_days(&self.days_of_week)?;
        validate_multiplier(self.multiplier)
    }
}

/// Weather conditions with a configurable multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    Cloudy,
    Rain,
    HeavyRain,
    Snow,
    Storm,
    ExtremeHeat,
    Fog,
}

impl WeatherCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCondition::Clear => "clear",
            WeatherCondition::Cloudy => "cloudy",
            WeatherCondition::Rain => "rain",
            WeatherCondition::HeavyRain => "heavy_rain",
            WeatherCondition::Snow => "snow",
            WeatherCondition::Storm => "storm",
            WeatherCondition::ExtremeHeat => "extreme_heat",
            WeatherCondition::Fog => "fog",
        }
    }

    /// Parse a caller-supplied condition; empty input means no condition
    pub fn parse_optional(raw: &str) -> Result<Option<Self>, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeatherCondition {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clear" => Ok(WeatherCondition::Clear),
            "cloudy" => Ok(WeatherCondition::Cloudy),
            "rain" => Ok(WeatherCondition::Rain),
            "heavy_rain" => Ok(WeatherCondition::HeavyRain),
            "snow" => Ok(WeatherCondition::Snow),
            "storm" => Ok(WeatherCondition::Storm),
            "extreme_heat" => Ok(WeatherCondition::ExtremeHeat),
            "fog" => Ok(WeatherCondition::Fog),
            other => Err(ValidationError::UnknownWeather(other.to_string())),
        }
    }
}

/// Multiplier applied under a weather condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherMultiplier {
    pub id: i64,
    pub version_id: i64,
    #[serde(flatten)]
    pub scope: Scope,
    pub weather_condition: WeatherCondition,
    pub multiplier: Decimal,
}

impl WeatherMultiplier {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.scope.validate_without_zone()?;
        validate_multiplier(self.multiplier)
    }
}

/// Demand multiplier around a scheduled event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMultiplier {
    pub id: i64,
    pub version_id: i64,
    pub city_id: Option<i64>,
    pub zone_id: Option<i64>,
    pub event_name: String,
    pub event_type: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub pre_event_minutes: u32,
    pub post_event_minutes: u32,
    pub multiplier: Decimal,
    pub expected_demand_increase: Option<Decimal>,
}

impl EventMultiplier {
    /// Closed interval `[starts_at - pre, ends_at + post]`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        let opens = self.starts_at - Duration::minutes(i64::from(self.pre_event_minutes));
        let closes = self.ends_at + Duration::minutes(i64::from(self.post_event_minutes));
        opens <= now && now <= closes
    }

    /// Zone-scoped events match the pickup zone; city-scoped events match the city
    pub fn applies_to(&self, city_id: Option<i64>, zone_id: Option<i64>) -> bool {
        match (self.zone_id, self.city_id) {
            (Some(zone), _) => zone_id == Some(zone),
            (None, Some(city)) => city_id == Some(city),
            (None, None) => false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.city_id.is_none() && self.zone_id.is_none() {
            return Err(ValidationError::Scope(
                "event needs a city_id or zone_id".to_string(),
            ));
        }
        if self.ends_at < self.starts_at {
            return Err(ValidationError::OutOfRange {
                field: "ends_at",
                reason: "must not precede starts_at".to_string(),
            });
        }
        validate_multiplier(self.multiplier)
    }
}

/// Surge tier keyed by demand/supply ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeThreshold {
    pub id: i64,
    pub version_id: i64,
    #[serde(flatten)]
    pub scope: Scope,
    pub demand_supply_ratio_min: Decimal,
    /// Exclusive upper bound; `None` means unbounded
    pub demand_supply_ratio_max: Option<Decimal>,
    pub multiplier: Decimal,
}

impl SurgeThreshold {
    /// `ratio_min <= ratio < ratio_max`
    pub fn contains(&self, ratio: Decimal) -> bool {
        ratio >= self.demand_supply_ratio_min
            && self.demand_supply_ratio_max.map_or(true, |max| ratio < max)
    }

    /// Half-open ranges of two tiers intersect
    pub fn overlaps(&self, other: &SurgeThreshold) -> bool {
        let below_other_end = other
            .demand_supply_ratio_max
            .map_or(true, |max| self.demand_supply_ratio_min < max);
        let other_below_end = self
            .demand_supply_ratio_max
            .map_or(true, |max| other.demand_supply_ratio_min < max);
        below_other_end && other_below_end
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.scope.validate_without_zone()?;
        if self.demand_supply_ratio_min < Decimal::ZERO {
            return Err(ValidationError::Negative {
                field: "demand_supply_ratio_min",
            });
        }
        if let Some(max) = self.demand_supply_ratio_max {
            if max <= self.demand_supply_ratio_min {
                return Err(ValidationError::OutOfRange {
                    field: "demand_supply_ratio_max",
                    reason: "must exceed demand_supply_ratio_min".to_string(),
                });
            }
        }
        validate_multiplier(self.multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn t(raw: &str) -> NaiveTime {
        parse_hhmm(raw).unwrap()
    }

    #[test]
    fn test_window_without_wrap() {
        assert!(window_contains(t("07:00"), t("09:00"), &t("07:00")));
        assert!(window_contains(t("07:00"), t("09:00"), &t("09:00")));
        assert!(!window_contains(t("07:00"), t("09:00"), &t("09:01")));
    }

    #[test]
    fn test_window_wraps_midnight() {
        assert!(window_contains(t("22:00"), t("04:00"), &t("23:30")));
        assert!(window_contains(t("22:00"), t("04:00"), &t("03:59")));
        assert!(!window_contains(t("22:00"), t("04:00"), &t("12:00")));
    }

    #[test]
    fn test_time_multiplier_matches_day() {
        let row = TimeMultiplier {
            id: 1,
            version_id: 1,
            name: "friday night".into(),
            scope: Scope::global(),
            days_of_week: vec![5],
            start_time: t("20:00"),
            end_time: t("02:00"),
            multiplier: dec!(1.3),
            priority: 1,
        };
        // 2024-03-01 is a Friday
        let friday = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(21, 15, 0)
            .unwrap();
        let saturday = friday + Duration::days(1);
        assert!(row.matches(&friday));
        assert!(!row.matches(&saturday));
    }

    #[test]
    fn test_hhmm_serde() {
        let schedule = ZoneFeeSchedule {
            days_of_week: vec![1, 2],
            start_time: t("06:30"),
            end_time: t("10:00"),
        };
        let json = serde_json::to_value(&schedule).unwrap();
        assert_eq!(json["start_time"], "06:30");
        let back: ZoneFeeSchedule = serde_json::from_value(json).unwrap();
        assert_eq!(back, schedule);
    }

    #[test]
    fn test_event_window_is_closed_and_widened() {
        let starts = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        let event = EventMultiplier {
            id: 1,
            version_id: 1,
            city_id: Some(3),
            zone_id: None,
            event_name: "Concert".into(),
            event_type: "concert".into(),
            starts_at: starts,
            ends_at: starts + Duration::hours(3),
            pre_event_minutes: 60,
            post_event_minutes: 30,
            multiplier: dec!(1.5),
            expected_demand_increase: None,
        };
        assert!(event.is_active_at(starts - Duration::minutes(60)));
        assert!(!event.is_active_at(starts - Duration::minutes(61)));
        assert!(event.is_active_at(starts + Duration::minutes(210)));
        assert!(!event.is_active_at(starts + Duration::minutes(211)));
        assert!(event.applies_to(Some(3), Some(99)));
        assert!(!event.applies_to(Some(4), None));
    }

    #[test]
    fn test_surge_threshold_overlap() {
        let tier = |min: Decimal, max: Option<Decimal>| SurgeThreshold {
            id: 0,
            version_id: 1,
            scope: Scope::global(),
            demand_supply_ratio_min: min,
            demand_supply_ratio_max: max,
            multiplier: dec!(1.5),
        };
        let low = tier(dec!(1.0), Some(dec!(2.0)));
        let high = tier(dec!(2.0), None);
        let mid = tier(dec!(1.5), Some(dec!(2.5)));
        assert!(!low.overlaps(&high));
        assert!(low.overlaps(&mid));
        assert!(high.overlaps(&mid));
        assert!(low.contains(dec!(1.0)));
        assert!(!low.contains(dec!(2.0)));
        assert!(high.contains(dec!(50)));
    }

    #[test]
    fn test_weather_parsing() {
        assert_eq!(WeatherCondition::parse_optional("").unwrap(), None);
        assert_eq!(
            WeatherCondition::parse_optional("Heavy_Rain").unwrap(),
            Some(WeatherCondition::HeavyRain)
        );
        assert!(WeatherCondition::parse_optional("hail").is_err());
    }

    #[test]
    fn test_zone_fee_requires_a_side() {
        let mut fee = ZoneFee::fixed(7, "airport", dec!(4.50));
        assert!(fee.validate().is_ok());
        fee.applies_pickup = false;
        fee.applies_dropoff = false;
        assert!(fee.validate().is_err());
    }
}
