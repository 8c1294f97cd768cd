//! Time-of-day periods and occupancy factors.

use crate::error::{LossError, LossResult};
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Period of the day that determines where people are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    /// 10:00 to 18:00.
    Day,
    /// 22:00 to 06:00.
    Night,
    /// 06:00 to 10:00 and 18:00 to 22:00.
    Transit,
}

impl TimeOfDay {
    /// All periods.
    pub const ALL: [TimeOfDay; 3] = [TimeOfDay::Day, TimeOfDay::Night, TimeOfDay::Transit];

    /// Classifies a local hour (0-23).
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            10..=17 => TimeOfDay::Day,
            0..=5 | 22..=23 => TimeOfDay::Night,
            _ => TimeOfDay::Transit,
        }
    }

    /// Classifies a UTC instant after shifting it into local time.
    pub fn from_utc(time: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self::from_hour(time.with_timezone(&offset).hour())
    }

    /// Column label of the period.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Day => "day",
            TimeOfDay::Night => "night",
            TimeOfDay::Transit => "transit",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(TimeOfDay::Day),
            "night" => Ok(TimeOfDay::Night),
            "transit" => Ok(TimeOfDay::Transit),
            _ => Err(format!("Invalid time of day: {}", s)),
        }
    }
}

/// A value for each period of the day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerPeriod {
    pub day: f64,
    pub night: f64,
    pub transit: f64,
}

impl PerPeriod {
    /// Value for one period.
    pub fn get(&self, period: TimeOfDay) -> f64 {
        match period {
            TimeOfDay::Day => self.day,
            TimeOfDay::Night => self.night,
            TimeOfDay::Transit => self.transit,
        }
    }

    /// Replaces the value of one period.
    pub fn set(&mut self, period: TimeOfDay, value: f64) {
        match period {
            TimeOfDay::Day => self.day = value,
            TimeOfDay::Night => self.night = value,
            TimeOfDay::Transit => self.transit = value,
        }
    }

    /// Multiplies every period by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            day: self.day * factor,
            night: self.night * factor,
            transit: self.transit * factor,
        }
    }
}

impl std::ops::Add for PerPeriod {
    type Output = PerPeriod;

    fn add(self, rhs: PerPeriod) -> PerPeriod {
        PerPeriod {
            day: self.day + rhs.day,
            night: self.night + rhs.night,
            transit: self.transit + rhs.transit,
        }
    }
}

/// Share of census occupants present indoors per occupancy type and period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeOfDayFactors {
    factors: HashMap<String, PerPeriod>,
}

impl TimeOfDayFactors {
    /// Creates an empty factor table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds factors for an occupancy type.
    pub fn with_occupancy(mut self, occupancy: impl Into<String>, factors: PerPeriod) -> Self {
        self.factors.insert(occupancy.into(), factors);
        self
    }

    /// Factor for an occupancy type at a period.
    pub fn factor(&self, occupancy: &str, period: TimeOfDay) -> LossResult<f64> {
        self.factors
            .get(occupancy)
            .map(|f| f.get(period))
            .ok_or_else(|| LossError::MissingTimeOfDayFactor(occupancy.to_string()))
    }

    /// Whether factors exist for an occupancy type.
    pub fn contains(&self, occupancy: &str) -> bool {
        self.factors.contains_key(occupancy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hour_boundaries() {
        assert_eq!(TimeOfDay::from_hour(0), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(6), TimeOfDay::Transit);
        assert_eq!(TimeOfDay::from_hour(9), TimeOfDay::Transit);
        assert_eq!(TimeOfDay::from_hour(10), TimeOfDay::Day);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Day);
        assert_eq!(TimeOfDay::from_hour(18), TimeOfDay::Transit);
        assert_eq!(TimeOfDay::from_hour(21), TimeOfDay::Transit);
        assert_eq!(TimeOfDay::from_hour(22), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(23), TimeOfDay::Night);
    }

    #[test]
    fn test_from_utc_applies_offset() {
        let time = Utc.with_ymd_and_hms(2009, 4, 6, 1, 32, 0).unwrap();
        assert_eq!(
            TimeOfDay::from_utc(time, FixedOffset::east_opt(0).unwrap()),
            TimeOfDay::Night
        );
        assert_eq!(
            TimeOfDay::from_utc(time, FixedOffset::east_opt(9 * 3600).unwrap()),
            TimeOfDay::Day
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("Night".parse::<TimeOfDay>().unwrap(), TimeOfDay::Night);
        assert!("noon".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn test_factor_lookup() {
        let factors = TimeOfDayFactors::new().with_occupancy(
            "Res",
            PerPeriod {
                day: 0.25,
                night: 0.99,
                transit: 0.5,
            },
        );
        assert!((factors.factor("Res", TimeOfDay::Night).unwrap() - 0.99).abs() < 1e-12);
        assert!(matches!(
            factors.factor("Ind", TimeOfDay::Day),
            Err(LossError::MissingTimeOfDayFactor(o)) if o == "Ind"
        ));
    }
}
