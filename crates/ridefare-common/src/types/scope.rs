//! Hierarchy scope shared by every pricing row
//!
//! A scope is the nullable tuple (country, region, city, zone). The most
//! specific populated field decides the row's [`ScopeLevel`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::geo::GeoLocation;
use crate::error::ValidationError;

/// Specificity of a scope, ordered global < country < region < city < zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Global,
    Country,
    Region,
    City,
    Zone,
}

/// Where a pricing row applies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub country_id: Option<i64>,
    pub region_id: Option<i64>,
    pub city_id: Option<i64>,
    pub zone_id: Option<i64>,
}

impl Scope {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn country(country_id: i64) -> Self {
        Self {
            country_id: Some(country_id),
            ..Self::default()
        }
    }

    pub fn region(country_id: i64, region_id: i64) -> Self {
        Self {
            region_id: Some(region_id),
            ..Self::country(country_id)
        }
    }

    pub fn city(country_id: i64, region_id: i64, city_id: i64) -> Self {
        Self {
            city_id: Some(city_id),
            ..Self::region(country_id, region_id)
        }
    }

    pub fn zone(country_id: i64, region_id: i64, city_id: i64, zone_id: i64) -> Self {
        Self {
            zone_id: Some(zone_id),
            ..Self::city(country_id, region_id, city_id)
        }
    }

    /// Scope of a resolved location, used as a cache key
    pub fn of_location(location: &GeoLocation) -> Self {
        Self {
            country_id: location.country_id,
            region_id: location.region_id,
            city_id: location.city_id,
            zone_id: location.zone_id,
        }
    }

    /// Most specific populated level
    pub fn level(&self) -> ScopeLevel {
        if self.zone_id.is_some() {
            ScopeLevel::Zone
        } else if self.city_id.is_some() {
            ScopeLevel::City
        } else if self.region_id.is_some() {
            ScopeLevel::Region
        } else if self.country_id.is_some() {
            ScopeLevel::Country
        } else {
            ScopeLevel::Global
        }
    }

    /// True when every populated field equals the location's id at that level
    pub fn applies_to(&self, location: &GeoLocation) -> bool {
        fn matches(row: Option<i64>, at: Option<i64>) -> bool {
            match row {
                None => true,
                Some(id) => at == Some(id),
            }
        }

        matches(self.country_id, location.country_id)
            && matches(self.region_id, location.region_id)
            && matches(self.city_id, location.city_id)
            && matches(self.zone_id, location.zone_id)
    }

    /// Every level above the most specific one must be populated
    pub fn validate(&self) -> Result<(), ValidationError> {
        let chain = [
            ("country_id", self.country_id),
            ("region_id", self.region_id),
            ("city_id", self.city_id),
            ("zone_id", self.zone_id),
        ];
        let mut gap: Option<&str> = None;
        for (name, value) in chain {
            match (value, gap) {
                (None, None) => gap = Some(name),
                (Some(_), Some(missing)) => {
                    return Err(ValidationError::Scope(format!(
                        "{name} is set but {missing} is not"
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reject zone-level scopes for rows that only support country/region/city
    pub fn validate_without_zone(&self) -> Result<(), ValidationError> {
        if self.zone_id.is_some() {
            return Err(ValidationError::Scope(
                "zone_id is not supported for this row".to_string(),
            ));
        }
        self.validate()
    }
}

/// Pick the applicable row with the tightest scope, breaking ties by `priority`.
///
/// Among equal scope level and priority the earliest row wins.
pub fn select_nearest<'a, T, P: Ord>(
    rows: impl IntoIterator<Item = &'a T>,
    location: &GeoLocation,
    scope_of: impl Fn(&T) -> &Scope,
    priority: impl Fn(&T) -> P,
) -> Option<&'a T>
where
    T: 'a,
{
    let mut best: Option<(&'a T, ScopeLevel, P)> = None;
    for row in rows {
        let scope = scope_of(row);
        if !scope.applies_to(location) {
            continue;
        }
        let level = scope.level();
        let rank = priority(row);
        let better = match &best {
            None => true,
            Some((_, best_level, best_rank)) => {
                (level, &rank) > (*best_level, best_rank)
            }
        };
        if better {
            best = Some((row, level, rank));
        }
    }
    best.map(|(row, _, _)| row)
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level() {
            ScopeLevel::Global => write!(f, "global"),
            ScopeLevel::Country => write!(f, "country:{}", self.country_id.unwrap_or_default()),
            ScopeLevel::Region => write!(f, "region:{}", self.region_id.unwrap_or_default()),
            ScopeLevel::City => write!(f, "city:{}", self.city_id.unwrap_or_default()),
            ScopeLevel::Zone => write!(f, "zone:{}", self.zone_id.unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> GeoLocation {
        GeoLocation {
            country_id: Some(1),
            region_id: Some(10),
            city_id: Some(100),
            zone_id: Some(1000),
            timezone: "America/New_York".to_string(),
            utc_offset_minutes: -300,
        }
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(ScopeLevel::Zone > ScopeLevel::City);
        assert!(ScopeLevel::City > ScopeLevel::Region);
        assert!(ScopeLevel::Country > ScopeLevel::Global);
        assert_eq!(Scope::city(1, 10, 100).level(), ScopeLevel::City);
        assert_eq!(Scope::global().level(), ScopeLevel::Global);
    }

    #[test]
    fn test_applies_to() {
        let loc = location();
        assert!(Scope::global().applies_to(&loc));
        assert!(Scope::zone(1, 10, 100, 1000).applies_to(&loc));
        assert!(!Scope::city(1, 10, 101).applies_to(&loc));
        assert!(!Scope::country(2).applies_to(&loc));
        // Sparse rows that only carry their own level still match
        let sparse = Scope {
            city_id: Some(100),
            ..Scope::default()
        };
        assert!(sparse.applies_to(&loc));
    }

    #[test]
    fn test_validate_contiguity() {
        assert!(Scope::zone(1, 2, 3, 4).validate().is_ok());
        let broken = Scope {
            country_id: Some(1),
            city_id: Some(3),
            ..Scope::default()
        };
        assert!(broken.validate().is_err());
        assert!(Scope::zone(1, 2, 3, 4).validate_without_zone().is_err());
    }

    #[test]
    fn test_select_nearest_prefers_scope_then_priority() {
        let loc = location();
        let rows = vec![
            (Scope::global(), 9),
            (Scope::city(1, 10, 100), 1),
            (Scope::city(1, 10, 100), 5),
            (Scope::city(1, 10, 999), 50),
        ];
        let best = select_nearest(&rows, &loc, |r| &r.0, |r| r.1).unwrap();
        assert_eq!(*best, (Scope::city(1, 10, 100), 5));

        let only_global = vec![(Scope::global(), 0), (Scope::country(2), 7)];
        let best = select_nearest(&only_global, &loc, |r| &r.0, |r| r.1).unwrap();
        assert_eq!(best.0, Scope::global());

        let none: Vec<(Scope, i32)> = vec![(Scope::country(2), 1)];
        assert!(select_nearest(&none, &loc, |r| &r.0, |r| r.1).is_none());
    }

    #[test]
    fn test_display_tags() {
        assert_eq!(Scope::global().to_string(), "global");
        assert_eq!(Scope::region(1, 7).to_string(), "region:7");
        assert_eq!(Scope::zone(1, 2, 3, 4).to_string(), "zone:4");
    }
}
