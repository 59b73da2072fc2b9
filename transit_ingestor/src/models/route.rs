//! Routes of a city and their vehicle type.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{io::csv::CsvRecord, models::city::CityId};

/// Route id as assigned by the portal.
pub type RouteId = i32;

/// Vehicle type of a route, derived from its display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    Bus,
    Trolley,
    Tram,
    Other,
}

/// Lowercase keywords checked in order; the first substring match wins.
const TYPE_KEYWORDS: [(&str, RouteType); 3] = [
    ("автобус", RouteType::Bus),
    ("троллейбус", RouteType::Trolley),
    ("трамвай", RouteType::Tram),
];

impl RouteType {
    /// Classifies a route by case-insensitive keyword match on its name.
    ///
    /// ```
    /// use transit_ingestor::models::route::RouteType;
    ///
    /// assert_eq!(RouteType::classify("Автобус №5"), RouteType::Bus);
    /// assert_eq!(RouteType::classify("Маршрутка 3"), RouteType::Other);
    /// ```
    pub fn classify(name: &str) -> Self {
        let lowered = name.to_lowercase();
        TYPE_KEYWORDS
            .iter()
            .find(|(kw, _)| lowered.contains(kw))
            .map(|(_, t)| *t)
            .unwrap_or(RouteType::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Bus => "bus",
            RouteType::Trolley => "trolley",
            RouteType::Tram => "tram",
            RouteType::Other => "other",
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bus" => Ok(RouteType::Bus),
            "trolley" => Ok(RouteType::Trolley),
            "tram" => Ok(RouteType::Tram),
            "other" => Ok(RouteType::Other),
            other => Err(format!("unknown route type: {other}")),
        }
    }
}

/// A route served in one city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    /// Display name as shown in the portal's route selector.
    pub name: String,
    #[serde(rename = "type")]
    pub route_type: RouteType,
    pub city_id: CityId,
}

impl Route {
    /// Builds a route, classifying its type from `name`.
    pub fn new(id: RouteId, name: impl Into<String>, city_id: CityId) -> Self {
        let name = name.into();
        Self {
            id,
            route_type: RouteType::classify(&name),
            name,
            city_id,
        }
    }
}

impl CsvRecord for Route {
    const HEADER: &'static [&'static str] = &["id", "name", "type", "city_id"];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_keyword() {
        assert_eq!(RouteType::classify("Автобус №5"), RouteType::Bus);
        assert_eq!(RouteType::classify("Троллейбус 12"), RouteType::Trolley);
        assert_eq!(RouteType::classify("Трамвай А"), RouteType::Tram);
        assert_eq!(RouteType::classify("Маршрутка 3"), RouteType::Other);
    }

    #[test]
    fn classification_ignores_case() {
        assert_eq!(RouteType::classify("АВТОБУС 77"), RouteType::Bus);
        assert_eq!(RouteType::classify("ночной трамвай 1"), RouteType::Tram);
    }

    #[test]
    fn type_round_trips_through_str() {
        for t in [
            RouteType::Bus,
            RouteType::Trolley,
            RouteType::Tram,
            RouteType::Other,
        ] {
            assert_eq!(t.as_str().parse::<RouteType>().unwrap(), t);
        }
        assert!("ferry".parse::<RouteType>().is_err());
    }
}
