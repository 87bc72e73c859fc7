// Schedule domain types shared by the portal clients, the session manager and the HTTP layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Airlines whose crew portals we know how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Airline {
    #[serde(rename = "ABX")]
    Abx,
    #[serde(rename = "ATI")]
    Ati,
}

impl Airline {
    pub const ALL: [Airline; 2] = [Airline::Abx, Airline::Ati];

    pub fn code(&self) -> &'static str {
        match self {
            Airline::Abx => "ABX",
            Airline::Ati => "ATI",
        }
    }
}

impl fmt::Display for Airline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAirline(pub String);

impl fmt::Display for UnknownAirline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown airline '{}'", self.0)
    }
}

impl std::error::Error for UnknownAirline {}

impl FromStr for Airline {
    type Err = UnknownAirline;

    /// Accepts the airline code or the display name the UI client sends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ABX" | "ABX AIR" => Ok(Airline::Abx),
            "ATI" | "AIR TRANSPORT INTERNATIONAL" => Ok(Airline::Ati),
            _ => Err(UnknownAirline(s.to_string())),
        }
    }
}

/// Identifies one cache slot and one in-flight slot: a pilot at an airline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub pilot: String,
    pub airline: Airline,
}

impl SessionKey {
    /// Portal logins are case-insensitive, so the pilot id is trimmed and lowercased.
    pub fn new(pilot: impl Into<String>, airline: Airline) -> Self {
        Self {
            pilot: pilot.into().trim().to_lowercase(),
            airline,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pilot, self.airline)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub origin: String,
    pub destination: String,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.origin, self.destination)
    }
}

/// One flight leg on a pilot's schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub flight_number: String,
    pub date: String,
    pub departure_time: Option<String>,
    pub route: Route,
    /// Crew names in the order the portal lists them.
    pub crew_roster: Vec<String>,
}

/// Result of one successful scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub pilot: String,
    pub airline: Airline,
    pub entries: Vec<ScheduleEntry>,
    pub fetched_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(pilot: impl Into<String>, airline: Airline, entries: Vec<ScheduleEntry>) -> Self {
        Self {
            pilot: pilot.into(),
            airline,
            entries,
            fetched_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
