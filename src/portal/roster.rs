// Roster normalization: turns a NetLine roster payload into schedule entries.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::PortalError;
use crate::model::{Route, ScheduleEntry};

/// Keys under which NetLine endpoints return their duty records.
const RECORD_KEYS: [&str; 4] = ["result", "data", "duties", "events"];

/// Extract one [`ScheduleEntry`] per flight leg from a roster payload.
///
/// Duties without legs (reserve, ground duties) contribute nothing. Duplicate
/// duties (same `id` / `logicalId`) are kept once.
pub fn parse_roster(payload: &Value) -> Result<Vec<ScheduleEntry>, PortalError> {
    let records = RECORD_KEYS
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_array))
        .ok_or_else(|| PortalError::Parse("roster payload has no duty records".to_string()))?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for duty in records {
        if let Some(id) = duty_id(duty) {
            if !seen.insert(id) {
                continue;
            }
        }

        let legs = match duty.get("legs").and_then(Value::as_array) {
            Some(legs) => legs,
            None => continue,
        };

        let duty_date = text(duty, "date").or_else(|| text(duty, "startDate"));
        let duty_crew = crew_names(duty.get("crew"));

        for leg in legs {
            entries.push(parse_leg(leg, duty_date.as_deref(), &duty_crew)?);
        }
    }

    Ok(entries)
}

fn parse_leg(
    leg: &Value,
    duty_date: Option<&str>,
    duty_crew: &[String],
) -> Result<ScheduleEntry, PortalError> {
    let flight_number = text(leg, "flightNumber")
        .ok_or_else(|| PortalError::Parse("leg without flightNumber".to_string()))?;
    let origin = text(leg, "departure")
        .ok_or_else(|| PortalError::Parse(format!("leg {} without departure", flight_number)))?;
    let destination = text(leg, "arrival")
        .ok_or_else(|| PortalError::Parse(format!("leg {} without arrival", flight_number)))?;
    let date = text(leg, "date")
        .or_else(|| duty_date.map(str::to_string))
        .ok_or_else(|| PortalError::Parse(format!("leg {} without date", flight_number)))?;
    let departure_time = text(leg, "departureTime").or_else(|| text(leg, "std"));

    let leg_crew = crew_names(leg.get("crew"));
    let crew_roster = if leg_crew.is_empty() {
        duty_crew.to_vec()
    } else {
        leg_crew
    };

    Ok(ScheduleEntry {
        flight_number,
        date,
        departure_time,
        route: Route {
            origin,
            destination,
        },
        crew_roster,
    })
}

fn duty_id(duty: &Value) -> Option<String> {
    ["id", "logicalId"]
        .iter()
        .find_map(|key| text(duty, key))
}

/// Read a field as a non-empty string. Numbers are accepted (flight numbers often are).
fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn crew_names(crew: Option<&Value>) -> Vec<String> {
    let Some(members) = crew.and_then(Value::as_array) else {
        return Vec::new();
    };
    members
        .iter()
        .filter_map(|member| match member {
            Value::String(name) => Some(name.trim().to_string()),
            Value::Object(_) => text(member, "name"),
            _ => None,
        })
        .filter(|name| !name.is_empty())
        .collect()
}
