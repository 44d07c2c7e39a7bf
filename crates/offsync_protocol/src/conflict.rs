//! Conflict resolution between a client-held and a server-held record.
//!
//! Resolution is pure: no I/O, no errors, and the same inputs always produce
//! the same output. The engine never calls it on its own; hosts invoke it
//! wherever they reconcile two versions of a record.

use crate::error::ProtocolError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Field compared by [`ConflictStrategy::LastWriteWins`].
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Policy for choosing between two versions of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Client version always wins.
    ClientWins,
    /// Server version always wins.
    #[default]
    ServerWins,
    /// Later `updated_at` wins; server wins if either side cannot be compared.
    LastWriteWins,
    /// Client fields override server fields (shallow).
    Merge,
}

impl ConflictStrategy {
    /// All strategies, in declaration order.
    pub const ALL: [ConflictStrategy; 4] = [
        ConflictStrategy::ClientWins,
        ConflictStrategy::ServerWins,
        ConflictStrategy::LastWriteWins,
        ConflictStrategy::Merge,
    ];

    /// Returns the kebab-case name of this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ClientWins => "client-wins",
            ConflictStrategy::ServerWins => "server-wins",
            ConflictStrategy::LastWriteWins => "last-write-wins",
            ConflictStrategy::Merge => "merge",
        }
    }

    /// Resolves `client` against `server` with this strategy.
    pub fn resolve(&self, client: &Value, server: &Value) -> Value {
        resolve_with_field(client, server, *self, UPDATED_AT_FIELD)
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ConflictStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| ProtocolError::UnknownStrategy(s.to_string()))
    }
}

/// Returns the version of a record that should be treated as current.
///
/// `last-write-wins` compares the [`UPDATED_AT_FIELD`] of both records.
pub fn resolve(client: &Value, server: &Value, strategy: ConflictStrategy) -> Value {
    strategy.resolve(client, server)
}

/// Like [`resolve`], comparing `timestamp_field` for `last-write-wins`.
pub fn resolve_with_field(
    client: &Value,
    server: &Value,
    strategy: ConflictStrategy,
    timestamp_field: &str,
) -> Value {
    match strategy {
        ConflictStrategy::ClientWins => client.clone(),
        ConflictStrategy::ServerWins => server.clone(),
        ConflictStrategy::LastWriteWins => {
            let client_ts = client.get(timestamp_field).and_then(parse_timestamp);
            let server_ts = server.get(timestamp_field).and_then(parse_timestamp);
            match (client_ts, server_ts) {
                (Some(c), Some(s)) if c.cmp(&s) == Ordering::Greater => client.clone(),
                _ => server.clone(),
            }
        }
        ConflictStrategy::Merge => merge(client, server),
    }
}

fn merge(client: &Value, server: &Value) -> Value {
    match (client, server) {
        (Value::Object(client_fields), Value::Object(server_fields)) => {
            let mut merged = server_fields.clone();
            for (key, value) in client_fields {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (Value::Object(_), _) => client.clone(),
        _ => server.clone(),
    }
}

/// Parses a timestamp field value.
///
/// Accepts RFC 3339 strings, naive `YYYY-MM-DD[ T]HH:MM:SS[.f]` (taken as
/// UTC), plain `YYYY-MM-DD` dates, and integer epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
