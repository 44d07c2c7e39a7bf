//! Resolve command implementation.

use offsync_protocol::{resolve as resolve_records, ConflictStrategy};
use serde_json::Value;

/// Runs the resolve command.
pub fn run(client: &str, server: &str, strategy: &str) -> Result<(), Box<dyn std::error::Error>> {
    let resolved = resolve(client, server, strategy)?;
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

/// Parses both records and resolves them with the named strategy.
pub fn resolve(
    client: &str,
    server: &str,
    strategy: &str,
) -> Result<Value, Box<dyn std::error::Error>> {
    let strategy: ConflictStrategy = strategy.parse()?;
    let client: Value =
        serde_json::from_str(client).map_err(|e| format!("Invalid client record: {e}"))?;
    let server: Value =
        serde_json::from_str(server).map_err(|e| format!("Invalid server record: {e}"))?;

    tracing::debug!(%strategy, "resolving records");
    Ok(resolve_records(&client, &server, strategy))
}
