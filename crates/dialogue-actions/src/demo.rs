//! Toy action handlers for the `dialogue-cli` demo binary.
//!
//! These stand in for the external services a real deployment would call
//! (a flight-search API, a payment processor) so the CLI can drive a
//! complete flow end to end without network access.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::ActionRegistry;

/// Builds the registry the CLI's example flows call into: `search_flights`
/// echoes its origin/destination back as a fabricated itinerary, and
/// `send_confirmation_email` always succeeds.
pub fn registry() -> ActionRegistry {
    ActionRegistry::new()
        .register("search_flights", |inputs| async move {
            let origin = slot_str(&inputs, "origin");
            let destination = slot_str(&inputs, "destination");
            Ok(HashMap::from([(
                "itinerary".to_string(),
                json!(format!("{origin} -> {destination}, departs 09:00")),
            )]))
        })
        .register("send_confirmation_email", |_inputs| async move {
            Ok(HashMap::from([("sent".to_string(), json!(true))]))
        })
}

fn slot_str(inputs: &HashMap<String, Value>, key: &str) -> String {
    inputs.get(key).and_then(Value::as_str).unwrap_or("?").to_string()
}
