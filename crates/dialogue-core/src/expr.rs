//! Slot template interpolation and the tiny expression language used by
//! `branch`/`while` conditions.
//!
//! `say`'s `{slot_name}` templates and `branch`/`while`'s `condition`/
//! `input` expressions both need a concrete grammar. This module is that
//! grammar: slot
//! references prefixed with `$`, literals, and a handful of comparison
//! operators — enough to express the guard conditions and branch inputs a
//! flow author actually writes, without growing into a general-purpose
//! expression evaluator.

use std::collections::HashMap;

use serde_json::Value;

/// Interpolate `{slot_name}` placeholders in `template` against `slots`.
/// A missing slot renders as an empty string and logs a warning.
pub fn interpolate(template: &str, slots: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i + 1..].find('}') {
                let name = &template[i + 1..i + 1 + end];
                match slots.get(name) {
                    Some(v) => out.push_str(&value_to_display(v)),
                    None => {
                        tracing::warn!(slot = name, "say template references a slot that is not set");
                    }
                }
                i = i + 1 + end + 1;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn value_to_display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A resolved operand: either a slot value or a parsed literal.
fn resolve_operand(token: &str, slots: &HashMap<String, Value>) -> Value {
    let token = token.trim();
    if let Some(slot_name) = token.strip_prefix('$') {
        return slots.get(slot_name).cloned().unwrap_or(Value::Null);
    }
    if token == "true" {
        return Value::Bool(true);
    }
    if token == "false" {
        return Value::Bool(false);
    }
    if let Ok(n) = token.parse::<f64>() {
        return serde_json::json!(n);
    }
    let unquoted = token.trim_matches('"').trim_matches('\'');
    Value::String(unquoted.to_string())
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Evaluate a `branch`/`while` expression against the active flow's slots,
/// returning the resolved [`Value`] used as the case-lookup key (or the
/// truthiness value for a bare condition).
///
/// Supported forms (`lhs` is always a `$slot` reference or the bare
/// expression):
/// - `$slot` — the slot's own value, for direct case matching.
/// - `$slot == <literal>`, `$slot != <literal>`
/// - `$slot < <n>`, `$slot <= <n>`, `$slot > <n>`, `$slot >= <n>`
pub fn evaluate(expr: &str, slots: &HashMap<String, Value>) -> Value {
    let expr = expr.trim();
    for op in ["==", "!=", ">=", "<=", ">", "<"] {
        if let Some(pos) = expr.find(op) {
            let lhs = resolve_operand(&expr[..pos], slots);
            let rhs = resolve_operand(&expr[pos + op.len()..], slots);
            let result = match op {
                "==" => lhs == rhs,
                "!=" => lhs != rhs,
                ">=" => matches!((as_f64(&lhs), as_f64(&rhs)), (Some(a), Some(b)) if a >= b),
                "<=" => matches!((as_f64(&lhs), as_f64(&rhs)), (Some(a), Some(b)) if a <= b),
                ">" => matches!((as_f64(&lhs), as_f64(&rhs)), (Some(a), Some(b)) if a > b),
                "<" => matches!((as_f64(&lhs), as_f64(&rhs)), (Some(a), Some(b)) if a < b),
                _ => unreachable!(),
            };
            return Value::Bool(result);
        }
    }
    resolve_operand(expr, slots)
}

/// Render `value` as the string key used to look up a `branch` case.
pub fn case_key(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Evaluate `expr` and report whether it is truthy, for `while` guards.
pub fn evaluate_truthy(expr: &str, slots: &HashMap<String, Value>) -> bool {
    truthy(&evaluate(expr, slots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slots() -> HashMap<String, Value> {
        HashMap::from([
            ("origin".to_string(), json!("NYC")),
            ("count".to_string(), json!(3)),
            ("confirmed".to_string(), json!(true)),
        ])
    }

    #[test]
    fn interpolate_replaces_known_slots() {
        assert_eq!(interpolate("from {origin} please", &slots()), "from NYC please");
    }

    #[test]
    fn interpolate_renders_missing_slot_as_empty() {
        assert_eq!(interpolate("to {destination}", &slots()), "to ");
    }

    #[test]
    fn evaluate_equality_on_slot() {
        assert_eq!(evaluate("$origin == NYC", &slots()), json!(true));
        assert_eq!(evaluate("$origin == SFO", &slots()), json!(false));
    }

    #[test]
    fn evaluate_numeric_comparison() {
        assert_eq!(evaluate("$count < 5", &slots()), json!(true));
        assert_eq!(evaluate("$count >= 10", &slots()), json!(false));
    }

    #[test]
    fn evaluate_bare_slot_for_case_matching() {
        assert_eq!(case_key(&evaluate("$origin", &slots())), "NYC");
    }

    #[test]
    fn evaluate_truthy_drives_while_guards() {
        assert!(evaluate_truthy("$confirmed", &slots()));
        assert!(!evaluate_truthy("$count > 100", &slots()));
    }
}
