//! Attribute bridge: external string input to property writes.
//!
//! An external attribute change arrives as `(kebab-case name, string
//! value)`. The bridge translates it through the descriptor's fixed
//! name-mapping table into a property write, feeding the same setter path
//! as programmatic access. Invalid input is recovered locally by ignoring
//! the write: no commit is requested and no error surfaces, keeping
//! long-lived UI robust against bad input.

use log::warn;
use serde_json::Value;

use crate::component::Component;
use crate::schedule::UpdateHandle;
use crate::types::PropertyKind;

/// Parse a property's external string form per its declared kind.
///
/// Returns `None` for input that does not parse; the caller ignores the
/// write.
pub fn parse_property(kind: PropertyKind, raw: &str) -> Option<Value> {
    match kind {
        PropertyKind::Number => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            let number: f64 = trimmed.parse().ok()?;
            if !number.is_finite() {
                return None;
            }
            // Integral input stays integral so downstream identity and
            // display behave like the caller wrote an index.
            if number.fract() == 0.0
                && number >= i64::MIN as f64
                && number <= i64::MAX as f64
            {
                Some(Value::from(number as i64))
            } else {
                Some(Value::from(number))
            }
        }
        PropertyKind::Boolean => match raw.trim() {
            // Attribute presence semantics: an empty value reads as true.
            "" | "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        PropertyKind::Text => Some(Value::String(raw.to_string())),
    }
}

/// Translate an attribute change into a property write.
///
/// Unknown attributes are ignored. Returns the update handle when a write
/// was requested.
pub fn apply_attribute(component: &Component, attribute: &str, raw: &str) -> Option<UpdateHandle> {
    let Some(spec) = component.descriptor().property_by_attribute(attribute) else {
        warn!(
            "{}: ignoring unknown attribute {attribute:?}",
            component.name()
        );
        return None;
    };
    let key = spec.key.clone();
    component.set_property(&key, raw)
}
