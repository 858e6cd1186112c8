use std::collections::HashMap;
use zbus::Connection;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use super::items::BusItem;
use super::tree::TreeNode;

/// Unit suffix for a path's text representation, following the Victron
/// GUI conventions for EV charger services
fn unit_suffix(path: &str) -> Option<&'static str> {
    match path {
        "/Ac/Power" | "/Ac/L1/Power" | "/Ac/L2/Power" | "/Ac/L3/Power" => Some("W"),
        "/Ac/Energy/Forward" => Some("kWh"),
        "/Ac/Voltage" => Some("V"),
        "/Current" | "/SetCurrent" | "/MaxCurrent" => Some("A"),
        "/ChargingTime" => Some("s"),
        _ => None,
    }
}

/// Human-readable text for a path's value, with the unit convention applied
pub(crate) fn format_text_value(path: &str, val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Number(n) => {
            let f = n.as_f64().unwrap_or(0.0);
            match unit_suffix(path) {
                Some("kWh") => format!("{:.2}kWh", f),
                Some("s") => format!("{}s", f.round() as i64),
                Some(unit) => format!("{:.1}{}", f, unit),
                None => {
                    if n.is_f64() {
                        format!("{:.2}", f)
                    } else {
                        n.to_string()
                    }
                }
            }
        }
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        _ => val.to_string(),
    }
}

/// Convert a JSON value to the zvariant representation used on the wire
pub(crate) fn serde_to_owned_value(v: &serde_json::Value) -> OwnedValue {
    match v {
        serde_json::Value::Bool(b) => OwnedValue::from(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                OwnedValue::from(i)
            } else if let Some(u) = n.as_u64() {
                OwnedValue::from(u)
            } else {
                OwnedValue::from(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => OwnedValue::try_from(Value::from(s.as_str()))
            .unwrap_or_else(|_| OwnedValue::from(0i64)),
        // Null and aggregates degrade to a numeric zero, as vedbus does for
        // invalid values
        _ => OwnedValue::from(0i64),
    }
}

/// Convert an inbound zvariant value to JSON
pub(crate) fn owned_value_to_serde(v: &OwnedValue) -> serde_json::Value {
    if let Ok(b) = <bool as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(b);
    }
    if let Ok(i) = <i64 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(i);
    }
    if let Ok(u) = <u64 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(u);
    }
    if let Ok(f) = <f64 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(f);
    }
    if let Ok(s) = <&str as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(s.to_string());
    }
    serde_json::json!(v.to_string())
}

fn changes_entry(path: &str, value: &serde_json::Value) -> HashMap<&'static str, OwnedValue> {
    let mut entry: HashMap<&'static str, OwnedValue> = HashMap::new();
    entry.insert("Value", serde_to_owned_value(value));
    let text = format_text_value(path, value);
    if let Ok(text_ov) = OwnedValue::try_from(Value::from(text.as_str())) {
        entry.insert("Text", text_ov);
    }
    entry
}

/// Emit the per-item PropertiesChanged and root ItemsChanged signals for a
/// value change; emission failures are ignored, the cache stays authoritative
pub(crate) async fn emit_value_changed(
    conn: &Connection,
    root_path: &OwnedObjectPath,
    path: &str,
    value: &serde_json::Value,
) {
    if let Ok(obj_path) = OwnedObjectPath::try_from(path)
        && let Ok(item_ctx) = SignalEmitter::new(conn, obj_path)
    {
        let _ = BusItem::properties_changed(&item_ctx, changes_entry(path, value)).await;
    }

    if let Ok(root_ctx) = SignalEmitter::new(conn, root_path.clone()) {
        let mut outer: HashMap<&str, HashMap<&'static str, OwnedValue>> = HashMap::new();
        outer.insert(path, changes_entry(path, value));
        let _ = TreeNode::items_changed(&root_ctx, outer).await;
    }
}
