use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::OwnedValue;

use super::shared::DbusSharedState;
use super::util::{emit_value_changed, format_text_value, owned_value_to_serde, serde_to_owned_value};
use crate::bridge::BridgeCommand;

/// VeDbus-style item implementing com.victronenergy.BusItem on a leaf path
pub struct BusItem {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl BusItem {
    pub fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }

    /// Coerce supervisor-written values into the shape each path stores
    pub(crate) fn normalize_for_path(path: &str, value: &serde_json::Value) -> serde_json::Value {
        match path {
            // Binary flags: anything truthy becomes 1
            "/Mode" | "/StartStop" | "/Position" => {
                let v = match value {
                    serde_json::Value::Bool(b) => i64::from(*b),
                    serde_json::Value::Number(n) => i64::from(n.as_i64().unwrap_or(0) > 0),
                    serde_json::Value::String(s) => {
                        let t = s.trim().to_ascii_lowercase();
                        i64::from(t == "1" || t == "true" || t == "on")
                    }
                    _ => 0,
                };
                serde_json::json!(v)
            }
            // Currents are stored as finite floats; comma decimals accepted
            "/SetCurrent" => {
                let f = match value {
                    serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
                    serde_json::Value::String(s) => s
                        .trim()
                        .replace(',', ".")
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .unwrap_or(0.0),
                    serde_json::Value::Bool(b) => f64::from(u8::from(*b)),
                    _ => 0.0,
                };
                serde_json::json!(f)
            }
            _ => value.clone(),
        }
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl BusItem {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        let val = {
            let shared = self.shared.lock().unwrap();
            shared
                .paths
                .get(&self.path)
                .cloned()
                .unwrap_or(serde_json::Value::Null)
        };
        serde_to_owned_value(&val)
    }

    #[zbus(name = "SetValue")]
    async fn set_value(&self, value: OwnedValue) -> i32 {
        let (conn_opt, root_path, normalized, commands_tx) = {
            let mut shared = self.shared.lock().unwrap();
            if !shared.writable.contains(&self.path) {
                return 1;
            }
            let written = owned_value_to_serde(&value);
            let normalized = Self::normalize_for_path(&self.path, &written);
            shared.paths.insert(self.path.clone(), normalized.clone());
            (
                shared.connection.clone(),
                shared.root_path.clone(),
                normalized,
                shared.commands_tx.clone(),
            )
        };

        if let Some(conn) = conn_opt {
            emit_value_changed(&conn, &root_path, &self.path, &normalized).await;
        }

        // Hand the accepted write to the bridge loop; the back-channel
        // decides whether it produces outbound traffic
        let _ = commands_tx.send(BridgeCommand::PropertyWritten {
            path: self.path.clone(),
            value: normalized,
        });

        0
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> String {
        let val = {
            let shared = self.shared.lock().unwrap();
            shared
                .paths
                .get(&self.path)
                .cloned()
                .unwrap_or(serde_json::Value::Null)
        };
        format_text_value(&self.path, &val)
    }

    #[zbus(signal)]
    pub async fn properties_changed(
        ctxt: &SignalEmitter<'_>,
        changes: std::collections::HashMap<&str, OwnedValue>,
    ) -> zbus::Result<()>;
}
