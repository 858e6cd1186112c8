use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedValue, Value};

use super::shared::DbusSharedState;
use super::util::{format_text_value, serde_to_owned_value};

/// Subtree view over the path cache, registered at the service root and at
/// every intermediate path segment
pub struct TreeNode {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl TreeNode {
    pub fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }

    /// Leaf values under this node, keyed by path relative to it
    fn collect_subtree_map(&self, as_text: bool) -> HashMap<String, OwnedValue> {
        let shared = self.shared.lock().unwrap();
        let mut px = self.path.clone();
        if !px.ends_with('/') {
            px.push('/');
        }
        let mut result: HashMap<String, OwnedValue> = HashMap::new();
        for (path, val) in shared.paths.iter() {
            if let Some(suffix) = path.strip_prefix(px.as_str()) {
                let ov = if as_text {
                    let text = format_text_value(path, val);
                    OwnedValue::try_from(Value::from(text.as_str()))
                        .unwrap_or_else(|_| OwnedValue::from(0i64))
                } else {
                    serde_to_owned_value(val)
                };
                result.insert(suffix.to_string(), ov);
            }
        }
        result
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl TreeNode {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        OwnedValue::from(self.collect_subtree_map(false))
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> OwnedValue {
        OwnedValue::from(self.collect_subtree_map(true))
    }

    #[zbus(name = "GetItems")]
    async fn get_items(&self) -> HashMap<String, HashMap<String, OwnedValue>> {
        let shared = self.shared.lock().unwrap();
        let mut out: HashMap<String, HashMap<String, OwnedValue>> = HashMap::new();
        for (path, val) in shared.paths.iter() {
            let mut entry: HashMap<String, OwnedValue> = HashMap::new();
            entry.insert("Value".to_string(), serde_to_owned_value(val));
            let text = format_text_value(path, val);
            let text_ov = OwnedValue::try_from(Value::from(text.as_str()))
                .unwrap_or_else(|_| OwnedValue::from(0i64));
            entry.insert("Text".to_string(), text_ov);
            out.insert(path.clone(), entry);
        }
        out
    }

    #[zbus(signal)]
    pub async fn items_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, HashMap<&'static str, OwnedValue>>,
    ) -> zbus::Result<()>;
}
