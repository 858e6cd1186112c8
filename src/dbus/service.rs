use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use zbus::zvariant::OwnedObjectPath;
use zbus::{Connection, Result as ZbusResult, names::WellKnownName};

use crate::bridge::BridgeCommand;
use crate::error::{Result, SeleneError};
use crate::logging::get_logger;

use super::items::BusItem;
use super::shared::DbusSharedState;
use super::tree::TreeNode;
use super::util::emit_value_changed;

/// Owns the D-Bus connection and the registered BusItem tree
pub struct DbusService {
    logger: crate::logging::StructuredLogger,
    service_name: String,
    connection: Option<Connection>,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
    registered_paths: HashSet<String>,
    root_path: OwnedObjectPath,
}

impl DbusService {
    pub async fn new(
        service_name: String,
        commands_tx: mpsc::UnboundedSender<BridgeCommand>,
    ) -> Result<Self> {
        let logger = get_logger("dbus");
        logger.info("Initializing D-Bus service (zbus)");
        let root_path = OwnedObjectPath::try_from("/")
            .map_err(|e| SeleneError::dbus(format!("Invalid object path: {}", e)))?;
        Ok(Self {
            logger,
            service_name,
            connection: None,
            shared: Arc::new(Mutex::new(DbusSharedState::new(
                commands_tx,
                root_path.clone(),
            ))),
            registered_paths: HashSet::new(),
            root_path,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let connection = match Connection::system().await {
            Ok(c) => {
                self.logger.info("Connected to D-Bus: system bus");
                c
            }
            Err(e_sys) => match Connection::session().await {
                Ok(c) => {
                    self.logger.warn(&format!(
                        "System bus unavailable ({}); using session bus",
                        e_sys
                    ));
                    c
                }
                Err(e_sess) => {
                    return Err(SeleneError::dbus(format!(
                        "DBus connect failed: system={} session={}",
                        e_sys, e_sess
                    )));
                }
            },
        };
        self.request_name(&connection)
            .await
            .map_err(|e| SeleneError::dbus(format!("RequestName failed: {}", e)))?;
        self.logger
            .info(&format!("D-Bus service started: {}", self.service_name));

        let root = TreeNode::new("/".to_string(), Arc::clone(&self.shared));
        connection
            .object_server()
            .at(&self.root_path, root)
            .await
            .map_err(|e| SeleneError::dbus(format!("Register root node failed: {}", e)))?;

        self.connection = Some(connection.clone());
        {
            let mut shared = self.shared.lock().unwrap();
            shared.connection = Some(connection);
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.logger.info("Stopping D-Bus service");
        self.connection = None;
        let mut shared = self.shared.lock().unwrap();
        shared.connection = None;
        Ok(())
    }

    /// Register a path, creating tree nodes for intermediate segments
    pub async fn ensure_item(
        &mut self,
        path: &str,
        initial_value: serde_json::Value,
        writable: bool,
    ) -> Result<()> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for i in 1..=segments.len() {
            let subpath = format!("/{}", segments[..i].join("/"));
            if self.registered_paths.contains(&subpath) {
                continue;
            }
            let obj_path = OwnedObjectPath::try_from(subpath.as_str()).map_err(|e| {
                SeleneError::dbus(format!("Invalid object path '{}': {}", subpath, e))
            })?;
            if let Some(conn) = &self.connection {
                let registered = if i == segments.len() {
                    let item = BusItem::new(subpath.clone(), Arc::clone(&self.shared));
                    conn.object_server().at(&obj_path, item).await
                } else {
                    let node = TreeNode::new(subpath.clone(), Arc::clone(&self.shared));
                    conn.object_server().at(&obj_path, node).await
                };
                registered.map_err(|e| {
                    SeleneError::dbus(format!("Register failed for {}: {}", subpath, e))
                })?;
            }
            self.registered_paths.insert(subpath);
        }

        {
            let mut shared = self.shared.lock().unwrap();
            if !shared.paths.contains_key(path) {
                shared.paths.insert(path.to_string(), initial_value);
            }
            if writable {
                shared.writable.insert(path.to_string());
            }
        }
        Ok(())
    }

    pub async fn update_paths(
        &mut self,
        updates: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Result<()> {
        for (k, v) in updates {
            self.update_path(&k, v).await?;
        }
        Ok(())
    }

    /// Write a value into the tree, emitting change signals; unchanged
    /// values are dropped without signalling
    pub async fn update_path(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        {
            let shared = self.shared.lock().unwrap();
            if let Some(old) = shared.paths.get(path)
                && old == &value
            {
                return Ok(());
            }
        }
        self.ensure_item(path, value.clone(), false).await?;
        {
            let mut shared = self.shared.lock().unwrap();
            shared.paths.insert(path.to_string(), value.clone());
        }
        if let Some(conn) = &self.connection {
            emit_value_changed(conn, &self.root_path, path, &value).await;
        }
        Ok(())
    }

    /// Cached value of a path
    pub fn get(&self, path: &str) -> Option<serde_json::Value> {
        let shared = self.shared.lock().unwrap();
        shared.paths.get(path).cloned()
    }

    async fn request_name(&self, connection: &Connection) -> ZbusResult<()> {
        use zbus::fdo::{DBusProxy, RequestNameFlags};
        let proxy = DBusProxy::new(connection).await?;
        let name = WellKnownName::try_from(self.service_name.as_str())?;
        let _ = proxy
            .request_name(name, RequestNameFlags::ReplaceExisting.into())
            .await?;
        Ok(())
    }
}
