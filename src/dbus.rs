//! D-Bus integration for Venus OS compatibility
//!
//! This module exposes the bridge as a standard Victron EV charger service
//! implementing the `com.victronenergy.BusItem` interface on every
//! registered path, with a tree node at the root for introspection.

mod items;
mod shared;
mod tree;
mod util;

pub mod service;

pub use items::BusItem;
pub use service::DbusService;
pub use shared::DbusSharedState;
pub use tree::TreeNode;
