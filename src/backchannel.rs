//! Property write back-channel
//!
//! Translates supervisor writes on the D-Bus tree into outbound openWB
//! command messages. Commands are fire-and-forget: QoS 0, non-retained,
//! queued through the MQTT client without awaiting delivery.

use crate::logging::get_logger;
use crate::state::ChargeMode;
use rumqttc::{AsyncClient, QoS};

/// Fixed topic for charge-mode commands
pub const CHARGE_MODE_SET_TOPIC: &str = "openWB/set/ChargeMode";

/// Fixed topic for charging-current commands
pub const CURRENT_SET_TOPIC: &str = "openWB/config/set/sofort/lp1/current";

/// A single outbound command message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    pub topic: &'static str,
    pub payload: String,
}

impl OutboundCommand {
    fn charge_mode(mode: ChargeMode) -> Self {
        Self {
            topic: CHARGE_MODE_SET_TOPIC,
            payload: mode.code().to_string(),
        }
    }

    fn set_current(value: String) -> Self {
        Self {
            topic: CURRENT_SET_TOPIC,
            payload: value,
        }
    }
}

/// Map a property write to the outbound commands it triggers
///
/// `current_mode` is the last charge mode seen on the global topic. Writes
/// to paths other than the three command paths produce no traffic; the
/// write itself is always accepted by the property store.
///
/// A `/Mode` write of 1 evaluates its two conditions independently and may
/// emit two commands for a single write; see DESIGN.md before changing
/// this behavior.
pub fn commands_for_write(
    path: &str,
    value: &serde_json::Value,
    current_mode: ChargeMode,
) -> Vec<OutboundCommand> {
    let mut commands = Vec::new();

    match path {
        "/StartStop" => match value.as_i64() {
            Some(0) => commands.push(OutboundCommand::charge_mode(ChargeMode::Stop)),
            Some(1) => commands.push(OutboundCommand::charge_mode(ChargeMode::Immediate)),
            _ => {}
        },

        "/Mode" => match value.as_i64() {
            Some(0) => commands.push(OutboundCommand::charge_mode(ChargeMode::Immediate)),
            Some(1) => {
                if current_mode != ChargeMode::Pv {
                    commands.push(OutboundCommand::charge_mode(ChargeMode::Pv));
                }
                if current_mode != ChargeMode::Immediate {
                    commands.push(OutboundCommand::charge_mode(ChargeMode::Immediate));
                }
            }
            _ => {}
        },

        "/SetCurrent" => {
            let payload = match value {
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::String(s) => s.clone(),
                _ => return commands,
            };
            commands.push(OutboundCommand::set_current(payload));
        }

        _ => {}
    }

    commands
}

/// Fire-and-forget publisher for outbound commands
pub struct CommandPublisher {
    client: AsyncClient,
    logger: crate::logging::StructuredLogger,
}

impl CommandPublisher {
    /// Wrap an MQTT client handle
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client,
            logger: get_logger("backchannel"),
        }
    }

    /// Queue a command without blocking; delivery failures are only logged
    pub fn publish(&self, command: &OutboundCommand) {
        self.logger.debug(&format!(
            "Publishing command: {} = {}",
            command.topic, command.payload
        ));
        if let Err(e) = self.client.try_publish(
            command.topic,
            QoS::AtMostOnce,
            false,
            command.payload.clone(),
        ) {
            self.logger
                .warn(&format!("Failed to queue command on {}: {}", command.topic, e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_writes_map_to_stop_and_immediate() {
        let cmds = commands_for_write("/StartStop", &serde_json::json!(0), ChargeMode::Immediate);
        assert_eq!(cmds, vec![OutboundCommand::charge_mode(ChargeMode::Stop)]);

        let cmds = commands_for_write("/StartStop", &serde_json::json!(1), ChargeMode::Stop);
        assert_eq!(
            cmds,
            vec![OutboundCommand::charge_mode(ChargeMode::Immediate)]
        );
    }

    #[test]
    fn mode_write_zero_requests_immediate() {
        let cmds = commands_for_write("/Mode", &serde_json::json!(0), ChargeMode::Pv);
        assert_eq!(
            cmds,
            vec![OutboundCommand::charge_mode(ChargeMode::Immediate)]
        );
    }

    #[test]
    fn mode_write_one_evaluates_both_conditions_independently() {
        // Mode is MinPV: differs from both PV and Immediate, so both fire
        let cmds = commands_for_write("/Mode", &serde_json::json!(1), ChargeMode::MinPv);
        assert_eq!(
            cmds,
            vec![
                OutboundCommand::charge_mode(ChargeMode::Pv),
                OutboundCommand::charge_mode(ChargeMode::Immediate),
            ]
        );

        // Already in PV: only the Immediate branch fires
        let cmds = commands_for_write("/Mode", &serde_json::json!(1), ChargeMode::Pv);
        assert_eq!(
            cmds,
            vec![OutboundCommand::charge_mode(ChargeMode::Immediate)]
        );

        // Already Immediate: only the PV branch fires
        let cmds = commands_for_write("/Mode", &serde_json::json!(1), ChargeMode::Immediate);
        assert_eq!(cmds, vec![OutboundCommand::charge_mode(ChargeMode::Pv)]);
    }

    #[test]
    fn set_current_forwards_value_verbatim() {
        let cmds = commands_for_write("/SetCurrent", &serde_json::json!(12.5), ChargeMode::Stop);
        assert_eq!(
            cmds,
            vec![OutboundCommand {
                topic: CURRENT_SET_TOPIC,
                payload: "12.5".to_string(),
            }]
        );

        let cmds = commands_for_write("/SetCurrent", &serde_json::json!(8), ChargeMode::Stop);
        assert_eq!(cmds[0].payload, "8");
    }

    #[test]
    fn other_paths_emit_nothing() {
        assert!(commands_for_write("/Ac/Power", &serde_json::json!(2000), ChargeMode::Pv).is_empty());
        assert!(commands_for_write("/Position", &serde_json::json!(1), ChargeMode::Pv).is_empty());
    }
}
