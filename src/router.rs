//! Inbound topic routing
//!
//! This module parses wallbox telemetry topics into an explicit enum,
//! applies the derived-value computations, and produces the property
//! updates to publish on D-Bus. All `WallboxState` mutation happens here,
//! on the MQTT delivery task.

use crate::error::{Result, SeleneError};
use crate::logging::get_logger;
use crate::state::{
    ChargeMode, LinkShared, WallboxState, average_voltage, combined_status, phase_power,
    session_transition,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Fixed absolute topic carrying the global charge mode
pub const GLOBAL_CHARGE_MODE_TOPIC: &str = "openWB/global/ChargeMode";

/// A single property write destined for the D-Bus tree
pub type PropertyUpdate = (String, serde_json::Value);

/// Recognized inbound topics, after prefix stripping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTopic {
    /// `VPhase{1,2,3}` - per-phase voltage in volts (0-based index)
    PhaseVoltage(usize),
    /// `APhase{1,2,3}` - per-phase current in amperes (0-based index)
    PhaseCurrent(usize),
    /// `W` - total active power in watts
    TotalPower,
    /// `kWhDailyCharged` - daily forward energy counter
    DailyEnergy,
    /// `ChargeStatus` - raw charge status
    ChargeStatus,
    /// `boolPlugStat` - raw plug status
    PlugStatus,
    /// `AConfigured` - configured charging current
    ConfiguredCurrent,
    /// `openWB/global/ChargeMode` - global charge mode (absolute topic)
    GlobalChargeMode,
}

impl InboundTopic {
    /// Match a prefix-stripped topic suffix; `None` for unrecognized suffixes
    pub fn parse(suffix: &str) -> Option<Self> {
        match suffix {
            "VPhase1" => Some(InboundTopic::PhaseVoltage(0)),
            "VPhase2" => Some(InboundTopic::PhaseVoltage(1)),
            "VPhase3" => Some(InboundTopic::PhaseVoltage(2)),
            "APhase1" => Some(InboundTopic::PhaseCurrent(0)),
            "APhase2" => Some(InboundTopic::PhaseCurrent(1)),
            "APhase3" => Some(InboundTopic::PhaseCurrent(2)),
            "W" => Some(InboundTopic::TotalPower),
            "kWhDailyCharged" => Some(InboundTopic::DailyEnergy),
            "ChargeStatus" => Some(InboundTopic::ChargeStatus),
            "boolPlugStat" => Some(InboundTopic::PlugStatus),
            "AConfigured" => Some(InboundTopic::ConfiguredCurrent),
            _ => None,
        }
    }
}

/// Routes inbound messages into property updates
pub struct Router {
    /// Subscription prefix with any trailing wildcard stripped
    prefix: String,

    /// Wallbox telemetry mirror
    state: WallboxState,

    /// Cross-domain snapshot (message timestamp, charge mode)
    shared: Arc<LinkShared>,

    /// Logger
    logger: crate::logging::StructuredLogger,
}

impl Router {
    /// Create a router for the given subscription topic filter
    pub fn new(topic_filter: &str, shared: Arc<LinkShared>) -> Self {
        let prefix = topic_filter.strip_suffix('#').unwrap_or(topic_filter);
        Self {
            prefix: prefix.to_string(),
            state: WallboxState::default(),
            shared,
            logger: get_logger("router"),
        }
    }

    /// Route an inbound message, timestamped with the current wall clock
    pub fn route(&mut self, topic: &str, payload: &[u8]) -> Result<Vec<PropertyUpdate>> {
        self.route_at(topic, payload, Utc::now())
    }

    /// Route an inbound message with an explicit timestamp
    ///
    /// Returns the property updates to publish; an empty vector means the
    /// message only updated internal state (or was unrecognized). Parse
    /// failures leave both the state and the liveness timestamp untouched.
    pub fn route_at(
        &mut self,
        topic: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<PropertyUpdate>> {
        let inbound = if topic == GLOBAL_CHARGE_MODE_TOPIC {
            Some(InboundTopic::GlobalChargeMode)
        } else {
            let suffix = topic.strip_prefix(self.prefix.as_str()).unwrap_or(topic);
            InboundTopic::parse(suffix)
        };

        let Some(inbound) = inbound else {
            self.logger.debug(&format!("Ignoring topic: {}", topic));
            return Ok(Vec::new());
        };

        let text = std::str::from_utf8(payload)
            .map_err(|e| SeleneError::parse(format!("payload is not UTF-8: {}", e)))?;
        let updates = self.dispatch(inbound, text, now)?;
        self.shared.touch(now);

        if !payload.is_empty() && !matches!(inbound, InboundTopic::PhaseVoltage(_)) {
            self.logger
                .debug(&format!("MQTT topic: {}, payload: {}", topic, text));
        }

        Ok(updates)
    }

    fn dispatch(
        &mut self,
        inbound: InboundTopic,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<PropertyUpdate>> {
        let mut updates = Vec::new();

        match inbound {
            InboundTopic::PhaseVoltage(idx) => {
                self.state.phase_voltage[idx] = parse_f64(payload)?;
                // The averaged voltage and session clock follow the last
                // phase of the reporting cycle
                if idx == 2 {
                    let [v1, v2, v3] = self.state.phase_voltage;
                    updates.push((
                        "/Ac/Voltage".to_string(),
                        serde_json::json!(average_voltage(v1, v2, v3)),
                    ));
                    let charging_time = match self.state.charge_start {
                        Some(start) => serde_json::json!((now - start).num_seconds()),
                        None => serde_json::Value::Null,
                    };
                    updates.push(("/ChargingTime".to_string(), charging_time));
                }
            }

            InboundTopic::PhaseCurrent(idx) => {
                let current = parse_f64(payload)?;
                self.state.phase_current[idx] = current;
                updates.push((
                    format!("/Ac/L{}/Power", idx + 1),
                    serde_json::json!(phase_power(current, self.state.phase_voltage[idx])),
                ));
            }

            InboundTopic::TotalPower => {
                let watts = parse_i64(payload)?;
                self.state.charge_start = session_transition(
                    self.state.power,
                    watts as f64,
                    self.state.charge_start,
                    now,
                );
                updates.push(("/Ac/Power".to_string(), serde_json::json!(watts)));
                self.state.power = watts as f64;
            }

            InboundTopic::DailyEnergy => {
                let kwh = parse_f64(payload)?;
                if kwh != self.state.energy_forward {
                    updates.push(("/Ac/Energy/Forward".to_string(), serde_json::json!(kwh)));
                }
                self.state.energy_forward = kwh;
            }

            InboundTopic::ChargeStatus => {
                self.state.charge_status = parse_u8(payload)?;
                updates.push((
                    "/Status".to_string(),
                    serde_json::json!(combined_status(
                        self.state.plug_status,
                        self.state.charge_status
                    )),
                ));
            }

            InboundTopic::PlugStatus => {
                self.state.plug_status = parse_u8(payload)?;
                updates.push((
                    "/Status".to_string(),
                    serde_json::json!(combined_status(
                        self.state.plug_status,
                        self.state.charge_status
                    )),
                ));
            }

            InboundTopic::ConfiguredCurrent => {
                let amps = parse_i64(payload)?;
                updates.push(("/Current".to_string(), serde_json::json!(amps)));
            }

            InboundTopic::GlobalChargeMode => {
                let code = parse_u8(payload)?;
                let mode = ChargeMode::from_code(code).ok_or_else(|| {
                    SeleneError::parse(format!("charge mode out of range: {}", code))
                })?;
                self.state.charge_mode = mode;
                self.shared.set_charge_mode(mode);
                updates.push((
                    "/Mode".to_string(),
                    serde_json::json!(if mode == ChargeMode::Pv { 1 } else { 0 }),
                ));
            }
        }

        Ok(updates)
    }

    /// Read-only view of the tracked wallbox state
    pub fn state(&self) -> &WallboxState {
        &self.state
    }
}

fn parse_f64(payload: &str) -> Result<f64> {
    Ok(payload.trim().parse::<f64>()?)
}

fn parse_i64(payload: &str) -> Result<i64> {
    Ok(payload.trim().parse::<i64>()?)
}

fn parse_u8(payload: &str) -> Result<u8> {
    Ok(payload.trim().parse::<u8>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_suffixes() {
        assert_eq!(
            InboundTopic::parse("VPhase1"),
            Some(InboundTopic::PhaseVoltage(0))
        );
        assert_eq!(
            InboundTopic::parse("APhase3"),
            Some(InboundTopic::PhaseCurrent(2))
        );
        assert_eq!(InboundTopic::parse("W"), Some(InboundTopic::TotalPower));
        assert_eq!(
            InboundTopic::parse("kWhDailyCharged"),
            Some(InboundTopic::DailyEnergy)
        );
        assert_eq!(InboundTopic::parse("bogus"), None);
        // Case-sensitive, like the wallbox firmware
        assert_eq!(InboundTopic::parse("vphase1"), None);
    }
}
