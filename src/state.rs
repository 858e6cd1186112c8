//! Wallbox state tracking and derived-value computations
//!
//! This module holds the in-memory mirror of the wallbox telemetry and the
//! pure functions that derive published values from it: voltage averaging,
//! per-phase power, charge-session transitions, and status precedence.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

/// Power level above which a charge session is considered active, in watts
pub const CHARGE_ACTIVITY_THRESHOLD_W: f64 = 1000.0;

/// `ChargeStatus` value the wallbox reports while delivering energy
pub const CHARGE_STATUS_CHARGING: u8 = 1;

/// Combined status code published while charging
pub const COMBINED_STATUS_CHARGING: u8 = 2;

/// Default phase voltage assumed until the wallbox reports one
pub const DEFAULT_PHASE_VOLTAGE: f64 = 230.0;

/// Sentinel for "no power reading received yet"
pub const POWER_UNKNOWN: f64 = -1.0;

/// Wallbox charge mode as reported on the global openWB topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeMode {
    /// Charge immediately at the configured current ("Sofort")
    Immediate = 0,

    /// PV charging with a grid-assisted minimum
    MinPv = 1,

    /// Pure PV surplus charging
    Pv = 2,

    /// Charging stopped
    Stop = 3,
}

impl ChargeMode {
    /// Map a wire code to a mode; `None` for codes outside the enum
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ChargeMode::Immediate),
            1 => Some(ChargeMode::MinPv),
            2 => Some(ChargeMode::Pv),
            3 => Some(ChargeMode::Stop),
            _ => None,
        }
    }

    /// Wire code for this mode
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// In-memory mirror of the wallbox telemetry
///
/// Owned by the topic router and mutated only from the MQTT delivery task.
#[derive(Debug, Clone)]
pub struct WallboxState {
    /// Last known active power in watts, `POWER_UNKNOWN` until first report
    pub power: f64,

    /// Per-phase current in amperes (L1..L3)
    pub phase_current: [f64; 3],

    /// Per-phase voltage in volts (L1..L3)
    pub phase_voltage: [f64; 3],

    /// Last seen daily forward energy counter in kWh
    pub energy_forward: f64,

    /// Raw plug status as reported by the wallbox
    pub plug_status: u8,

    /// Raw charge status as reported by the wallbox
    pub charge_status: u8,

    /// Global charge mode as reported by the wallbox
    pub charge_mode: ChargeMode,

    /// Start of the active charge session, if any
    pub charge_start: Option<DateTime<Utc>>,
}

impl Default for WallboxState {
    fn default() -> Self {
        Self {
            power: POWER_UNKNOWN,
            phase_current: [0.0; 3],
            phase_voltage: [DEFAULT_PHASE_VOLTAGE; 3],
            energy_forward: 0.0,
            plug_status: 0,
            charge_status: 0,
            charge_mode: ChargeMode::Stop,
            charge_start: None,
        }
    }
}

/// Snapshot fields shared across the transport and property-store domains
///
/// The MQTT delivery task writes these; the watchdog/heartbeat loop and the
/// back-channel only read them. Atomics keep the hand-off free of locks.
pub struct LinkShared {
    /// Unix timestamp of the last successfully routed inbound message
    pub last_message_unix: AtomicI64,

    /// Wire code of the last seen global charge mode
    pub charge_mode: AtomicU8,
}

impl LinkShared {
    /// Create a snapshot seeded with the given start time
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            last_message_unix: AtomicI64::new(started_at.timestamp()),
            charge_mode: AtomicU8::new(ChargeMode::Stop.code()),
        }
    }

    /// Record the arrival of a routed message
    pub fn touch(&self, now: DateTime<Utc>) {
        self.last_message_unix.store(now.timestamp(), Ordering::Relaxed);
    }

    /// Unix timestamp of the last routed message
    pub fn last_message(&self) -> i64 {
        self.last_message_unix.load(Ordering::Relaxed)
    }

    /// Record the latest charge mode
    pub fn set_charge_mode(&self, mode: ChargeMode) {
        self.charge_mode.store(mode.code(), Ordering::Relaxed);
    }

    /// Latest charge mode
    pub fn get_charge_mode(&self) -> ChargeMode {
        ChargeMode::from_code(self.charge_mode.load(Ordering::Relaxed)).unwrap_or(ChargeMode::Stop)
    }
}

/// Arithmetic mean of the three phase voltages
pub fn average_voltage(v1: f64, v2: f64, v3: f64) -> f64 {
    (v1 + v2 + v3) / 3.0
}

/// Active power of a single phase
pub fn phase_power(current: f64, voltage: f64) -> f64 {
    current * voltage
}

/// Charge-session hysteresis on the total-power reading
///
/// A session starts when power rises through the activity threshold and ends
/// whenever power falls below it; in between the start timestamp is held.
pub fn session_transition(
    prev_power: f64,
    new_power: f64,
    prev_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if new_power > CHARGE_ACTIVITY_THRESHOLD_W && prev_power <= CHARGE_ACTIVITY_THRESHOLD_W {
        Some(now)
    } else if new_power < CHARGE_ACTIVITY_THRESHOLD_W {
        None
    } else {
        prev_start
    }
}

/// Combined status code: charging takes precedence over the plug state
pub fn combined_status(plug_status: u8, charge_status: u8) -> u8 {
    if charge_status == CHARGE_STATUS_CHARGING {
        COMBINED_STATUS_CHARGING
    } else {
        plug_status
    }
}
