use chrono::{DateTime, TimeZone, Utc};
use selene::router::{PropertyUpdate, Router};
use selene::state::{ChargeMode, LinkShared, POWER_UNKNOWN};
use std::sync::Arc;

const PREFIX: &str = "openWB/lp/1/";

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn make_router() -> (Router, Arc<LinkShared>) {
    let shared = Arc::new(LinkShared::new(ts(0)));
    let router = Router::new("openWB/lp/1/#", Arc::clone(&shared));
    (router, shared)
}

fn route(router: &mut Router, suffix: &str, payload: &str, at: i64) -> Vec<PropertyUpdate> {
    router
        .route_at(&format!("{}{}", PREFIX, suffix), payload.as_bytes(), ts(at))
        .unwrap()
}

fn value_of<'a>(updates: &'a [PropertyUpdate], path: &str) -> Option<&'a serde_json::Value> {
    updates.iter().find(|(p, _)| p == path).map(|(_, v)| v)
}

#[test]
fn averaged_voltage_published_once_after_third_phase() {
    let (mut router, _shared) = make_router();

    let u1 = route(&mut router, "VPhase1", "231.0", 10);
    assert!(u1.is_empty());
    let u2 = route(&mut router, "VPhase2", "229.0", 11);
    assert!(u2.is_empty());

    let u3 = route(&mut router, "VPhase3", "230.0", 12);
    assert_eq!(
        value_of(&u3, "/Ac/Voltage"),
        Some(&serde_json::json!(230.0))
    );
    // No active session: the session clock is published as unset
    assert_eq!(
        value_of(&u3, "/ChargingTime"),
        Some(&serde_json::Value::Null)
    );
}

#[test]
fn averaged_voltage_uses_latest_stored_values() {
    let (mut router, _shared) = make_router();

    route(&mut router, "VPhase1", "240.0", 1);
    route(&mut router, "VPhase2", "240.0", 2);
    route(&mut router, "VPhase3", "240.0", 3);

    // Only one phase updated before the next cycle completes
    route(&mut router, "VPhase1", "210.0", 4);
    let updates = route(&mut router, "VPhase3", "240.0", 5);
    assert_eq!(
        value_of(&updates, "/Ac/Voltage"),
        Some(&serde_json::json!(230.0))
    );
}

#[test]
fn per_phase_power_uses_voltage_captured_for_that_phase() {
    let (mut router, _shared) = make_router();

    route(&mut router, "VPhase1", "240.0", 1);
    let updates = route(&mut router, "APhase1", "10.0", 2);
    assert_eq!(
        value_of(&updates, "/Ac/L1/Power"),
        Some(&serde_json::json!(2400.0))
    );

    // Phase 2 voltage never reported: the 230 V default applies
    let updates = route(&mut router, "APhase2", "2.0", 3);
    assert_eq!(
        value_of(&updates, "/Ac/L2/Power"),
        Some(&serde_json::json!(460.0))
    );
}

#[test]
fn power_hysteresis_starts_and_clears_session_once() {
    let (mut router, _shared) = make_router();
    assert_eq!(router.state().power, POWER_UNKNOWN);

    let updates = route(&mut router, "W", "500", 100);
    assert_eq!(value_of(&updates, "/Ac/Power"), Some(&serde_json::json!(500)));
    assert_eq!(router.state().charge_start, None);

    // Rising through the threshold records the session start
    route(&mut router, "W", "1200", 110);
    assert_eq!(router.state().charge_start, Some(ts(110)));

    // Staying above holds the original start timestamp
    route(&mut router, "W", "1500", 120);
    assert_eq!(router.state().charge_start, Some(ts(110)));

    // Falling below clears it
    route(&mut router, "W", "800", 130);
    assert_eq!(router.state().charge_start, None);
}

#[test]
fn power_is_published_unconditionally() {
    let (mut router, _shared) = make_router();
    for _ in 0..3 {
        let updates = route(&mut router, "W", "700", 1);
        assert_eq!(value_of(&updates, "/Ac/Power"), Some(&serde_json::json!(700)));
    }
}

#[test]
fn charging_time_tracks_active_session() {
    let (mut router, _shared) = make_router();

    route(&mut router, "W", "2000", 100);
    route(&mut router, "VPhase1", "230.0", 155);
    route(&mut router, "VPhase2", "230.0", 156);
    let updates = route(&mut router, "VPhase3", "230.0", 160);
    assert_eq!(
        value_of(&updates, "/ChargingTime"),
        Some(&serde_json::json!(60))
    );

    // Session over: the clock is unset again
    route(&mut router, "W", "0", 170);
    let updates = route(&mut router, "VPhase3", "230.0", 180);
    assert_eq!(
        value_of(&updates, "/ChargingTime"),
        Some(&serde_json::Value::Null)
    );
}

#[test]
fn daily_energy_publishes_only_on_change() {
    let (mut router, _shared) = make_router();

    let updates = route(&mut router, "kWhDailyCharged", "5.5", 1);
    assert_eq!(
        value_of(&updates, "/Ac/Energy/Forward"),
        Some(&serde_json::json!(5.5))
    );

    // Redundant repeat is suppressed
    let updates = route(&mut router, "kWhDailyCharged", "5.5", 2);
    assert!(updates.is_empty());

    let updates = route(&mut router, "kWhDailyCharged", "6.0", 3);
    assert_eq!(
        value_of(&updates, "/Ac/Energy/Forward"),
        Some(&serde_json::json!(6.0))
    );
}

#[test]
fn status_precedence_charging_wins_over_plug_state() {
    let (mut router, _shared) = make_router();

    let updates = route(&mut router, "boolPlugStat", "1", 1);
    assert_eq!(value_of(&updates, "/Status"), Some(&serde_json::json!(1)));

    // Charging takes precedence regardless of the plug state
    let updates = route(&mut router, "ChargeStatus", "1", 2);
    assert_eq!(value_of(&updates, "/Status"), Some(&serde_json::json!(2)));

    let updates = route(&mut router, "boolPlugStat", "0", 3);
    assert_eq!(value_of(&updates, "/Status"), Some(&serde_json::json!(2)));

    // Charging over: the raw plug status comes through again
    let updates = route(&mut router, "ChargeStatus", "0", 4);
    assert_eq!(value_of(&updates, "/Status"), Some(&serde_json::json!(0)));
}

#[test]
fn configured_current_is_forwarded() {
    let (mut router, _shared) = make_router();
    let updates = route(&mut router, "AConfigured", "10", 1);
    assert_eq!(value_of(&updates, "/Current"), Some(&serde_json::json!(10)));
}

#[test]
fn global_charge_mode_maps_to_pv_flag() {
    let (mut router, shared) = make_router();

    let updates = router
        .route_at("openWB/global/ChargeMode", b"2", ts(1))
        .unwrap();
    assert_eq!(value_of(&updates, "/Mode"), Some(&serde_json::json!(1)));
    assert_eq!(shared.get_charge_mode(), ChargeMode::Pv);

    for code in ["0", "1", "3"] {
        let updates = router
            .route_at("openWB/global/ChargeMode", code.as_bytes(), ts(2))
            .unwrap();
        assert_eq!(value_of(&updates, "/Mode"), Some(&serde_json::json!(0)));
    }
    assert_eq!(shared.get_charge_mode(), ChargeMode::Stop);
}

#[test]
fn malformed_payload_leaves_state_and_timestamp_untouched() {
    let (mut router, shared) = make_router();
    route(&mut router, "W", "1500", 50);
    assert_eq!(shared.last_message(), 50);

    let result = router.route_at(&format!("{}W", PREFIX), b"not-a-number", ts(60));
    assert!(result.is_err());
    assert_eq!(router.state().power, 1500.0);
    assert_eq!(shared.last_message(), 50);

    // An empty payload is tolerated but still fails numeric parsing
    let result = router.route_at(&format!("{}W", PREFIX), b"", ts(61));
    assert!(result.is_err());
    assert_eq!(shared.last_message(), 50);

    // The router keeps going afterwards
    route(&mut router, "W", "1600", 70);
    assert_eq!(router.state().power, 1600.0);
    assert_eq!(shared.last_message(), 70);
}

#[test]
fn unrecognized_suffix_is_ignored() {
    let (mut router, shared) = make_router();
    let updates = route(&mut router, "boolChargeAtNight", "1", 5);
    assert!(updates.is_empty());
    // Not a successful branch: the liveness timestamp stays put
    assert_eq!(shared.last_message(), 0);
}

#[test]
fn successful_branch_touches_liveness_timestamp() {
    let (mut router, shared) = make_router();
    route(&mut router, "VPhase1", "230.0", 42);
    assert_eq!(shared.last_message(), 42);
}

#[test]
fn prefix_without_wildcard_also_matches() {
    let shared = Arc::new(LinkShared::new(ts(0)));
    let mut router = Router::new(PREFIX, Arc::clone(&shared));
    let updates = router
        .route_at(&format!("{}AConfigured", PREFIX), b"6", ts(1))
        .unwrap();
    assert_eq!(value_of(&updates, "/Current"), Some(&serde_json::json!(6)));
}
