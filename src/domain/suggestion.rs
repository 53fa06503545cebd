// Suggestion engine - decides how much power the charger should draw
use crate::domain::policy::UserPolicy;
use crate::domain::telemetry::ChargingStatus;
use chrono::{DateTime, FixedOffset};
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Wire value used for any hold, kept for clients that only read `suggestedKw`
pub const HOLD_SENTINEL_KW: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargingReason {
    #[serde(rename = "")]
    None,
    Force,
    Excess,
    Battery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HoldReason {
    /// Inverter data is too old to act on excess production
    StaleTelemetry,
    /// Suggested power is too close to the current setpoint
    WithinHysteresis,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuggestedPower {
    Set(f64),
    Hold(HoldReason),
}

impl SuggestedPower {
    pub fn as_kw(self) -> f64 {
        match self {
            SuggestedPower::Set(kw) => kw,
            SuggestedPower::Hold(_) => HOLD_SENTINEL_KW,
        }
    }

    pub fn is_hold(self) -> bool {
        matches!(self, SuggestedPower::Hold(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargingSuggestion {
    pub all_data_available: bool,
    pub reason: ChargingReason,
    pub power: SuggestedPower,
}

impl ChargingSuggestion {
    pub fn suggested_kw(&self) -> f64 {
        self.power.as_kw()
    }
}

impl Serialize for ChargingSuggestion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let hold_reason = match self.power {
            SuggestedPower::Hold(reason) => Some(reason),
            SuggestedPower::Set(_) => None,
        };
        let mut state = serializer.serialize_struct("ChargingSuggestion", 4)?;
        state.serialize_field("allDataAvailable", &self.all_data_available)?;
        state.serialize_field("currentChargingReason", &self.reason)?;
        state.serialize_field("suggestedKw", &self.suggested_kw())?;
        state.serialize_field("holdReason", &hold_reason)?;
        state.end()
    }
}

/// Votes of the three independent sub-suggestions
#[derive(Debug, Clone, Copy)]
struct Votes {
    force: f64,
    battery: f64,
    excess: Option<f64>,
}

pub fn calculate_suggestion(
    status: &ChargingStatus,
    policy: &UserPolicy,
    now: DateTime<FixedOffset>,
) -> ChargingSuggestion {
    let reason = charging_reason(status, policy);
    let votes = Votes {
        force: force_charge_suggestion(status, policy),
        battery: battery_suggestion(status, policy),
        excess: excess_charge_suggestion(status, policy, now),
    };

    let power = match votes.excess {
        None => SuggestedPower::Hold(HoldReason::StaleTelemetry),
        Some(excess) => {
            let kw = clamp_to_limits(votes.force.max(excess).max(votes.battery), policy);
            if kw >= 0.0 && (kw - status.kw).abs() < policy.kw_hysteresis_threshold {
                SuggestedPower::Hold(HoldReason::WithinHysteresis)
            } else {
                SuggestedPower::Set(round2(kw))
            }
        }
    };

    tracing::debug!(
        force = votes.force,
        battery = votes.battery,
        excess = ?votes.excess,
        current_kw = status.kw,
        suggested_kw = power.as_kw(),
        ?reason,
        "calculated charging suggestion"
    );

    ChargingSuggestion {
        all_data_available: status.got_inverter_data && status.got_wallbox_data,
        reason,
        power,
    }
}

fn charging_reason(status: &ChargingStatus, policy: &UserPolicy) -> ChargingReason {
    if status.kw <= 0.0 {
        return ChargingReason::None;
    }
    if status.battery_soc_pct > policy.charge_until_min_battery_pct {
        ChargingReason::Battery
    } else if policy.charge_with_excess && status.exceeding_kw() > 0.0 {
        ChargingReason::Excess
    } else {
        ChargingReason::Force
    }
}

fn force_charge_suggestion(status: &ChargingStatus, policy: &UserPolicy) -> f64 {
    if !policy.force_charge {
        return 0.0;
    }
    if !policy.use_awattar {
        return policy.force_charge_kw;
    }

    let current_price = status
        .current_price_cents
        .unwrap_or(policy.current_price_fallback_cents);
    if current_price < policy.force_charge_under_cents {
        policy.force_charge_kw
    } else {
        0.0
    }
}

fn battery_suggestion(status: &ChargingStatus, policy: &UserPolicy) -> f64 {
    if status.battery_soc_pct > policy.charge_until_min_battery_pct {
        policy.kw_from_battery
    } else {
        0.0
    }
}

/// `None` when the surplus would count but the inverter data is stale.
fn excess_charge_suggestion(
    status: &ChargingStatus,
    policy: &UserPolicy,
    now: DateTime<FixedOffset>,
) -> Option<f64> {
    if !policy.charge_with_excess {
        return Some(0.0);
    }

    let exceeding_kw = status.exceeding_kw();
    if exceeding_kw < 1.0 {
        return Some(0.0);
    }

    let minutes_old = now
        .signed_duration_since(status.inverter_timestamp)
        .num_minutes();
    if minutes_old >= policy.min_minutes_old_for_action {
        return None;
    }

    Some(exceeding_kw)
}

fn clamp_to_limits(kw: f64, policy: &UserPolicy) -> f64 {
    if kw > 0.0 && kw < policy.min_charging_power_kw {
        policy.min_charging_power_kw
    } else if kw > policy.max_charging_power_kw {
        policy.max_charging_power_kw
    } else {
        kw
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::{PolicyDefaults, UserSettings};
    use crate::domain::telemetry::CarStatus;
    use chrono::{Duration, TimeZone, Utc};

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(7200)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 13, 0, 0)
            .unwrap()
    }

    fn policy(settings: UserSettings) -> UserPolicy {
        UserPolicy::resolve(settings, &PolicyDefaults::default())
    }

    fn status(production: f64, usage: f64, charging_kw: f64, soc: f64) -> ChargingStatus {
        ChargingStatus {
            got_inverter_data: true,
            inverter_timestamp: now().with_timezone(&Utc),
            power_production_kw: production,
            power_usage_kw: usage,
            battery_soc_pct: soc,
            got_wallbox_data: true,
            kw: charging_kw,
            ampere: 0.0,
            phase: 0,
            charging_allowed: true,
            car_status: if charging_kw > 0.0 {
                CarStatus::Charging
            } else {
                CarStatus::Waiting
            },
            current_price_cents: None,
        }
    }

    #[test]
    fn test_excess_production_is_suggested() {
        let policy = policy(UserSettings {
            charge_with_excess_is_on: true,
            ..Default::default()
        });
        let status = status(5.0, 2.0, 0.0, 50.0);

        let suggestion = calculate_suggestion(&status, &policy, now());

        assert_eq!(suggestion.power, SuggestedPower::Set(3.0));
        assert_eq!(suggestion.reason, ChargingReason::None);
        assert!(suggestion.all_data_available);
    }

    #[test]
    fn test_reason_is_excess_while_charging_from_surplus() {
        let policy = policy(UserSettings {
            charge_with_excess_is_on: true,
            ..Default::default()
        });
        // house 2 kW + car 1.5 kW, production 5 kW
        let status = status(5.0, 3.5, 1.5, 50.0);

        let suggestion = calculate_suggestion(&status, &policy, now());

        assert_eq!(suggestion.reason, ChargingReason::Excess);
        assert_eq!(suggestion.power, SuggestedPower::Set(3.0));
    }

    #[test]
    fn test_reason_is_empty_when_not_charging() {
        let policy = policy(UserSettings {
            charge_with_excess_is_on: true,
            force_charge_is_on: true,
            charge_until_min_battery_pct: Some(10.0),
            ..Default::default()
        });
        for soc in [0.0, 50.0, 100.0] {
            let suggestion = calculate_suggestion(&status(8.0, 1.0, 0.0, soc), &policy, now());
            assert_eq!(suggestion.reason, ChargingReason::None);
        }
    }

    #[test]
    fn test_reason_precedence() {
        let battery_policy = policy(UserSettings {
            charge_with_excess_is_on: true,
            charge_until_min_battery_pct: Some(60.0),
            ..Default::default()
        });
        let suggestion = calculate_suggestion(&status(5.0, 4.0, 2.0, 80.0), &battery_policy, now());
        assert_eq!(suggestion.reason, ChargingReason::Battery);

        let force_policy = policy(UserSettings::default());
        let suggestion = calculate_suggestion(&status(0.0, 4.0, 3.0, 20.0), &force_policy, now());
        assert_eq!(suggestion.reason, ChargingReason::Force);
    }

    #[test]
    fn test_force_charge_without_price_feed_ignores_price() {
        let policy = policy(UserSettings {
            force_charge_is_on: true,
            use_awattar: false,
            force_charge_kw: Some(5.0),
            ..Default::default()
        });
        let mut status = status(0.0, 1.0, 0.0, 20.0);
        status.current_price_cents = Some(80.0);

        assert_eq!(force_charge_suggestion(&status, &policy), 5.0);
        let suggestion = calculate_suggestion(&status, &policy, now());
        assert_eq!(suggestion.power, SuggestedPower::Set(5.0));
    }

    #[test]
    fn test_force_charge_with_price_feed_respects_threshold() {
        let policy = policy(UserSettings {
            force_charge_is_on: true,
            use_awattar: true,
            force_charge_under_cents: Some(15.0),
            force_charge_kw: Some(6.0),
            ..Default::default()
        });
        let mut status = status(0.0, 1.0, 0.0, 20.0);

        status.current_price_cents = Some(14.99);
        assert_eq!(force_charge_suggestion(&status, &policy), 6.0);

        status.current_price_cents = Some(15.0);
        assert_eq!(force_charge_suggestion(&status, &policy), 0.0);

        // unknown price falls back to the (expensive) default
        status.current_price_cents = None;
        assert_eq!(force_charge_suggestion(&status, &policy), 0.0);
    }

    #[test]
    fn test_stale_inverter_data_holds_setpoint() {
        let policy = policy(UserSettings {
            charge_with_excess_is_on: true,
            force_charge_is_on: true,
            ..Default::default()
        });
        let mut status = status(6.0, 1.0, 0.0, 50.0);
        status.inverter_timestamp = (now() - Duration::minutes(10)).with_timezone(&Utc);

        let suggestion = calculate_suggestion(&status, &policy, now());

        assert_eq!(
            suggestion.power,
            SuggestedPower::Hold(HoldReason::StaleTelemetry)
        );
        assert_eq!(suggestion.suggested_kw(), HOLD_SENTINEL_KW);
    }

    #[test]
    fn test_slightly_old_data_is_still_used() {
        let policy = policy(UserSettings {
            charge_with_excess_is_on: true,
            ..Default::default()
        });
        let mut status = status(6.0, 1.0, 0.0, 50.0);
        status.inverter_timestamp =
            (now() - Duration::minutes(9) - Duration::seconds(59)).with_timezone(&Utc);

        let suggestion = calculate_suggestion(&status, &policy, now());
        assert_eq!(suggestion.power, SuggestedPower::Set(5.0));
    }

    #[test]
    fn test_hysteresis_holds_small_changes() {
        let policy = policy(UserSettings {
            charge_with_excess_is_on: true,
            ..Default::default()
        });
        // surplus 3.3 kW while already charging at 3 kW
        let status = status(6.3, 6.0, 3.0, 50.0);

        let suggestion = calculate_suggestion(&status, &policy, now());
        assert_eq!(
            suggestion.power,
            SuggestedPower::Hold(HoldReason::WithinHysteresis)
        );
    }

    #[test]
    fn test_hysteresis_holds_when_idle_and_nothing_to_do() {
        let policy = policy(UserSettings::default());
        let suggestion = calculate_suggestion(&status(0.0, 1.0, 0.0, 20.0), &policy, now());
        assert_eq!(
            suggestion.power,
            SuggestedPower::Hold(HoldReason::WithinHysteresis)
        );
    }

    #[test]
    fn test_stop_is_suggested_when_all_features_are_off() {
        let policy = policy(UserSettings::default());
        let suggestion = calculate_suggestion(&status(0.0, 5.0, 4.0, 20.0), &policy, now());
        assert_eq!(suggestion.power, SuggestedPower::Set(0.0));
        assert_eq!(suggestion.reason, ChargingReason::Force);
    }

    #[test]
    fn test_clamping_to_power_limits() {
        let policy = policy(UserSettings {
            charge_with_excess_is_on: true,
            ..Default::default()
        });

        // 1.2 kW surplus is raised to the 1.5 kW minimum
        let low = calculate_suggestion(&status(2.2, 1.0, 0.0, 50.0), &policy, now());
        assert_eq!(low.power, SuggestedPower::Set(1.5));

        // 15 kW surplus is capped at 9 kW
        let high = calculate_suggestion(&status(16.0, 1.0, 0.0, 50.0), &policy, now());
        assert_eq!(high.power, SuggestedPower::Set(9.0));
    }

    #[test]
    fn test_clamped_values_never_fall_inside_forbidden_range() {
        let policy = policy(UserSettings {
            charge_with_excess_is_on: true,
            force_charge_is_on: true,
            charge_until_min_battery_pct: Some(70.0),
            ..Default::default()
        });
        for production in [0.0, 1.0, 1.7, 2.4, 5.5, 9.9, 14.0, 30.0] {
            for current in [0.0, 1.5, 4.0, 9.0] {
                for soc in [10.0, 90.0] {
                    let status = status(production, 1.0 + current, current, soc);
                    if let SuggestedPower::Set(kw) = calculate_suggestion(&status, &policy, now()).power {
                        assert!(kw == 0.0 || kw >= policy.min_charging_power_kw, "{kw}");
                        assert!(kw <= policy.max_charging_power_kw, "{kw}");
                        assert!((kw - current).abs() >= policy.kw_hysteresis_threshold);
                    }
                }
            }
        }
    }

    #[test]
    fn test_battery_vote_is_rounded_and_wins_when_highest() {
        let policy = UserPolicy {
            kw_from_battery: 3.456,
            charge_until_min_battery_pct: 40.0,
            ..policy(UserSettings::default())
        };
        let suggestion = calculate_suggestion(&status(0.0, 1.0, 0.0, 41.0), &policy, now());
        assert_eq!(suggestion.power, SuggestedPower::Set(3.46));
    }

    #[test]
    fn test_wire_format_keeps_sentinel_and_names_the_hold() {
        let suggestion = ChargingSuggestion {
            all_data_available: false,
            reason: ChargingReason::None,
            power: SuggestedPower::Hold(HoldReason::WithinHysteresis),
        };
        let json = serde_json::to_value(&suggestion).unwrap();

        assert_eq!(json["suggestedKw"], -1.0);
        assert_eq!(json["holdReason"], "withinHysteresis");
        assert_eq!(json["currentChargingReason"], "");

        let set = ChargingSuggestion {
            all_data_available: true,
            reason: ChargingReason::Excess,
            power: SuggestedPower::Set(4.2),
        };
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["suggestedKw"], 4.2);
        assert!(json["holdReason"].is_null());
        assert_eq!(json["currentChargingReason"], "excess");
    }
}
