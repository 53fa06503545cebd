// Deadline-bound force charging: threshold search over an hourly price curve
use crate::domain::policy::CarBattery;
use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use serde::Serialize;

/// Added to the winning price so that strict `price < threshold` checks
/// still include the boundary hour.
pub const THRESHOLD_MARGIN_CENTS: f64 = 0.1;

const EPSILON_KWH: f64 = 1e-9;

/// One candidate hour for charging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyPrice {
    pub hour: DateTime<Utc>,
    pub price_cents: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargePlan {
    pub threshold_price_cents: f64,
    pub suggested_kw: f64,
    pub hours_charging: usize,
    /// Currency units (cents x kWh / 100)
    #[serde(rename = "estimatedCostCents")]
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    NotNecessary,
    NoSuggestion,
    Suggestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedReason {
    NoPriceData,
    NotEnoughData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResult {
    pub status: ScheduleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<FailedReason>,
    #[serde(flatten)]
    pub plan: Option<ChargePlan>,
}

impl ScheduleResult {
    pub fn not_necessary() -> Self {
        Self {
            status: ScheduleStatus::NotNecessary,
            failed_reason: None,
            plan: None,
        }
    }

    pub fn failed(reason: FailedReason) -> Self {
        Self {
            status: ScheduleStatus::NoSuggestion,
            failed_reason: Some(reason),
            plan: None,
        }
    }

    pub fn suggestion(plan: ChargePlan) -> Self {
        Self {
            status: ScheduleStatus::Suggestion,
            failed_reason: None,
            plan: Some(plan),
        }
    }
}

/// kWh still needed to bring the car from its current to its target level
pub fn deficit_kwh(car: &CarBattery) -> f64 {
    car.capacity_kwh * (car.target_pct - car.current_pct) / 100.0
}

/// Today at `target_hour:00` if that is still ahead of `now`, else tomorrow.
pub fn next_deadline<Tz: TimeZone>(now: &DateTime<Tz>, target_hour: u32) -> Option<DateTime<Tz>> {
    let at = NaiveTime::from_hms_opt(target_hour, 0, 0)?;
    let today = now.date_naive();
    let candidate = now
        .timezone()
        .from_local_datetime(&today.and_time(at))
        .earliest()?;
    if candidate > *now {
        return Some(candidate);
    }
    let tomorrow = today.checked_add_days(Days::new(1))?;
    now.timezone()
        .from_local_datetime(&tomorrow.and_time(at))
        .earliest()
}

/// Cheapest price threshold whose hours (in chronological order) cover
/// `deficit_kwh` when charging at `max_kw`. `None` if even every hour at
/// full power is not enough.
pub fn plan_force_charging(
    deficit_kwh: f64,
    prices: &[HourlyPrice],
    max_kw: f64,
) -> Option<ChargePlan> {
    if deficit_kwh <= 0.0 || max_kw <= 0.0 {
        return None;
    }

    let mut thresholds: Vec<f64> = prices.iter().map(|p| p.price_cents).collect();
    thresholds.sort_by(f64::total_cmp);
    thresholds.dedup();

    thresholds.into_iter().find_map(|threshold| {
        let run = simulate(deficit_kwh, prices, threshold, max_kw);
        if run.total_kwh + EPSILON_KWH < deficit_kwh {
            return None;
        }

        let average_kw = (deficit_kwh / run.hours as f64).min(max_kw);
        tracing::debug!(
            threshold,
            hours = run.hours,
            total_kwh = run.total_kwh,
            "force charging threshold found"
        );

        Some(ChargePlan {
            threshold_price_cents: round_to(threshold + THRESHOLD_MARGIN_CENTS, 2),
            suggested_kw: round_to(average_kw, 1),
            hours_charging: run.hours,
            estimated_cost: round_to(run.cost_cent_kwh / 100.0, 2),
        })
    })
}

#[derive(Debug, Default)]
struct SimulatedRun {
    total_kwh: f64,
    cost_cent_kwh: f64,
    hours: usize,
}

fn simulate(deficit_kwh: f64, prices: &[HourlyPrice], threshold: f64, max_kw: f64) -> SimulatedRun {
    let mut run = SimulatedRun::default();
    for entry in prices.iter().filter(|p| p.price_cents <= threshold) {
        if run.total_kwh + EPSILON_KWH >= deficit_kwh {
            break;
        }
        let kwh = max_kw.min(deficit_kwh - run.total_kwh);
        run.total_kwh += kwh;
        run.cost_cent_kwh += kwh * entry.price_cents;
        run.hours += 1;
    }
    run
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
