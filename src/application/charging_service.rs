// Charging service - composes telemetry, prices and policy into decisions
use crate::application::ports::{AdapterError, DeviceFactory, PolicyStore, PriceProvider};
use crate::domain::auto_reset::{self, ResetState};
use crate::domain::policy::{PolicyDefaults, PolicyError, UserPolicy, UserSettings};
use crate::domain::schedule::{self, FailedReason, HourlyPrice, ScheduleResult};
use crate::domain::suggestion::{ChargingSuggestion, calculate_suggestion};
use crate::domain::telemetry::{
    ChargingStatus, InverterReading, InverterStatistic, PriceEntry, StatisticsRange,
    WallboxCommandResult, WallboxReading, start_of_hour,
};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Extra hours fetched past the deadline so the deadline entry is present
const PRICE_WINDOW_MARGIN_HOURS: i64 = 2;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown user {0}")]
    UnknownUser(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] PolicyError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingInfo {
    #[serde(flatten)]
    pub status: ChargingStatus,
    pub user_settings: UserPolicy,
    pub suggestion: ChargingSuggestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    DontChange,
    AutoExecuteDisabled,
    Applied,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedSuggestion {
    pub charging_info: ChargingInfo,
    pub result: ApplyOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_box_result: Option<WallboxCommandResult>,
}

#[derive(Clone)]
pub struct ChargingService {
    store: Arc<dyn PolicyStore>,
    devices: Arc<dyn DeviceFactory>,
    prices: Arc<dyn PriceProvider>,
    defaults: PolicyDefaults,
}

impl ChargingService {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        devices: Arc<dyn DeviceFactory>,
        prices: Arc<dyn PriceProvider>,
        defaults: PolicyDefaults,
    ) -> Self {
        Self {
            store,
            devices,
            prices,
            defaults,
        }
    }

    pub async fn load_policy(&self, user: &str) -> Result<UserPolicy, ServiceError> {
        let settings = self
            .store
            .load(user)
            .await?
            .ok_or_else(|| ServiceError::UnknownUser(user.to_string()))?;
        Ok(UserPolicy::resolve(settings, &self.defaults))
    }

    /// Status snapshot and suggestion for the current tick
    pub async fn charging_info(
        &self,
        user: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<ChargingInfo, ServiceError> {
        let policy = self.policy_after_auto_reset(user, now).await?;

        let inverter = self.devices.inverter(&policy);
        let wallbox = self.devices.wallbox(&policy);
        let current_price = async {
            if policy.use_awattar {
                self.prices.current_price(now).await
            } else {
                None
            }
        };

        let (inverter_data, wallbox_data, current_price) = futures::join!(
            inverter.real_time_data(),
            wallbox.real_time_data(),
            current_price
        );

        let status = ChargingStatus::assemble(
            ok_or_warn("inverter", inverter_data),
            ok_or_warn("wallbox", wallbox_data),
            current_price,
            now,
        );
        let suggestion = calculate_suggestion(&status, &policy, now);

        Ok(ChargingInfo {
            status,
            user_settings: policy,
            suggestion,
        })
    }

    /// Plans deadline-bound force charging for the user's car
    pub async fn schedule_suggestion(
        &self,
        user: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<ScheduleResult, ServiceError> {
        let policy = self.load_policy(user).await?;

        let deficit_kwh = schedule::deficit_kwh(&policy.car);
        if deficit_kwh <= 0.0 {
            return Ok(ScheduleResult::not_necessary());
        }

        let Some(deadline) = schedule::next_deadline(&now, policy.car.target_hour) else {
            tracing::warn!(user, target_hour = policy.car.target_hour, "no valid deadline");
            return Ok(ScheduleResult::failed(FailedReason::NotEnoughData));
        };

        let minutes_left = deadline.signed_duration_since(now).num_minutes();
        let window_hours = (minutes_left + 59) / 60 + PRICE_WINDOW_MARGIN_HOURS;
        let Some(entries) = self.prices.prices(now, window_hours, 0).await else {
            return Ok(ScheduleResult::failed(FailedReason::NoPriceData));
        };

        // price entries are aligned to UTC hours, local offsets need not be
        let deadline_hour = start_of_hour(deadline);
        if !entries.iter().any(|entry| entry.time == deadline_hour) {
            tracing::info!(user, %deadline_hour, "no price published for the deadline hour yet");
            return Ok(ScheduleResult::failed(FailedReason::NotEnoughData));
        }

        let now = now.with_timezone(&Utc);
        let window: Vec<HourlyPrice> = entries
            .iter()
            .filter(|entry| entry.time > now && entry.time <= deadline_hour)
            .map(|entry| HourlyPrice {
                hour: entry.time,
                price_cents: entry.gross_price_cents,
            })
            .collect();

        Ok(
            match schedule::plan_force_charging(
                deficit_kwh,
                &window,
                policy.max_charging_power_kw,
            ) {
                Some(plan) => ScheduleResult::suggestion(plan),
                None => ScheduleResult::failed(FailedReason::NotEnoughData),
            },
        )
    }

    pub async fn set_charging_speed(
        &self,
        user: &str,
        kw: f64,
    ) -> Result<WallboxCommandResult, ServiceError> {
        let policy = self.load_policy(user).await?;
        Ok(self.send_to_wallbox(&policy, kw).await)
    }

    /// Executes the current suggestion when auto execution is enabled
    pub async fn apply_suggestion(
        &self,
        user: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<AppliedSuggestion, ServiceError> {
        let charging_info = self.charging_info(user, now).await?;

        if charging_info.suggestion.power.is_hold() {
            return Ok(AppliedSuggestion {
                charging_info,
                result: ApplyOutcome::DontChange,
                wall_box_result: None,
            });
        }
        if !charging_info.user_settings.auto_execute_suggestions {
            return Ok(AppliedSuggestion {
                charging_info,
                result: ApplyOutcome::AutoExecuteDisabled,
                wall_box_result: None,
            });
        }

        let result = self
            .send_to_wallbox(
                &charging_info.user_settings,
                charging_info.suggestion.suggested_kw(),
            )
            .await;
        Ok(AppliedSuggestion {
            charging_info,
            result: ApplyOutcome::Applied,
            wall_box_result: Some(result),
        })
    }

    /// Raises the charging power to the suggestion unless it is below `kw`
    pub async fn charge_to_suggestion(
        &self,
        user: &str,
        kw: f64,
        now: DateTime<FixedOffset>,
    ) -> Result<WallboxCommandResult, ServiceError> {
        let info = self.charging_info(user, now).await?;
        let suggested_kw = info.suggestion.suggested_kw();
        if suggested_kw < kw {
            return Ok(WallboxCommandResult::success_with("Nothing to change"));
        }
        Ok(self.send_to_wallbox(&info.user_settings, suggested_kw).await)
    }

    pub async fn inverter_realtime(
        &self,
        user: &str,
    ) -> Result<Option<InverterReading>, ServiceError> {
        let policy = self.load_policy(user).await?;
        let reading = self.devices.inverter(&policy).real_time_data().await;
        Ok(ok_or_warn("inverter", reading))
    }

    /// Recorded inverter readings for the days `from..=to`
    pub async fn inverter_time_frame(
        &self,
        user: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Option<Vec<InverterReading>>, ServiceError> {
        let policy = self.load_policy(user).await?;
        let readings = self.devices.inverter(&policy).time_frame_data(from, to).await;
        Ok(ok_or_warn("inverter history", readings))
    }

    pub async fn inverter_statistics(
        &self,
        user: &str,
        reference: NaiveDate,
        range: StatisticsRange,
    ) -> Result<Option<Vec<InverterStatistic>>, ServiceError> {
        let policy = self.load_policy(user).await?;
        let statistics = self
            .devices
            .inverter(&policy)
            .statistics(reference, range)
            .await;
        Ok(ok_or_warn("inverter statistics", statistics))
    }

    pub async fn wallbox_realtime(
        &self,
        user: &str,
    ) -> Result<Option<WallboxReading>, ServiceError> {
        let policy = self.load_policy(user).await?;
        let reading = self.devices.wallbox(&policy).real_time_data().await;
        Ok(ok_or_warn("wallbox", reading))
    }

    pub async fn prices(
        &self,
        now: DateTime<FixedOffset>,
        hours: i64,
        offset_hours: i64,
    ) -> Option<Vec<PriceEntry>> {
        self.prices.prices(now, hours, offset_hours).await
    }

    pub async fn save_settings(
        &self,
        user: &str,
        settings: &UserSettings,
    ) -> Result<(), ServiceError> {
        settings.validate()?;
        self.store.save(user, settings).await?;
        tracing::info!(user, "settings saved");
        Ok(())
    }

    pub async fn set_pause_charging(&self, user: &str, paused: bool) -> Result<(), ServiceError> {
        self.store.set_pause_charging(user, paused).await?;
        tracing::info!(user, paused, "pause charging updated");
        Ok(())
    }

    async fn policy_after_auto_reset(
        &self,
        user: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<UserPolicy, ServiceError> {
        let policy = self.load_policy(user).await?;
        let state = auto_reset::evaluate(
            policy.force_charge,
            policy.auto_turn_off_force_charging,
            policy.last_force_charge_reset,
            &now,
        );
        if state != ResetState::PendingReset {
            return Ok(policy);
        }

        tracing::info!(user, %now, "turning off force charging for today");
        self.store.record_force_charge_reset(user, now).await?;
        self.load_policy(user).await
    }

    async fn send_to_wallbox(&self, policy: &UserPolicy, kw: f64) -> WallboxCommandResult {
        let kw = if policy.pause_charging { 0.0 } else { kw };
        match self.devices.wallbox(policy).set_charging_speed(kw).await {
            Ok(result) => {
                tracing::info!(kw, status = ?result.status, "wallbox charging speed set");
                result
            }
            Err(e) => {
                tracing::warn!(kw, "failed to set wallbox charging speed: {}", e);
                WallboxCommandResult::error(e.to_string())
            }
        }
    }
}

fn ok_or_warn<T>(source: &'static str, result: Result<T, AdapterError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(source, "telemetry unavailable: {}", e);
            None
        }
    }
}
