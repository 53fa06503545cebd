// Daily auto-reset of the force charge flag
use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Timelike};

const WINDOW_START: (u32, u32) = (6, 0);
const WINDOW_END: (u32, u32) = (6, 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetState {
    /// Force charging is off or auto turn-off is disabled
    Inactive,
    OutsideWindow,
    PendingReset,
    ResetDoneToday,
}

/// Where the daily reset stands for `now`. Only `PendingReset` requires
/// clearing the force charge flag and stamping the reset time.
pub fn evaluate<Tz: TimeZone>(
    force_charge_is_on: bool,
    auto_turn_off_force_charging: bool,
    last_reset: Option<DateTime<FixedOffset>>,
    now: &DateTime<Tz>,
) -> ResetState {
    if !(force_charge_is_on && auto_turn_off_force_charging) {
        return ResetState::Inactive;
    }
    if !in_reset_window(now.time()) {
        return ResetState::OutsideWindow;
    }

    let today = now.date_naive();
    let reset_today = last_reset
        .map(|at| at.with_timezone(&now.timezone()).date_naive() == today)
        .unwrap_or(false);

    if reset_today {
        ResetState::ResetDoneToday
    } else {
        ResetState::PendingReset
    }
}

/// `[WINDOW_START, WINDOW_END)` as (hour, minute)
fn in_reset_window(time: NaiveTime) -> bool {
    let hour_minute = (time.hour(), time.minute());
    (WINDOW_START..WINDOW_END).contains(&hour_minute)
}
