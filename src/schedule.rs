//! Daily trigger for the pipeline.

use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use std::future::Future;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// The next `hh:mm` strictly after `now`: today's slot if still ahead, otherwise tomorrow's.
///
/// A slot that does not exist on a given day (a DST gap) moves on to the next day.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32, minute: u32) -> Result<DateTime<Tz>> {
    let slot = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| Error::Config(format!("invalid schedule time {hour:02}:{minute:02}")))?;

    let today = now.date_naive();
    for offset in 0..=2 {
        let Some(day) = today.checked_add_days(Days::new(offset)) else {
            break;
        };
        let candidate = now.timezone().from_local_datetime(&day.and_time(slot)).earliest();
        if let Some(at) = candidate {
            if at > *now {
                return Ok(at);
            }
        }
    }
    Err(Error::Config(format!("no upcoming slot for {hour:02}:{minute:02}")))
}

/// Call `job` every day at `hour:minute` local time until Ctrl-C.
///
/// A failing job is logged and the loop carries on with the next day.
pub async fn run_daily<F, Fut, T>(hour: u32, minute: u32, mut job: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    loop {
        let now = Local::now();
        let next = next_run_after(&now, hour, minute)?;
        let wait = (next.clone() - now).to_std().unwrap_or_default();
        info!(next = %next.to_rfc3339(), wait_secs = wait.as_secs(), "Waiting for next scheduled run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted; scheduler stopping");
                return Ok(());
            }
        }

        if let Err(e) = job().await {
            error!(error = %e, "Scheduled run failed; will retry at the next slot");
        }
    }
}
