//! Daily trigger and per-run retry policy.
//!
//! Missed runs are never backfilled: the next occurrence is always computed
//! from the current time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expr}': {reason}")]
    CronParse { expr: String, reason: String },

    #[error("Cron expression '{0}' has no upcoming occurrence")]
    NoNextRun(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// 5- or 6-field cron expression, or a shorthand such as `@daily`.
    #[serde(default = "default_cron")]
    pub cron: String,

    /// Extra attempts after a failed run.
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            retries: default_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl ScheduleConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn schedule(&self) -> Result<cron::Schedule, ScheduleError> {
        parse_cron(&self.cron)
    }
}

fn default_cron() -> String {
    "@daily".to_string()
}

fn default_retries() -> u32 {
    1
}

fn default_retry_delay_secs() -> u64 {
    300
}

/// The `cron` crate wants a leading seconds field; plain 5-field crontab
/// expressions get `0` prepended.
fn normalize_cron_expr(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn parse_cron(expr: &str) -> Result<cron::Schedule, ScheduleError> {
    cron::Schedule::from_str(&normalize_cron_expr(expr)).map_err(|e| ScheduleError::CronParse {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Next occurrence of `expr` strictly after `after`.
pub fn next_run_after(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    parse_cron(expr)?
        .after(&after)
        .next()
        .ok_or_else(|| ScheduleError::NoNextRun(expr.to_string()))
}

/// Run `task`, retrying up to `policy.retries` times with `policy.retry_delay()`
/// between attempts. The closure receives the 0-based attempt number.
pub async fn run_with_retry<T, E, F, Fut>(policy: &ScheduleConfig, mut task: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match task(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.retries => {
                attempt += 1;
                log::warn!(
                    "Run failed: {e}. Retrying in {}s (attempt {} of {})",
                    policy.retry_delay_secs,
                    attempt,
                    policy.retries
                );
                tokio::time::sleep(policy.retry_delay()).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sleep until each cron occurrence and run `job` with retries. Failed runs
/// are logged and the loop continues. Returns only if the cron expression is
/// invalid or exhausted.
pub async fn run_on_schedule<T, E, F, Fut>(
    policy: &ScheduleConfig,
    mut job: F,
) -> Result<(), ScheduleError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let schedule = policy.schedule()?;

    loop {
        let now = Utc::now();
        let next = schedule
            .after(&now)
            .next()
            .ok_or_else(|| ScheduleError::NoNextRun(policy.cron.clone()))?;

        log::info!("Next run at {next}");
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        log::info!("Starting scheduled run");
        match run_with_retry(policy, &mut job).await {
            Ok(_) => log::info!("Scheduled run finished"),
            Err(e) => log::error!("Scheduled run failed after {} retries: {e}", policy.retries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::Cell;

    fn no_delay(retries: u32) -> ScheduleConfig {
        ScheduleConfig { retries, retry_delay_secs: 0, ..Default::default() }
    }

    #[test]
    fn defaults_match_daily_single_retry() {
        let cfg = ScheduleConfig::default();
        assert_eq!(cfg.cron, "@daily");
        assert_eq!(cfg.retries, 1);
        assert_eq!(cfg.retry_delay(), Duration::from_secs(300));
    }

    #[test]
    fn daily_runs_at_next_midnight() {
        let after = Utc.with_ymd_and_hms(2025, 5, 4, 12, 30, 0).unwrap();
        let next = next_run_after("@daily", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 5, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn five_field_expression_is_accepted() {
        let after = Utc.with_ymd_and_hms(2025, 5, 4, 12, 30, 0).unwrap();
        let next = next_run_after("15 6 * * *", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 5, 5, 6, 15, 0).unwrap());
    }

    #[test]
    fn invalid_expression_is_rejected() {
        let err = next_run_after("every day", Utc::now()).unwrap_err();
        assert!(matches!(err, ScheduleError::CronParse { .. }));
    }

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let attempts = Cell::new(0);
        let result: Result<&str, String> = run_with_retry(&no_delay(1), |attempt| {
            attempts.set(attempts.get() + 1);
            async move { if attempt == 0 { Err("boom".to_string()) } else { Ok("done") } }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.get(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let attempts = Cell::new(0);
        let result: Result<(), String> = run_with_retry(&no_delay(1), |attempt| {
            attempts.set(attempts.get() + 1);
            async move { Err(format!("attempt {attempt} failed")) }
        })
        .await;

        assert_eq!(result, Err("attempt 1 failed".to_string()));
        assert_eq!(attempts.get(), 2);
    }

    #[tokio::test]
    async fn zero_retries_runs_once() {
        let attempts = Cell::new(0);
        let result: Result<(), String> = run_with_retry(&no_delay(0), |_| {
            attempts.set(attempts.get() + 1);
            async { Err("boom".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_run_does_not_stop_the_loop() {
        let every_second =
            ScheduleConfig { cron: "* * * * * *".into(), retries: 0, retry_delay_secs: 0 };
        let runs = Cell::new(0);

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            run_on_schedule(&every_second, |_| {
                runs.set(runs.get() + 1);
                let first = runs.get() == 1;
                async move { if first { Err("boom".to_string()) } else { Ok(()) } }
            }),
        )
        .await;

        assert!(outcome.is_err(), "loop returned early: {outcome:?}");
        assert!(runs.get() >= 2, "only {} runs", runs.get());
    }

    #[tokio::test]
    async fn invalid_cron_stops_before_first_run() {
        let broken = ScheduleConfig { cron: "every day".into(), ..Default::default() };
        let runs = Cell::new(0);

        let result = run_on_schedule(&broken, |_| {
            runs.set(runs.get() + 1);
            async { Ok::<(), String>(()) }
        })
        .await;

        assert!(matches!(result, Err(ScheduleError::CronParse { .. })));
        assert_eq!(runs.get(), 0);
    }
}
