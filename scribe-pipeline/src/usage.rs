//! Daily token budget monitoring

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use config_engine::UsageConfig;
use error_common::PipelineResult;

use crate::providers::{DailyUsage, UsageStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    None,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub date: NaiveDate,
    pub totals: DailyUsage,
    pub daily_limit: u64,
    /// Share of the daily budget used, 0 to 100 (may exceed 100)
    pub percentage: f64,
    pub remaining_tokens: u64,
    pub level: AlertLevel,
}

pub struct UsageMonitor {
    store: Arc<dyn UsageStore>,
    budget: UsageConfig,
}

impl UsageMonitor {
    pub fn new(store: Arc<dyn UsageStore>, budget: UsageConfig) -> Self {
        Self { store, budget }
    }

    /// Compares the day's totals against the configured thresholds.
    ///
    /// # Errors
    ///
    /// Propagates failures reading the summary view. A day without usage is
    /// not an error.
    pub async fn check(&self, date: NaiveDate) -> PipelineResult<UsageReport> {
        let totals = self.store.daily_summary(date).await?.unwrap_or_default();
        let limit = self.budget.daily_token_limit.max(1);

        #[allow(clippy::cast_precision_loss)]
        let fraction = totals.total_tokens as f64 / limit as f64;
        let level = if fraction >= self.budget.critical_threshold {
            AlertLevel::Critical
        } else if fraction >= self.budget.warning_threshold {
            AlertLevel::Warning
        } else {
            AlertLevel::None
        };

        let report = UsageReport {
            date,
            totals,
            daily_limit: self.budget.daily_token_limit,
            percentage: fraction * 100.0,
            remaining_tokens: self.budget.daily_token_limit.saturating_sub(totals.total_tokens),
            level,
        };

        match level {
            AlertLevel::Critical => error!(
                %date,
                total_tokens = totals.total_tokens,
                percentage = report.percentage,
                "Daily token usage critical"
            ),
            AlertLevel::Warning => warn!(
                %date,
                total_tokens = totals.total_tokens,
                percentage = report.percentage,
                "Daily token usage high"
            ),
            AlertLevel::None => info!(%date, total_tokens = totals.total_tokens, sessions = totals.sessions, "Daily token usage"),
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    use error_common::PipelineError;

    use crate::providers::MockUsageStore;

    fn monitor(total_tokens: Option<u64>) -> UsageMonitor {
        let mut store = MockUsageStore::new();
        store.expect_daily_summary().returning(move |_| {
            Ok(total_tokens.map(|total| DailyUsage {
                input_tokens: total / 2,
                output_tokens: total - total / 2,
                total_tokens: total,
                sessions: 3,
            }))
        });
        UsageMonitor::new(
            Arc::new(store),
            UsageConfig {
                daily_token_limit: 1_000_000,
                warning_threshold: 0.80,
                critical_threshold: 0.95,
            },
        )
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn test_levels_follow_fractional_thresholds() {
        assert_eq!(monitor(Some(500_000)).check(day()).await.unwrap().level, AlertLevel::None);
        assert_eq!(monitor(Some(800_000)).check(day()).await.unwrap().level, AlertLevel::Warning);
        assert_eq!(monitor(Some(960_000)).check(day()).await.unwrap().level, AlertLevel::Critical);
    }

    #[tokio::test]
    async fn test_report_fields() {
        let report = monitor(Some(850_000)).check(day()).await.unwrap();
        assert!((report.percentage - 85.0).abs() < 1e-9);
        assert_eq!(report.remaining_tokens, 150_000);
        assert_eq!(report.totals.sessions, 3);
    }

    #[tokio::test]
    async fn test_day_without_usage() {
        let report = assert_ok!(monitor(None).check(day()).await);
        assert_eq!(report.totals, DailyUsage::default());
        assert_eq!(report.level, AlertLevel::None);
        assert_eq!(report.remaining_tokens, 1_000_000);
    }

    #[tokio::test]
    async fn test_summary_failure_propagates() {
        let mut store = MockUsageStore::new();
        store
            .expect_daily_summary()
            .returning(|_| Err(PipelineError::datastore("relation does not exist")));
        let monitor = UsageMonitor::new(Arc::new(store), UsageConfig::default());
        let err = assert_err!(monitor.check(day()).await);
        assert_eq!(err.error_code(), "DatastoreError");
    }
}
