//! Dashboard: four read-only queries loaded together.
//!
//! The page renders all four or none. One failed read fails the load, and a
//! 401 from any of them signs the user out.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Date, PrimitiveDateTime};

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::Error;
use crate::model::sorted_counts;
use crate::traits::DashboardApi;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");
time::serde::format_description!(
    iso_datetime,
    PrimitiveDateTime,
    "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub attendance_today: u64,
    #[serde(default)]
    pub unique_people_today: u64,
    #[serde(default)]
    pub emotions_today: HashMap<String, u64>,
    #[serde(default)]
    pub last_attendance: Option<AttendanceRecord>,
}

/// Attendance count for one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionDistribution {
    pub days: u32,
    #[serde(default)]
    pub distribution: HashMap<String, u64>,
}

/// One attendance entry. Timestamps are server-local UTC without an offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub emotion: String,
    #[serde(with = "iso_datetime")]
    pub timestamp: PrimitiveDateTime,
}

/// Everything the dashboard page shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub summary: Summary,
    pub daily: Vec<DailyCount>,
    pub emotions: EmotionDistribution,
    pub recent: Vec<AttendanceRecord>,
}

impl Dashboard {
    /// Emotion distribution, most frequent first.
    #[must_use]
    pub fn emotions_sorted(&self) -> Vec<(&str, u64)> {
        sorted_counts(&self.emotions.distribution)
    }

    /// Largest daily count, at least 1, for scaling bars.
    #[must_use]
    pub fn max_daily(&self) -> u64 {
        self.daily.iter().map(|d| d.count).max().unwrap_or(0).max(1)
    }
}

pub struct DashboardAggregator<A> {
    api: A,
    credentials: Arc<dyn CredentialStore>,
    days: u32,
    recent_limit: u32,
}

impl<A: DashboardApi> DashboardAggregator<A> {
    #[must_use]
    pub fn new(config: &ClientConfig, api: A, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            api,
            credentials,
            days: config.dashboard_days(),
            recent_limit: config.recent_limit(),
        }
    }

    /// Fetch all four views concurrently.
    ///
    /// # Errors
    ///
    /// The first failure among the four reads. [`Error::Unauthorized`] also
    /// clears the stored credentials.
    pub async fn load(&self) -> Result<Dashboard, Error> {
        let joined = tokio::try_join!(
            self.api.summary(),
            self.api.attendance_daily(self.days),
            self.api.emotions(self.days),
            self.api.recent(self.recent_limit),
        );
        match joined {
            Ok((summary, daily, emotions, recent)) => Ok(Dashboard {
                summary,
                daily,
                emotions,
                recent,
            }),
            Err(Error::Unauthorized) => {
                tracing::warn!("Dashboard rejected by server; signing out");
                self.credentials.clear();
                Err(Error::Unauthorized)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dashboard load failed");
                Err(e)
            }
        }
    }
}

impl DashboardApi for ApiClient {
    async fn summary(&self) -> Result<Summary, Error> {
        self.get_json("/api/dashboard/summary", &[], "dashboard summary")
            .await
    }

    async fn attendance_daily(&self, days: u32) -> Result<Vec<DailyCount>, Error> {
        self.get_json(
            "/api/dashboard/attendance_daily",
            &[("days", days)],
            "daily attendance",
        )
        .await
    }

    async fn emotions(&self, days: u32) -> Result<EmotionDistribution, Error> {
        self.get_json("/api/dashboard/emotions", &[("days", days)], "emotion distribution")
            .await
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AttendanceRecord>, Error> {
        self.get_json("/api/dashboard/recent", &[("limit", limit)], "recent attendance")
            .await
    }
}
