//! Enrollment forecasting.
//!
//! Turns a site's weekly enrollment history into a 30-day projection and
//! lifts projected kit demand when enrollment points higher than dispense
//! history does. One kit per successfully screened subject.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Screen-fail rate assumed when a site reports none.
pub const DEFAULT_SCREEN_FAIL_RATE: f64 = 0.30;
/// Slope (subjects per week, per week) separating a trend from noise.
const TREND_THRESHOLD: f64 = 0.1;
const FORECAST_DAYS: f64 = 30.0;

/// Direction of weekly enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
    Unknown,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::Stable => "stable",
            Trend::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Projection for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentForecast {
    pub predicted_30d_enrollment: u32,
    pub avg_weekly_enrollment: f64,
    pub trend: Trend,
    pub screen_fail_rate: f64,
}

impl EnrollmentForecast {
    /// Kit demand after enrollment: the larger of `base_demand` and the
    /// subjects expected to pass screening.
    pub fn adjust_demand(&self, base_demand: u32) -> u32 {
        let enrolled =
            (f64::from(self.predicted_30d_enrollment) * (1.0 - self.screen_fail_rate)).max(0.0);
        base_demand.max(enrolled as u32)
    }
}

/// Least-squares slope of `values` against their index.
fn slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

pub fn trend(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Unknown;
    }
    let slope = slope(values);
    if slope > TREND_THRESHOLD {
        Trend::Increasing
    } else if slope < -TREND_THRESHOLD {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// Forecast from weekly history, oldest first. `None` without history.
pub fn forecast(weekly_enrollment: &[f64], screen_fail_rate: Option<f64>) -> Option<EnrollmentForecast> {
    if weekly_enrollment.is_empty() {
        return None;
    }
    let avg = weekly_enrollment.iter().sum::<f64>() / weekly_enrollment.len() as f64;
    let predicted = (avg * FORECAST_DAYS / 7.0).max(0.0) as u32;
    let fail_rate = screen_fail_rate
        .filter(|r| (0.0..=1.0).contains(r))
        .unwrap_or(DEFAULT_SCREEN_FAIL_RATE);

    Some(EnrollmentForecast {
        predicted_30d_enrollment: predicted,
        avg_weekly_enrollment: avg,
        trend: trend(weekly_enrollment),
        screen_fail_rate: fail_rate,
    })
}
