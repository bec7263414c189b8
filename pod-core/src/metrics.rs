//! Performance summary from the equity curve
//!
//! Each tick contributes one observation: the last equity sample stamped
//! with that tick's timestamp (the mark-to-market sample, or the fill that
//! followed it when the risk monitor forced trades). Accounting stays in
//! `Decimal`; the statistics here are `f64`.
//!
//! ```text
//! r_t               = v_t / v_{t-1} - 1
//! total_return      = v_last / v_first - 1
//! annualized_return = (1 + total_return)^(252 / n) - 1
//! volatility        = stdev(r) * sqrt(252)
//! sharpe            = mean(r) / stdev(r) * sqrt(252)      (risk-free rate 0)
//! max_drawdown      = max_t (peak_t - v_t) / peak_t
//! ```

use crate::core::PodId;
use crate::ledger::EquitySample;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

pub const PERIODS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    /// Number of returns the statistics were computed from
    pub periods: usize,
}

impl PerformanceSummary {
    /// Statistics of a value series, oldest first
    pub fn from_values(values: &[f64]) -> Self {
        let (Some(&first), Some(&last)) = (values.first(), values.last()) else {
            return Self::default();
        };

        let returns: Vec<f64> = values
            .windows(2)
            .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
            .collect();
        let periods = returns.len();

        let total_return = if first > 0.0 { last / first - 1.0 } else { 0.0 };
        let annualized_return = if periods == 0 {
            0.0
        } else if total_return <= -1.0 {
            -1.0
        } else {
            (1.0 + total_return).powf(PERIODS_PER_YEAR / periods as f64) - 1.0
        };

        let (mean, stdev) = mean_and_stdev(&returns);
        let annualized_volatility = stdev * PERIODS_PER_YEAR.sqrt();
        let sharpe_ratio = if stdev > 0.0 {
            mean / stdev * PERIODS_PER_YEAR.sqrt()
        } else {
            0.0
        };

        Self {
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            max_drawdown: max_drawdown(values),
            periods,
        }
    }
}

fn mean_and_stdev(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    if xs.len() < 2 {
        return (mean, 0.0);
    }
    // Sample variance
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst
}

/// Portfolio and per-pod performance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub portfolio: PerformanceSummary,
    /// Registration order
    pub pods: Vec<(PodId, PerformanceSummary)>,
}

impl PerformanceReport {
    /// Build from the run's equity curve
    ///
    /// `pods` carries each pod's starting capital; series start from the
    /// initial values so the first tick's move is counted.
    pub fn from_curve(
        curve: &[EquitySample],
        initial_capital: Decimal,
        pods: &[(PodId, Decimal)],
    ) -> Self {
        let closing = tick_closing_samples(curve);

        let portfolio: Vec<f64> = std::iter::once(initial_capital)
            .chain(closing.iter().map(|s| s.equity))
            .map(to_f64)
            .collect();

        let pods = pods
            .iter()
            .map(|(pod, capital)| {
                let series: Vec<f64> = std::iter::once(*capital)
                    .chain(
                        closing
                            .iter()
                            .map(|s| s.pod_equity.get(pod).copied().unwrap_or_default()),
                    )
                    .map(to_f64)
                    .collect();
                (pod.clone(), PerformanceSummary::from_values(&series))
            })
            .collect();

        Self {
            portfolio: PerformanceSummary::from_values(&portfolio),
            pods,
        }
    }

    pub fn pod(&self, pod: &PodId) -> Option<&PerformanceSummary> {
        self.pods.iter().find(|(p, _)| p == pod).map(|(_, s)| s)
    }
}

/// Last sample of every distinct timestamp, in curve order
pub fn tick_closing_samples(curve: &[EquitySample]) -> Vec<&EquitySample> {
    let mut out: Vec<&EquitySample> = Vec::new();
    for sample in curve {
        match out.last_mut() {
            Some(last) if last.timestamp == sample.timestamp => *last = sample,
            _ => out.push(sample),
        }
    }
    out
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}
