use analysis_core::{
    Bar, BollingerValue, IndicatorSnapshot, MacdValue, StochasticValue,
};

use crate::indicators::*;

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BB_PERIOD: usize = 20;
pub const BB_STD_DEV: f64 = 2.0;
pub const STOCH_K: usize = 14;
pub const STOCH_SMOOTH_K: usize = 3;
pub const STOCH_D: usize = 3;
pub const EMA_FAST: usize = 50;
pub const EMA_SLOW: usize = 200;

fn last_finite(values: &[f64]) -> Option<f64> {
    values.last().copied().filter(|v| v.is_finite())
}

/// Compute the last-bar value of every standard indicator.
///
/// Each indicator is computed independently; one that lacks history or
/// produces a non-finite value is left out and the rest are still reported.
pub fn indicator_snapshot(bars: &[Bar]) -> IndicatorSnapshot {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let rsi = last_finite(&rsi(&closes, RSI_PERIOD));

    let macd_result = macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let macd = match (
        last_finite(&macd_result.macd_line),
        last_finite(&macd_result.signal_line),
        last_finite(&macd_result.histogram),
    ) {
        (Some(macd), Some(signal), Some(hist)) => Some(MacdValue { macd, signal, hist }),
        _ => None,
    };

    let bb = bollinger_bands(&closes, BB_PERIOD, BB_STD_DEV);
    let bollinger = match (
        last_finite(&bb.upper),
        last_finite(&bb.middle),
        last_finite(&bb.lower),
    ) {
        (Some(upper), Some(middle), Some(lower)) => Some(BollingerValue { upper, middle, lower }),
        _ => None,
    };

    let stoch = stochastic(bars, STOCH_K, STOCH_SMOOTH_K, STOCH_D);
    let stochastic = match (last_finite(&stoch.k), last_finite(&stoch.d)) {
        (Some(k), Some(d)) => Some(StochasticValue { k, d }),
        _ => None,
    };

    IndicatorSnapshot {
        rsi,
        macd,
        bollinger,
        stochastic,
        ema_50: last_finite(&ema(&closes, EMA_FAST)),
        ema_200: last_finite(&ema(&closes, EMA_SLOW)),
    }
}
