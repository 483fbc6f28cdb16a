//! Local extrema of a bar window
//!
//! A bar is a local high (low) when its high (low) is strictly above (below)
//! both neighbours. The first and last bar of a window never qualify.

use serde::Serialize;

use crate::OHLCV;

/// A local high or low inside a scanned window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extremum {
    /// Position within the scanned window, not the full series
    pub index: usize,
    pub price: f64,
    /// DIF at this bar, if the series carries oscillator columns
    pub dif: Option<f64>,
    pub timestamp: Option<i64>,
}

impl Extremum {
    fn at<T: OHLCV>(bar: &T, index: usize, price: f64) -> Self {
        Self {
            index,
            price,
            dif: bar.dif(),
            timestamp: bar.timestamp(),
        }
    }
}

/// Highs and lows of one window, each in chronological order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extrema {
    pub highs: Vec<Extremum>,
    pub lows: Vec<Extremum>,
}

impl Extrema {
    /// Lows sorted ascending by price; ties keep chronological order.
    pub fn lows_by_price(&self) -> Vec<Extremum> {
        let mut lows = self.lows.clone();
        lows.sort_by(|a, b| a.price.total_cmp(&b.price));
        lows
    }

    /// Lowest low, earliest one on ties
    pub fn lowest_low(&self) -> Option<&Extremum> {
        self.lows.iter().min_by(|a, b| a.price.total_cmp(&b.price))
    }

    /// Two most recent lows as `(previous, latest)`
    pub fn last_two_lows(&self) -> Option<(&Extremum, &Extremum)> {
        match self.lows.as_slice() {
            [.., previous, latest] => Some((previous, latest)),
            _ => None,
        }
    }
}

/// Scan `bars` front to back and collect strict local highs and lows.
pub fn find_extrema<T: OHLCV>(bars: &[T]) -> Extrema {
    let mut extrema = Extrema::default();

    for (offset, w) in bars.windows(3).enumerate() {
        let (prev, bar, next) = (&w[0], &w[1], &w[2]);
        let index = offset + 1;

        if bar.high() > prev.high() && bar.high() > next.high() {
            extrema.highs.push(Extremum::at(bar, index, bar.high()));
        }
        if bar.low() < prev.low() && bar.low() < next.low() {
            extrema.lows.push(Extremum::at(bar, index, bar.low()));
        }
    }

    extrema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    fn hl(pairs: &[(f64, f64)]) -> Vec<Bar> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, &(h, l))| Bar::new(l, h, l, h, 1.0).at(i as i64))
            .collect()
    }

    #[test]
    fn test_empty_and_short() {
        let none: Vec<Bar> = Vec::new();
        assert_eq!(find_extrema(&none), Extrema::default());
        assert_eq!(find_extrema(&hl(&[(2.0, 1.0), (3.0, 0.5)])), Extrema::default());
    }

    #[test]
    fn test_peak_and_trough() {
        let bars = hl(&[(5.0, 4.0), (7.0, 5.0), (6.0, 3.0), (6.5, 4.5)]);
        let extrema = find_extrema(&bars);
        assert_eq!(extrema.highs.len(), 1);
        assert_eq!(extrema.highs[0].index, 1);
        assert_eq!(extrema.highs[0].price, 7.0);
        assert_eq!(extrema.lows.len(), 1);
        assert_eq!(extrema.lows[0].index, 2);
        assert_eq!(extrema.lows[0].timestamp, Some(2));
    }

    #[test]
    fn test_boundaries_never_extrema() {
        // first bar is the highest, last bar the lowest
        let bars = hl(&[(10.0, 5.0), (8.0, 4.0), (9.0, 3.0)]);
        let extrema = find_extrema(&bars);
        assert!(extrema.highs.is_empty());
        assert!(extrema.lows.is_empty());
    }

    #[test]
    fn test_plateau_is_not_extremum() {
        let bars = hl(&[(5.0, 1.0), (6.0, 1.0), (6.0, 1.0), (5.0, 1.0)]);
        assert!(find_extrema(&bars).highs.is_empty());
        assert!(find_extrema(&bars).lows.is_empty());
    }

    #[test]
    fn test_adjacent_alternating() {
        let bars = hl(&[(5.0, 3.0), (7.0, 4.0), (4.0, 2.0), (8.0, 5.0), (6.0, 4.0)]);
        let extrema = find_extrema(&bars);
        let highs: Vec<usize> = extrema.highs.iter().map(|e| e.index).collect();
        let lows: Vec<usize> = extrema.lows.iter().map(|e| e.index).collect();
        assert_eq!(highs, [1, 3]);
        assert_eq!(lows, [2]);
    }

    #[test]
    fn test_lows_by_price_and_recency() {
        let bars = hl(&[
            (10.0, 9.0),
            (10.0, 6.0),
            (10.0, 9.0),
            (10.0, 4.0),
            (10.0, 9.0),
            (10.0, 5.0),
            (10.0, 9.0),
        ]);
        let extrema = find_extrema(&bars);
        let by_price: Vec<f64> = extrema.lows_by_price().iter().map(|e| e.price).collect();
        assert_eq!(by_price, [4.0, 5.0, 6.0]);
        assert_eq!(extrema.lowest_low().map(|e| e.index), Some(3));
        let (prev, last) = extrema.last_two_lows().unwrap();
        assert_eq!((prev.index, last.index), (3, 5));
    }
}
