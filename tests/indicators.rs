//! Integration tests for indicator columns and annotation.

use proptest::prelude::*;
use tradescan::indicators::{bollinger, ema, rsi};
use tradescan::prelude::*;

fn period(n: usize) -> Period {
    Period::new(n).unwrap()
}

#[test]
fn test_annotate_default_set() {
    let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i % 7) as f64).collect();
    let series = Series::from_closes(0, 60_000, &closes).unwrap();

    let annotated = IndicatorSet::default().annotate(&series).unwrap();
    assert_eq!(annotated.len(), 60 - 19);
    assert_eq!(annotated.closes(), closes[19..].to_vec());
    assert_eq!(annotated.rsi().unwrap().len(), annotated.len());
    assert_eq!(annotated.bollinger().unwrap().len(), annotated.len());
    assert_eq!(annotated.ema(period(20)).unwrap().len(), annotated.len());
    assert!(annotated.ema(period(50)).is_none());
}

#[test]
fn test_annotate_needs_more_than_max_window() {
    let series = Series::from_closes(0, 60_000, &[100.0; 20]).unwrap();
    assert!(matches!(
        IndicatorSet::default().annotate(&series),
        Err(ScreenError::InsufficientData { need: 21, got: 20 })
    ));
}

#[test]
fn test_ema_only_set_keeps_every_row() {
    let set = IndicatorSet::new(vec![period(5)], None, None).unwrap();
    let series = Series::from_closes(0, 1, &[1.0, 2.0, 3.0]).unwrap();
    let annotated = set.annotate(&series).unwrap();
    assert_eq!(annotated.len(), 3);
    assert!(annotated.snapshot().unwrap().rsi.is_none());
}

#[test]
fn test_empty_set_rejected() {
    assert!(IndicatorSet::new(Vec::new(), None, None).is_err());
}

proptest! {
    #[test]
    fn prop_ema_starts_at_first_close(
        closes in prop::collection::vec(0.01f64..1e6, 1..200),
        span in 1usize..50,
    ) {
        let col = ema(&closes, period(span));
        prop_assert_eq!(col.len(), closes.len());
        prop_assert_eq!(col[0], closes[0]);
    }

    #[test]
    fn prop_ema_of_constant_is_constant(value in 0.01f64..1e6, len in 1usize..200, span in 1usize..50) {
        let closes = vec![value; len];
        for v in ema(&closes, period(span)) {
            prop_assert!((v - value).abs() <= value * 1e-12);
        }
    }

    #[test]
    fn prop_rsi_defined_after_warmup(
        closes in prop::collection::vec(0.01f64..1e6, 30..200),
        window in 2usize..20,
    ) {
        let col = rsi(&closes, period(window));
        for (i, v) in col.iter().enumerate() {
            if i < window {
                prop_assert!(v.is_none());
            } else {
                prop_assert!(v.is_some_and(f64::is_finite));
            }
        }
    }

    #[test]
    fn prop_bollinger_ordered(
        closes in prop::collection::vec(0.01f64..1e6, 30..200),
        window in 2usize..20,
    ) {
        let col = bollinger(&closes, period(window), Multiplier::new(2.0).unwrap());
        for (i, bands) in col.iter().enumerate() {
            match bands {
                None => prop_assert!(i + 1 < window),
                Some(b) => {
                    prop_assert!(b.lower <= b.middle && b.middle <= b.upper);
                    prop_assert!(b.width() >= 0.0);
                }
            }
        }
    }
}
