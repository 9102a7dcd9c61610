use std::borrow::Cow;

use backtest_charts::resample::{chunk_step, downsample};
use backtest_charts::utils::parse_timestamp;
use backtest_charts::{Bar, PipelineError, Timestamp};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

fn t(minutes: i64) -> Timestamp {
    chrono::DateTime::from_timestamp(1_704_067_200 + minutes * 60, 0).unwrap()
}

fn bar(minutes: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
    Bar { time: t(minutes), open, high, low, close, volume }
}

/// Builds a sorted bar series from arbitrary seeds; prices stay internally consistent.
fn bars_from_seeds(seeds: &[(u16, u16, u16, u16)]) -> Vec<Bar> {
    seeds
        .iter()
        .enumerate()
        .map(|(i, &(a, b, c, v))| {
            let open = f64::from(a);
            let close = f64::from(b);
            let high = open.max(close) + f64::from(c % 50);
            let low = open.min(close) - f64::from(c % 30);
            bar(i as i64, open, high, low, close, f64::from(v))
        })
        .collect()
}

#[test]
fn two_bars_into_one() {
    let bars = vec![
        Bar {
            time: parse_timestamp("2024-01-01T00:00Z").unwrap(),
            open: 10.0, high: 12.0, low: 9.0, close: 11.0, volume: 100.0,
        },
        Bar {
            time: parse_timestamp("2024-01-01T01:00Z").unwrap(),
            open: 11.0, high: 13.0, low: 10.0, close: 12.0, volume: 200.0,
        },
    ];

    let out = downsample(&bars, 1).unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(
        out[0],
        Bar {
            time: parse_timestamp("2024-01-01T00:00Z").unwrap(),
            open: 10.0, high: 13.0, low: 9.0, close: 12.0, volume: 300.0,
        }
    );
}

#[test]
fn short_series_is_returned_untouched() {
    let bars = vec![bar(0, 1.0, 2.0, 0.5, 1.5, 10.0), bar(1, 1.5, 2.5, 1.0, 2.0, 20.0)];

    let out = downsample(&bars, 2).unwrap();

    assert!(matches!(out, Cow::Borrowed(_)));
    assert_eq!(out.as_ref(), bars.as_slice());
}

#[test]
fn last_chunk_may_be_shorter() {
    let bars: Vec<Bar> = (0..7).map(|i| bar(i, 1.0, 2.0, 0.5, 1.0 + i as f64, 1.0)).collect();

    // ceil(7 / 3) = 3 -> chunks of 3, 3, 1
    let out = downsample(&bars, 3).unwrap();

    assert_eq!(out.len(), 3);
    assert_eq!(out[0].time, t(0));
    assert_eq!(out[1].time, t(3));
    assert_eq!(out[2].time, t(6));
    assert_eq!(out[2].close, 7.0);
    assert_eq!(out[2].volume, 1.0);
    assert_eq!(out[1].volume, 3.0);
}

#[test]
fn output_never_exceeds_target() {
    let bars: Vec<Bar> = (0..1001).map(|i| bar(i, 1.0, 2.0, 0.5, 1.0, 1.0)).collect();

    for target in [1, 2, 7, 100, 500, 1000] {
        let out = downsample(&bars, target).unwrap();
        assert!(out.len() <= target, "target {} produced {}", target, out.len());
        assert!(out.windows(2).all(|w| w[0].time < w[1].time));
    }
}

#[test]
fn empty_input_gives_empty_output() {
    assert!(downsample(&[], 10).unwrap().is_empty());
}

#[test]
fn zero_target_is_rejected() {
    let bars = vec![bar(0, 1.0, 2.0, 0.5, 1.5, 10.0)];

    let err = downsample(&bars, 0).unwrap_err();

    assert!(matches!(err, PipelineError::InvalidParameters(_)));
}

#[test]
fn chunk_step_rounds_up() {
    assert_eq!(chunk_step(10, 10), None);
    assert_eq!(chunk_step(11, 10), Some(2));
    assert_eq!(chunk_step(1000, 500), Some(2));
    assert_eq!(chunk_step(1001, 500), Some(3));
}

#[quickcheck]
fn fitting_series_is_identity(seeds: Vec<(u16, u16, u16, u16)>, slack: u8) -> bool {
    let bars = bars_from_seeds(&seeds);
    let target = bars.len() + usize::from(slack) + 1;
    let out = downsample(&bars, target).unwrap();
    out.as_ref() == bars.as_slice()
}

#[quickcheck]
fn aggregated_bars_preserve_ohlcv(seeds: Vec<(u16, u16, u16, u16)>, target: u8) -> TestResult {
    if target == 0 {
        return TestResult::discard();
    }
    let bars = bars_from_seeds(&seeds);
    let target = usize::from(target);
    let out = downsample(&bars, target).unwrap();
    let step = chunk_step(bars.len(), target).unwrap_or(1);

    if out.len() > target || out.len() != bars.chunks(step).count() {
        return TestResult::failed();
    }
    for (aggregated, chunk) in out.iter().zip(bars.chunks(step)) {
        let high = chunk.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = chunk.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let volume: f64 = chunk.iter().map(|b| b.volume).sum();
        let ok = aggregated.time == chunk[0].time
            && aggregated.open == chunk[0].open
            && aggregated.close == chunk[chunk.len() - 1].close
            && aggregated.high == high
            && aggregated.low == low
            && aggregated.volume == volume;
        if !ok {
            return TestResult::failed();
        }
    }
    TestResult::passed()
}
