use backtest_charts::indicators::{IndicatorValue, decompact_indicators, decompact_over_times};
use backtest_charts::{Bar, Timestamp};
use quickcheck_macros::quickcheck;
use serde_json::json;

fn t(hours: i64) -> Timestamp {
    chrono::DateTime::from_timestamp(1_704_067_200 + hours * 3600, 0).unwrap()
}

fn bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| Bar {
            time: t(i as i64),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10.0,
        })
        .collect()
}

fn set(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

#[test]
fn scalar_indicator_honours_offset() {
    let indicators = set(json!({"_offsets": {"ema_5": 1}, "ema_5": [45.0, 45.5]}));

    let out = decompact_indicators(&indicators, &bars(3));

    let points = &out.series["ema_5"];
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].time, t(1));
    assert_eq!(points[0].value, IndicatorValue::Scalar(45.0));
    assert_eq!(points[1].time, t(2));
    assert_eq!(points[1].value, IndicatorValue::Scalar(45.5));
    assert_eq!(out.labels["ema_5"], "ema_5");
}

#[test]
fn bollinger_band_splits_into_edges() {
    let indicators = set(json!({"_offsets": {"bb_20": 0}, "BB": [[44.0, 45.0, 46.0]]}));

    let out = decompact_indicators(&indicators, &bars(3));

    let points = &out.series["BB"];
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].time, t(0));
    assert_eq!(
        points[0].value,
        IndicatorValue::Band { lower: 44.0, middle: 45.0, upper: 46.0 }
    );
    let keys: Vec<&str> = out.labels.keys().map(String::as_str).collect();
    assert_eq!(keys, ["bb_lower", "bb_middle", "bb_upper"]);
    assert_eq!(out.labels["bb_upper"], "BB Upper");

    let by_time = out.fields_by_time();
    assert_eq!(by_time[&t(0)]["bb_middle"], 45.0);
}

#[test]
fn trailing_values_past_last_bar_are_dropped() {
    // offset 1 over 3 bars leaves room for 2 values; the third is extra.
    let indicators = set(json!({"_offsets": {"rsi": 1}, "rsi": [30.0, 40.0, 50.0]}));

    let out = decompact_indicators(&indicators, &bars(3));

    let values: Vec<_> = out.series["rsi"].iter().map(|p| p.value.clone()).collect();
    assert_eq!(values, [IndicatorValue::Scalar(30.0), IndicatorValue::Scalar(40.0)]);
}

#[test]
fn other_band_indicators_use_their_own_prefix() {
    let indicators = set(json!({"Keltner (20)": [[1.0, 2.0, 3.0]]}));

    let out = decompact_indicators(&indicators, &bars(1));

    assert!(out.labels.contains_key("keltner_20_lower"));
    assert!(out.labels.contains_key("keltner_20_upper"));
}

#[test]
fn non_band_shapes_are_scalar_or_skipped() {
    let indicators = set(json!({
        "sma": [1.0, [1.0, 2.0], null, "x", [1.0, 2.0, 3.0, 4.0], [1.0, null, 3.0], 7.0]
    }));

    let out = decompact_indicators(&indicators, &bars(10));

    let points = &out.series["sma"];
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].time, t(0));
    assert_eq!(points[0].value, IndicatorValue::Scalar(1.0));
    // the second good value keeps its own slot
    assert_eq!(points[1].time, t(6));
    assert_eq!(points[1].value, IndicatorValue::Scalar(7.0));
}

#[test]
fn tagged_values_are_understood() {
    let indicators = set(json!({
        "_offsets": {"bands": 1},
        "bands": [
            {"kind": "band", "lower": 1.0, "middle": 2.0, "upper": 3.0},
            {"kind": "scalar", "value": 5.0},
            {"kind": "unknown"}
        ]
    }));

    let out = decompact_indicators(&indicators, &bars(4));

    let points = &out.series["bands"];
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].time, t(1));
    assert_eq!(points[0].value, IndicatorValue::Band { lower: 1.0, middle: 2.0, upper: 3.0 });
    assert_eq!(points[1].value, IndicatorValue::Scalar(5.0));
}

#[test]
fn legacy_verbose_points_split_into_subkeys() {
    let indicators = set(json!({
        "MACD": [
            {"time": "2024-01-01T02:00:00Z", "macd": 1.5, "signal": 1.0, "histogram": 0.5},
            {"time": "not a time", "macd": 2.0},
            {"value": 3.0}
        ]
    }));

    let out = decompact_indicators(&indicators, &bars(5));

    let points = &out.series["MACD"];
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].time, t(2));
    assert_eq!(points[1].time, t(2));
    assert_eq!(points[1].value, IndicatorValue::Scalar(3.0));
    assert_eq!(out.labels["macd_signal"], "MACD Signal");
    assert_eq!(out.labels["macd_histogram"], "MACD Histogram");
    assert_eq!(out.labels["macd"], "MACD");
}

#[test]
fn missing_or_malformed_sets_produce_nothing() {
    assert!(decompact_indicators(&serde_json::Map::new(), &bars(3)).is_empty());

    let indicators = set(json!({"_offsets": {"ema": -2}, "ema": [1.0], "note": "text", "!!!": [1.0]}));
    let out = decompact_indicators(&indicators, &bars(3));
    assert!(out.is_empty());
    assert!(out.labels.is_empty());

    let indicators = set(json!({"ema": [1.0, 2.0]}));
    assert!(decompact_indicators(&indicators, &[]).is_empty());
}

#[test]
fn unresolved_bar_slots_are_skipped_without_shifting() {
    let indicators = set(json!({"ema": [1.0, 2.0, 3.0]}));
    let times = vec![Some(t(0)), None, Some(t(2))];

    let out = decompact_over_times(&indicators, &times);

    let points = &out.series["ema"];
    assert_eq!(points.len(), 2);
    assert_eq!((points[0].time, &points[0].value), (t(0), &IndicatorValue::Scalar(1.0)));
    assert_eq!((points[1].time, &points[1].value), (t(2), &IndicatorValue::Scalar(3.0)));
}

#[test]
fn expansion_is_deterministic() {
    let indicators = set(json!({"_offsets": {"a": 1}, "a": [1.0, 2.0], "BB": [[1.0, 2.0, 3.0]]}));
    let bars = bars(4);

    assert_eq!(
        decompact_indicators(&indicators, &bars),
        decompact_indicators(&indicators, &bars)
    );
}

#[quickcheck]
fn offset_law(values: Vec<i32>, offset: u8, bar_count: u8) -> bool {
    let bars = bars(usize::from(bar_count));
    let offset = usize::from(offset);
    let indicators = set(json!({"_offsets": {"x": offset}, "x": values}));

    let out = decompact_indicators(&indicators, &bars);

    let expected: Vec<(Timestamp, IndicatorValue)> = values
        .iter()
        .enumerate()
        .take_while(|(i, _)| offset + i < bars.len())
        .map(|(i, v)| (bars[offset + i].time, IndicatorValue::Scalar(f64::from(*v))))
        .collect();
    let actual: Vec<(Timestamp, IndicatorValue)> = out
        .series
        .get("x")
        .map(|points| points.iter().map(|p| (p.time, p.value.clone())).collect())
        .unwrap_or_default();
    actual == expected
}

#[quickcheck]
fn three_element_arrays_are_always_bands(triples: Vec<(i16, i16, i16)>) -> bool {
    let raw: Vec<serde_json::Value> = triples.iter().map(|&(a, b, c)| json!([a, b, c])).collect();
    let indicators = set(json!({ "band": raw }));

    let out = decompact_indicators(&indicators, &bars(triples.len()));

    out.series
        .get("band")
        .map(|points| points.iter().all(|p| matches!(p.value, IndicatorValue::Band { .. })))
        .unwrap_or(triples.is_empty())
}

#[test]
fn offsets_resolve_by_normalized_name_or_prefix() {
    let by_prefix = set(json!({"_offsets": {"bb_20": 1}, "BB": [[44.0, 45.0, 46.0]]}));
    let out = decompact_indicators(&by_prefix, &bars(3));
    assert_eq!(out.series["BB"][0].time, t(1));

    let by_normalized = set(json!({"_offsets": {"ema_5": 2}, "EMA 5": [45.0]}));
    let out = decompact_indicators(&by_normalized, &bars(3));
    assert_eq!(out.series["EMA 5"][0].time, t(2));
    assert_eq!(out.labels["ema_5"], "EMA 5");
}

#[test]
fn exact_offset_entry_wins_over_prefix_match() {
    let indicators = set(json!({
        "_offsets": {"rsi": 1, "rsi_14": 2, "sma_50": 7},
        "rsi": [50.0],
        "rsi_14": [60.0]
    }));

    let out = decompact_indicators(&indicators, &bars(4));

    assert_eq!(out.series["rsi"][0].time, t(1));
    assert_eq!(out.series["rsi_14"][0].time, t(2));
    assert_eq!(out.series.len(), 2);
}
