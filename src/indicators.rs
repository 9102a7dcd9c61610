//! Expansion of the compact indicator encoding into per-timestamp points.
//!
//! The backtest engine ships each indicator as `(offset, values[])` where
//! element `i` belongs to bar `offset + i`. Offsets live in a side table under
//! the reserved `_offsets` key.

use std::collections::{BTreeMap, HashMap};

use crate::types::{Bar, Timestamp};
use crate::utils;

/// Reserved key holding the per-indicator offsets.
pub const OFFSETS_KEY: &str = "_offsets";

/// Name of the Bollinger Bands indicator and the key prefix it is published under.
const BOLLINGER_NAME: &str = "BB";
const BOLLINGER_PREFIX: &str = "bb";

const BAND_EDGES: [&str; 3] = ["lower", "middle", "upper"];

/// Field names a price record already uses; indicator keys must not shadow them.
pub const RESERVED_KEYS: [&str; 8] = ["time", "open", "high", "low", "close", "volume", "entry", "exit"];

/// Prefix put in front of an indicator key that would clash with a reserved name.
const RESERVED_KEY_PREFIX: &str = "ind_";

/// Value of one indicator at one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Scalar(f64),
    Band { lower: f64, middle: f64, upper: f64 },
    /// Legacy verbose points carrying several named sub-values (e.g. MACD).
    Fields(BTreeMap<String, f64>),
}

/// Tagged wire form of a single value.
#[derive(serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum TaggedValue {
    Scalar { value: f64 },
    Band { lower: f64, middle: f64, upper: f64 },
}

impl From<TaggedValue> for IndicatorValue {
    fn from(tagged: TaggedValue) -> Self {
        match tagged {
            TaggedValue::Scalar { value } => IndicatorValue::Scalar(value),
            TaggedValue::Band { lower, middle, upper } => IndicatorValue::Band { lower, middle, upper },
        }
    }
}

/// Dense indicator point aligned to a bar timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub time: Timestamp,
    pub value: IndicatorValue,
}

/// Key prefix every field of indicator `name` is published under.
pub fn field_prefix(name: &str) -> String {
    if name == BOLLINGER_NAME {
        BOLLINGER_PREFIX.to_string()
    } else {
        utils::normalize_name(name)
    }
}

/// Final key a field is published under: `volume` becomes `ind_volume`.
pub fn publish_key(key: String) -> String {
    if RESERVED_KEYS.contains(&key.as_str()) {
        format!("{}{}", RESERVED_KEY_PREFIX, key)
    } else {
        key
    }
}

impl IndicatorValue {
    /// Flattens the value into `(field key, human label, number)` triples.
    ///
    /// Keys never collide with the price record's own fields; see [`publish_key`].
    pub fn fields(&self, name: &str) -> Vec<(String, String, f64)> {
        let prefix = field_prefix(name);
        let fields: Vec<(String, String, f64)> = match self {
            IndicatorValue::Scalar(value) => vec![(prefix, name.to_string(), *value)],
            IndicatorValue::Band { lower, middle, upper } => BAND_EDGES
                .iter()
                .zip([*lower, *middle, *upper])
                .map(|(edge, value)| {
                    (
                        format!("{}_{}", prefix, edge),
                        format!("{} {}", name, utils::humanize(edge)),
                        value,
                    )
                })
                .collect(),
            IndicatorValue::Fields(fields) => fields
                .iter()
                .filter_map(|(sub, value)| {
                    let sub_key = utils::normalize_name(sub);
                    if sub_key.is_empty() {
                        return None;
                    }
                    Some((
                        format!("{}_{}", prefix, sub_key),
                        format!("{} {}", name, utils::humanize(sub)),
                        *value,
                    ))
                })
                .collect(),
        };
        fields
            .into_iter()
            .map(|(key, label, value)| (publish_key(key), label, value))
            .collect()
    }
}

/// Output of [`decompact_indicators`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecompactedIndicators {
    /// Dense points per original indicator name.
    pub series: BTreeMap<String, Vec<IndicatorPoint>>,
    /// Field key -> human readable label.
    pub labels: BTreeMap<String, String>,
}

impl DecompactedIndicators {
    /// True when no indicator produced a single point.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Indexes every field value by its exact timestamp for the assembler.
    ///
    /// When two indicators publish the same key at one timestamp, the one whose
    /// name sorts last wins.
    pub fn fields_by_time(&self) -> HashMap<Timestamp, BTreeMap<String, f64>> {
        let mut index: HashMap<Timestamp, BTreeMap<String, f64>> = HashMap::new();
        for (name, points) in &self.series {
            for point in points {
                let slot = index.entry(point.time).or_default();
                for (key, _, value) in point.value.fields(name) {
                    slot.insert(key, value);
                }
            }
        }
        index
    }
}

/// A classified raw element: its own timestamp (legacy verbose points only) and value.
struct RawPoint {
    time: Option<Timestamp>,
    value: IndicatorValue,
}

fn classify_array(items: &[serde_json::Value]) -> Option<IndicatorValue> {
    match items {
        [lower, middle, upper] => Some(IndicatorValue::Band {
            lower: lower.as_f64()?,
            middle: middle.as_f64()?,
            upper: upper.as_f64()?,
        }),
        _ => None,
    }
}

fn classify_object(object: &serde_json::Map<String, serde_json::Value>) -> Option<RawPoint> {
    let time = match object.get("time") {
        Some(raw) => Some(utils::timestamp_from_json(raw)?),
        None => None,
    };

    if object.contains_key("kind") {
        let mut body = object.clone();
        body.remove("time");
        let tagged: TaggedValue = serde_json::from_value(serde_json::Value::Object(body)).ok()?;
        return Some(RawPoint { time, value: tagged.into() });
    }

    let fields: BTreeMap<String, f64> = object
        .iter()
        .filter(|(key, _)| key.as_str() != "time")
        .filter_map(|(key, value)| value.as_f64().map(|v| (key.clone(), v)))
        .collect();

    let value = if fields.is_empty() {
        return None;
    } else if fields.len() == 1 && fields.contains_key("value") {
        IndicatorValue::Scalar(fields["value"])
    } else if fields.len() == 3 && BAND_EDGES.iter().all(|edge| fields.contains_key(*edge)) {
        IndicatorValue::Band {
            lower: fields["lower"],
            middle: fields["middle"],
            upper: fields["upper"],
        }
    } else {
        IndicatorValue::Fields(fields)
    };
    Some(RawPoint { time, value })
}

/// Classifies one raw array element by shape.
///
/// Numbers are scalars, 3-element numeric arrays are bands, objects are either
/// tagged (`{"kind": ...}`) or legacy verbose points. Anything else is `None`.
fn classify(raw: &serde_json::Value) -> Option<RawPoint> {
    match raw {
        serde_json::Value::Number(n) => Some(RawPoint {
            time: None,
            value: IndicatorValue::Scalar(n.as_f64()?),
        }),
        serde_json::Value::Array(items) => classify_array(items).map(|value| RawPoint { time: None, value }),
        serde_json::Value::Object(object) => classify_object(object),
        _ => None,
    }
}

fn read_offsets(set: &serde_json::Map<String, serde_json::Value>) -> BTreeMap<String, Option<usize>> {
    let Some(serde_json::Value::Object(offsets)) = set.get(OFFSETS_KEY) else {
        return BTreeMap::new();
    };
    offsets
        .iter()
        .map(|(name, raw)| (name.clone(), raw.as_u64().and_then(|o| usize::try_from(o).ok())))
        .collect()
}

/// Matches every indicator of `set` to the `_offsets` entry that describes it.
///
/// Lookup order per indicator:
/// 1. an entry under the exact indicator name,
/// 2. an entry whose normalized name equals the indicator's field prefix,
/// 3. an entry no indicator claimed by 1 or 2 whose normalized name starts
///    with `<prefix>_` (`bb_20` for `BB`), first in name order.
///
/// Indicators without an entry are absent from the result (offset 0).
/// Entries left unmatched are reported at debug level.
fn resolve_offsets(set: &serde_json::Map<String, serde_json::Value>) -> BTreeMap<String, Option<usize>> {
    let offsets = read_offsets(set);
    let names: Vec<&String> = set.keys().filter(|name| !name.starts_with('_')).collect();
    let normalized: BTreeMap<&String, String> = offsets.keys().map(|key| (key, utils::normalize_name(key))).collect();

    let mut resolved: BTreeMap<String, Option<usize>> = BTreeMap::new();
    let mut claimed: Vec<&String> = Vec::new();

    for name in &names {
        let prefix = field_prefix(name);
        let direct = offsets
            .get_key_value(*name)
            .or_else(|| offsets.iter().find(|(key, _)| normalized[key] == prefix));
        if let Some((key, offset)) = direct {
            resolved.insert((*name).clone(), *offset);
            claimed.push(key);
        }
    }

    for name in &names {
        if resolved.contains_key(*name) {
            continue;
        }
        let prefix = field_prefix(name);
        if prefix.is_empty() {
            continue;
        }
        let stem = format!("{}_", prefix);
        let fallback = offsets
            .iter()
            .find(|(key, _)| !claimed.contains(key) && normalized[key].starts_with(&stem));
        if let Some((key, offset)) = fallback {
            tracing::debug!(indicator = name.as_str(), offset_key = key.as_str(), "offset matched by name prefix");
            resolved.insert((*name).clone(), *offset);
            claimed.push(key);
        }
    }

    for key in offsets.keys().filter(|key| !claimed.contains(key)) {
        tracing::debug!(offset_key = key.as_str(), "offset entry matches no indicator");
    }
    resolved
}

/// Expands a single indicator's raw values into dense points.
///
/// `bar_times` holds the time of every bar as received, `None` where it could
/// not be resolved. Expansion stops at the first element whose bar index falls
/// past the end; malformed or unresolvable elements are skipped individually.
fn expand(
    name: &str,
    values: &[serde_json::Value],
    offset: usize,
    bar_times: &[Option<Timestamp>],
) -> Vec<IndicatorPoint> {
    let mut points = Vec::with_capacity(values.len());
    let mut skipped = 0usize;

    for (i, raw) in values.iter().enumerate() {
        let Some(bar_time) = offset.checked_add(i).and_then(|idx| bar_times.get(idx)).copied() else {
            tracing::debug!(
                indicator = name,
                dropped = values.len() - i,
                "indicator runs past the last bar, truncating"
            );
            break;
        };

        let Some(point) = classify(raw) else {
            skipped += 1;
            continue;
        };
        match point.time.or(bar_time) {
            Some(time) => points.push(IndicatorPoint { time, value: point.value }),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!(indicator = name, skipped, "skipped malformed indicator values");
    }
    points
}

/// Expands a compact indicator set into dense points plus field labels.
///
/// # Arguments
///
/// * `set` - The compact mapping: indicator name -> raw array, plus `_offsets`.
/// * `bars` - The canonical (not downsampled) bars the indicators were computed over.
///
/// # Returns
///
/// * `DecompactedIndicators` - Possibly empty; this never fails.
pub fn decompact_indicators(
    set: &serde_json::Map<String, serde_json::Value>,
    bars: &[Bar],
) -> DecompactedIndicators {
    let bar_times: Vec<Option<Timestamp>> = bars.iter().map(|bar| Some(bar.time)).collect();
    decompact_over_times(set, &bar_times)
}

/// Same as [`decompact_indicators`] but over the bar times as received.
///
/// Offsets index the raw bar array, so a bar dropped while loading must keep
/// its slot; its time is `None` and indicator values landing on it are skipped.
pub fn decompact_over_times(
    set: &serde_json::Map<String, serde_json::Value>,
    bar_times: &[Option<Timestamp>],
) -> DecompactedIndicators {
    let offsets = resolve_offsets(set);
    let mut out = DecompactedIndicators::default();

    for (name, raw) in set {
        if name.starts_with('_') {
            continue;
        }
        if field_prefix(name).is_empty() {
            tracing::debug!(indicator = name.as_str(), "indicator name normalizes to nothing, skipping");
            continue;
        }
        let serde_json::Value::Array(values) = raw else {
            tracing::debug!(indicator = name.as_str(), "indicator is not an array, skipping");
            continue;
        };
        let offset = match offsets.get(name) {
            None => 0,
            Some(Some(offset)) => *offset,
            Some(None) => {
                tracing::debug!(indicator = name.as_str(), "invalid indicator offset, skipping");
                continue;
            }
        };

        let points = expand(name, values, offset, bar_times);
        if points.is_empty() {
            continue;
        }
        for point in &points {
            for (key, label, _) in point.value.fields(name) {
                out.labels.entry(key).or_insert(label);
            }
        }
        out.series.insert(name.clone(), points);
    }

    out
}
