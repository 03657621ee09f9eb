//! Lenient field decoder for session server payloads
//!
//! The server's response shape is trusted but never validated. Instead of a
//! full JSON parse we pull the handful of known fields out by pattern, which
//! keeps decoding total: unknown, extra or reordered fields are ignored and a
//! missing or malformed field falls back to its default with a log line.
//!
//! Nested arrays (`"track_points": [[x, y, z], ...]`) are found by locating the
//! opening bracket of the key's value and scanning for its balanced closing
//! bracket, so arrays belonging to other keys are never picked up.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use glam::Vec3;
use regex::Regex;

use super::snapshot::fields;

/// Signed decimal with optional fraction and exponent
const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";

static TRIPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\[\s*({NUMBER})\s*,\s*({NUMBER})\s*,\s*({NUMBER})\s*\]"
    ))
    .expect("triple pattern is valid")
});

/// Shape of the value following a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ValueKind {
    Bool,
    Int,
    Float,
    Triple,
    ArrayOpen,
}

impl ValueKind {
    const ALL: [ValueKind; 5] = [
        ValueKind::Bool,
        ValueKind::Int,
        ValueKind::Float,
        ValueKind::Triple,
        ValueKind::ArrayOpen,
    ];

    fn pattern(self) -> String {
        match self {
            ValueKind::Bool => r"(?i:(true|false))\b".to_string(),
            ValueKind::Int => r"([-+]?\d+)(\.\d*|[eE])?".to_string(),
            ValueKind::Float => format!("({NUMBER})"),
            ValueKind::Triple => {
                format!(r"\[\s*({NUMBER})\s*,\s*({NUMBER})\s*,\s*({NUMBER})\s*\]")
            }
            ValueKind::ArrayOpen => r"\[".to_string(),
        }
    }
}

/// Compile the pattern `"key"\s*:\s*<value>` for one field
fn compile_field(key: &str, kind: ValueKind) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r#""{}"\s*:\s*{}"#, regex::escape(key), kind.pattern()))
}

/// Patterns for every server field, compiled once at first use
static KNOWN_FIELDS: LazyLock<HashMap<&'static str, HashMap<ValueKind, Regex>>> =
    LazyLock::new(|| {
        fields::ALL
            .iter()
            .map(|&key| {
                let by_kind: HashMap<ValueKind, Regex> = ValueKind::ALL
                    .into_iter()
                    .filter_map(|kind| compile_field(key, kind).ok().map(|re| (kind, re)))
                    .collect();
                (key, by_kind)
            })
            .collect()
    });

/// Cached pattern for a server field, compiled on demand for any other key
fn field_regex(key: &str, kind: ValueKind) -> Option<Cow<'static, Regex>> {
    if let Some(re) = KNOWN_FIELDS.get(key).and_then(|by_kind| by_kind.get(&kind)) {
        return Some(Cow::Borrowed(re));
    }
    match compile_field(key, kind) {
        Ok(re) => Some(Cow::Owned(re)),
        Err(e) => {
            log::warn!("decoder: cannot build pattern for {key:?}: {e}");
            None
        }
    }
}

fn has_key(payload: &str, key: &str) -> bool {
    payload.contains(&format!("\"{key}\""))
}

/// Log why a field fell back to its default
fn report_default(payload: &str, key: &str, default: &dyn std::fmt::Debug) {
    if has_key(payload, key) {
        log::warn!("decoder: malformed value for {key:?}, using {default:?}");
    } else {
        log::debug!("decoder: {key:?} absent, using {default:?}");
    }
}

fn parse_float(text: &str) -> Option<f32> {
    text.parse::<f32>().ok().filter(|v| v.is_finite())
}

/// `"key": true|false` (value case-insensitive), default `false`
pub fn decode_bool(payload: &str, key: &str) -> bool {
    let value = field_regex(key, ValueKind::Bool)
        .and_then(|re| re.captures(payload))
        .map(|caps| caps[1].eq_ignore_ascii_case("true"));

    value.unwrap_or_else(|| {
        report_default(payload, key, &false);
        false
    })
}

/// `"key": <signed integer>`, default `0`
///
/// A fractional or exponent value is malformed rather than truncated.
pub fn decode_int(payload: &str, key: &str) -> i64 {
    let value = field_regex(key, ValueKind::Int)
        .and_then(|re| re.captures(payload))
        .filter(|caps| caps.get(2).is_none())
        .and_then(|caps| caps[1].parse::<i64>().ok());

    value.unwrap_or_else(|| {
        report_default(payload, key, &0);
        0
    })
}

/// `"key": <signed decimal>`, default `0.0`
pub fn decode_float(payload: &str, key: &str) -> f32 {
    let value = field_regex(key, ValueKind::Float)
        .and_then(|re| re.captures(payload))
        .and_then(|caps| parse_float(&caps[1]));

    value.unwrap_or_else(|| {
        report_default(payload, key, &0.0);
        0.0
    })
}

fn triple_from(caps: &regex::Captures<'_>) -> Option<Vec3> {
    Some(Vec3::new(
        parse_float(&caps[1])?,
        parse_float(&caps[2])?,
        parse_float(&caps[3])?,
    ))
}

/// `"key": [a, b, c]` with exactly three numbers
pub fn decode_fixed_array3(payload: &str, key: &str) -> Option<Vec3> {
    let value = field_regex(key, ValueKind::Triple)
        .and_then(|re| re.captures(payload))
        .and_then(|caps| triple_from(&caps));

    if value.is_none() {
        report_default(payload, key, &Option::<Vec3>::None);
    }
    value
}

/// Byte index of the `]` that closes the `[` at `open`
fn matching_bracket(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in text.bytes().enumerate().skip(open) {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// `"key": [[a, b, c], ...]`, every triple in order, empty when absent
pub fn decode_nested_array3(payload: &str, key: &str) -> Vec<Vec3> {
    let Some(open) = field_regex(key, ValueKind::ArrayOpen)
        .and_then(|re| re.find(payload))
        .map(|m| m.end() - 1)
    else {
        report_default(payload, key, &Vec::<Vec3>::new());
        return Vec::new();
    };

    let Some(close) = matching_bracket(payload, open) else {
        log::warn!("decoder: unbalanced brackets in {key:?}, using []");
        return Vec::new();
    };

    let inner = &payload[open + 1..close];
    let mut points = Vec::new();
    for caps in TRIPLE.captures_iter(inner) {
        match triple_from(&caps) {
            Some(p) => points.push(p),
            None => log::warn!(
                "decoder: skipping non-finite point {:?} in {key:?}",
                &caps[0]
            ),
        }
    }
    points
}
