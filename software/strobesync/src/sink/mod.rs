//! Log sinks record one row per camera trigger.

use core::fmt::Debug;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::controller::context::ControllerCtx;

mod csv;
pub use csv::CsvLogSink;

mod memory;
pub use memory::{LogRecordsHandle, MemoryLogSink};

/// Width that trigger labels are right-aligned to in fixed-width output.
/// Fits a signed remote time, the sum of two `i64` nanosecond counts,
/// as seconds plus nine decimals.
pub const LABEL_WIDTH: usize = 22;

/// Choice of behavior when the current file is full
#[derive(Serialize, Deserialize, Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overflow {
    /// Wrap back to the beginning of the file and
    /// overwrite, starting with the oldest data
    #[default]
    Wrap,

    /// Create a new file
    NewFile,

    /// Error on overflow if neither wrapping nor creating a new file is viable
    Error,
}

/// One trigger's worth of logged data
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LogRecord {
    /// Local monotonic time of the trigger
    pub timestamp_ns: i64,

    /// Estimated remote time of the trigger, as `seconds.nanoseconds`
    pub label: String,

    /// First environmental reading (pressure)
    pub value_a: f32,

    /// Second environmental reading (temperature)
    pub value_b: f32,
}

/// A storage target for trigger records,
/// serializable and deserializable as `Box<dyn LogSink>`.
#[typetag::serde(tag = "type")]
pub trait LogSink: Send + Debug {
    /// Set up the sink at the start of a run, named after the op
    fn open(&mut self, ctx: &ControllerCtx) -> Result<(), String>;

    /// Record one trigger
    fn append(
        &mut self,
        timestamp_ns: i64,
        label: &str,
        value_a: f32,
        value_b: f32,
    ) -> Result<(), String>;

    /// Flush and release the sink, resetting it for the next run
    fn close(&mut self) -> Result<(), String>;
}

/// CSV header row
pub fn csv_header() -> String {
    "timestamp,time,label,value_a,value_b\n".to_owned()
}

/// Format a CSV row that is the same width for every record
/// as long as the values are finite and the year has four digits.
pub fn csv_row_fixed_width(stringbuf: &mut String, time: SystemTime, record: &LogRecord) {
    stringbuf.clear();
    stringbuf.push_str(&fmt_i64(record.timestamp_ns));
    stringbuf.push(',');
    stringbuf.push_str(&fmt_time(time));
    stringbuf.push(',');
    stringbuf.push_str(&fmt_label(&record.label));
    stringbuf.push(',');
    stringbuf.push_str(&fmt_f32(record.value_a));
    stringbuf.push(',');
    stringbuf.push_str(&fmt_f32(record.value_b));
    stringbuf.push('\n');
}

/// Fixed-width ISO-8601 UTC timestamp with zero-padded sub-second nanoseconds and Z-suffix
pub fn fmt_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

/// Right-align a label to [`LABEL_WIDTH`]
pub fn fmt_label(label: &str) -> String {
    format!("{label:>width$}", width = LABEL_WIDTH)
}

/// Fixed-width formatting of float values
pub fn fmt_f32(num: f32) -> String {
    // Nine significant digits round-trip any f32
    let precision = 8;
    let exp_pad = 2;
    let width = precision + exp_pad + 5;

    let prefix = match num {
        x if x.is_sign_positive() => "+",
        _ => "",
    };

    // Handle +/- Infinity and NaN.
    let mut numstr = format!("{prefix}{num:.precision$e}");
    let Some(e_loc) = numstr.find('e').filter(|_| num.is_finite()) else {
        return format!("{numstr:>width$}");
    };

    let exp = numstr.split_off(e_loc);
    let (sign, digits) = match exp.strip_prefix("e-") {
        Some(digits) => ('-', digits),
        None => ('+', &exp[1..]),
    };
    numstr.push_str(&format!("e{sign}{digits:0>exp_pad$}"));

    format!("{numstr:>width$}")
}

/// Fixed-width formatting of integer value for timestamp
/// 20 is the largest size.
pub fn fmt_i64(num: i64) -> String {
    format!("{num:+020}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_f32_has_consistent_width() {
        let values = [
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::NAN,
            0.0,
            -0.0,
            1.0,
            -1.0,
            10.0,
            -10.0,
            101.325,
            f32::MIN_POSITIVE,
            f32::MIN,
            f32::MAX,
        ];

        let expected_len = fmt_f32(values[0]).len();
        for value in values {
            let formatted = fmt_f32(value);
            assert_eq!(
                formatted.len(),
                expected_len,
                "length of `{value}` -> `{formatted}` should be {expected_len} but is {}",
                formatted.len()
            );

            let parsed: f32 = formatted
                .trim()
                .parse()
                .unwrap_or_else(|_| panic!("Failed to parse `{formatted}` to `{value}`"));
            if !value.is_nan() {
                assert_eq!(
                    value, parsed,
                    "{value} was serialized as `{formatted}` and parsed as `{parsed}`"
                );
            } else {
                assert!(parsed.is_nan(), "Failed to parse NaN value as NaN");
            }
        }
    }

    #[test]
    fn fmt_i64_has_consistent_width() {
        let values = [0, i64::MIN, i64::MAX, -1, 1, -10, 10];

        let expected_len = fmt_i64(values[0]).len();
        for value in values {
            let formatted = fmt_i64(value);
            assert_eq!(formatted.len(), expected_len, "`{value}` -> `{formatted}`");

            let parsed: i64 = formatted.parse().unwrap();
            assert_eq!(value, parsed);
        }
    }

    #[test]
    fn rows_have_consistent_width() {
        let mut buf = String::new();
        let mut widths = Vec::new();
        for (ts, label, a, b) in [
            (0, "0.000000000", 0.0, 0.0),
            (-5, "1.500000000", -2.5, 1e30),
            (i64::MAX, "9223372036.854775807", f32::MAX, f32::MIN),
            (i64::MIN, "-18446744073.709551616", f32::MIN, f32::MAX),
            (7, "-28.999763008", 1.0, -1.0),
        ] {
            let record = LogRecord {
                timestamp_ns: ts,
                label: label.to_owned(),
                value_a: a,
                value_b: b,
            };
            csv_row_fixed_width(&mut buf, SystemTime::UNIX_EPOCH, &record);
            assert!(buf.ends_with('\n'));
            assert_eq!(buf.split(',').count(), 5);
            widths.push(buf.len());
        }
        assert!(widths.iter().all(|w| *w == widths[0]), "{widths:?}");
    }
}
