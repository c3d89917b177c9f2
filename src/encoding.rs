//! CSV batch encoding.
//!
//! Each reading becomes one record `source_id,timestamp,value;` and a batch is the
//! records of one dispatch cycle joined by newlines, with a trailing newline so
//! consecutive batches appended to the same file stay line-aligned.
//!
//! Values are written verbatim. The trailing `;` terminates the record, so a value
//! that itself contains commas (a tuple, a firmware version string) still parses by
//! splitting on the first two commas only.

use crate::reading::Reading;
use std::fmt::Write;

/// Record terminator appended after the value.
pub const RECORD_TERMINATOR: char = ';';

/// Encode one reading as a single record, without the newline.
pub fn encode_record(reading: &Reading) -> String {
    let mut out = String::with_capacity(reading.value().len() + 16);
    push_record(&mut out, reading);
    out
}

/// Encode a drained batch. An empty batch encodes to the empty string.
pub fn encode_batch(readings: &[Reading]) -> String {
    let mut out = String::with_capacity(readings.len() * 24);
    for reading in readings {
        push_record(&mut out, reading);
        out.push('\n');
    }
    out
}

fn push_record(out: &mut String, reading: &Reading) {
    // Writing into a String cannot fail.
    let _ = write!(
        out,
        "{},{},{}{}",
        reading.source_id(),
        reading.timestamp_ms(),
        reading.value(),
        RECORD_TERMINATOR
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::SourceId;

    #[test]
    fn batch_joins_records_in_drain_order() {
        let batch = vec![
            Reading::new(SourceId::EnvTemperature, 100, "21.5"),
            Reading::new(SourceId::RamFree, 100, "120.0"),
        ];
        assert_eq!(encode_batch(&batch), "0,100,21.5;\n4,100,120.0;\n");
    }

    #[test]
    fn empty_batch_is_empty_text() {
        assert_eq!(encode_batch(&[]), "");
    }

    #[test]
    fn record_keeps_values_with_commas_intact() {
        let reading = Reading::new(SourceId::Version, 7, "v1.22.0, 2024-01-05");
        assert_eq!(encode_record(&reading), "10,7,v1.22.0, 2024-01-05;");
    }
}
