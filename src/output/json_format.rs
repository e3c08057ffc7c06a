//! JSON output formatting.

use serde::Serialize;
use std::io::{self, Write};

/// Write `value` as pretty-printed JSON followed by a newline.
pub fn write_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(io::Error::from)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Alert, AlertStatus};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_alert_json_uses_wire_names() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let alert = Alert::new("pod-a", AlertStatus::Ok, at).with_label("pod", "web-0");

        let mut buf = Vec::new();
        write_json(&mut buf, &[alert]).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("\"status\": \"OK\""));
        assert!(text.contains("\"createdAt\""));
        assert!(!text.contains("archivedAt"));
    }
}
