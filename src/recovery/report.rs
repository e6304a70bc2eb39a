//! Diagnostic record persistence.
//!
//! One JSON record per fault, appended to a per-day, per-host, per-process
//! destination: `{dir}/{YYYY-MM-DD}/{module}.err.{host}.{random-suffix}`.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use serde_json::Value;

use crate::config::RecoveryConfig;

/// Everything captured about one recovered fault.
#[derive(Debug, Serialize)]
pub struct DiagnosticRecord {
    pub request_id: String,
    pub hop: String,
    pub method: String,
    pub uri: String,
    pub caller_ip: String,
    pub request_headers: BTreeMap<String, String>,
    pub uri_query: BTreeMap<String, String>,
    pub request_body: Value,
    pub response_body: Value,
    pub error: String,
    pub trace: BTreeMap<usize, String>,
}

/// Append one record as a JSON line. Returns the path written to.
pub fn write_record(
    config: &RecoveryConfig,
    record: &DiagnosticRecord,
) -> std::io::Result<PathBuf> {
    let day = Local::now().format("%Y-%m-%d").to_string();
    let dir = Path::new(&config.dir).join(day);
    fs::create_dir_all(&dir)?;

    let file_name = format!(
        "{}.err.{}.{}",
        config.module,
        hostname(),
        fastrand::u32(..config.suffix_area.max(1))
    );
    let path = dir.join(file_name);

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{}", line)?;
    Ok(path)
}

/// Decode a captured body for the record: JSON when it parses, the raw text
/// otherwise.
pub fn decode_body(raw: &[u8]) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    match serde_json::from_slice(raw) {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(raw).into_owned()),
    }
}

/// Parse a raw query string into a field map (last value wins).
pub fn parse_query(raw: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Split a backtrace into a numbered map of lines.
pub fn trace_lines(backtrace: &str) -> BTreeMap<usize, String> {
    backtrace
        .lines()
        .enumerate()
        .map(|(i, line)| (i, line.to_string()))
        .collect()
}

/// Short host name (prefix before the first dot).
pub fn hostname() -> String {
    let raw = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| fs::read_to_string("/proc/sys/kernel/hostname").ok())
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .unwrap_or_else(|| "localhost".to_string());
    raw.trim()
        .split('.')
        .next()
        .filter(|p| !p.is_empty())
        .unwrap_or("localhost")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> DiagnosticRecord {
        DiagnosticRecord {
            request_id: "abc123".into(),
            hop: "1".into(),
            method: "POST".into(),
            uri: "/v1/items?logid=abc123".into(),
            caller_ip: "10.0.0.1".into(),
            request_headers: BTreeMap::new(),
            uri_query: parse_query("logid=abc123"),
            request_body: json!({"k": "v"}),
            response_body: json!({"errno": 500100}),
            error: "boom".into(),
            trace: trace_lines("frame 0\nframe 1"),
        }
    }

    #[test]
    fn test_decode_body_json_and_text() {
        assert_eq!(decode_body(b"{\"a\":1}"), json!({"a": 1}));
        assert_eq!(decode_body(b"plain text"), json!("plain text"));
        assert_eq!(decode_body(b""), Value::Null);
    }

    #[test]
    fn test_parse_query() {
        let q = parse_query("logid=abc&x=1%202");
        assert_eq!(q["logid"], "abc");
        assert_eq!(q["x"], "1 2");
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn test_trace_lines_numbered() {
        let t = trace_lines("a\nb\nc");
        assert_eq!(t.len(), 3);
        assert_eq!(t[&1], "b");
    }

    #[test]
    fn test_hostname_is_short() {
        let host = hostname();
        assert!(!host.is_empty());
        assert!(!host.contains('.'));
    }

    #[test]
    fn test_write_record_creates_dated_file() {
        let dir = std::env::temp_dir().join(format!("databus-report-{}", std::process::id()));
        let config = RecoveryConfig {
            dir: dir.to_string_lossy().into_owned(),
            module: "testmod".into(),
            ..RecoveryConfig::default()
        };

        let path = write_record(&config, &record()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("testmod.err."));

        let contents = fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["request_id"], "abc123");
        assert_eq!(parsed["trace"]["0"], "frame 0");

        fs::remove_dir_all(&dir).unwrap_or_default();
    }
}
