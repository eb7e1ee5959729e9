use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Session identifier as emitted by the tool (numeric in the Python tool, text elsewhere)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamId {
    Number(u64),
    Text(String),
}

/// Fields the fingerprint tool reports for one TLS session
///
/// Known fields accept both the upper-case keys of the Python tool and the
/// lower-case keys of the Rust one. Everything else the tool emits is kept in
/// `extra`, including a known key whose value has an unexpected type, so
/// decoding an object never fails and no observation is lost.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// JA4 client fingerprint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ja4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ja4_r: Option<String>,
    /// JA4S server fingerprint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ja4s: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ja4s_r: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolSession {
    /// Split a raw tool object into known fields and `extra`
    ///
    /// For each known field the first spelling present wins. When its value
    /// has the wrong type the field stays empty and the key stays in `extra`.
    pub fn from_map(mut raw: Map<String, Value>) -> Self {
        let stream = take(&mut raw, &["stream"], |v| match v {
            Value::Number(n) => n.as_u64().map(StreamId::Number),
            Value::String(s) => Some(StreamId::Text(s.clone())),
            _ => None,
        });
        Self {
            stream,
            domain: take_text(&mut raw, &["domain", "tls_server_name"]),
            ja4: take_text(&mut raw, &["ja4", "JA4"]),
            ja4_r: take_text(&mut raw, &["ja4_r", "JA4_r"]),
            ja4s: take_text(&mut raw, &["ja4s", "JA4S"]),
            ja4s_r: take_text(&mut raw, &["ja4s_r", "JA4S_r"]),
            extra: raw,
        }
    }
}

impl<'de> Deserialize<'de> for ToolSession {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(Self::from_map)
    }
}

fn take<T>(
    raw: &mut Map<String, Value>,
    keys: &[&str],
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let key = keys.iter().find(|k| raw.contains_key(**k))?;
    let value = raw.get(*key).and_then(convert)?;
    raw.remove(*key);
    Some(value)
}

fn take_text(raw: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    take(raw, keys, |v| v.as_str().map(str::to_string))
}

/// One fingerprint observation annotated with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRecord {
    #[serde(flatten)]
    pub session: ToolSession,
    /// Base name of the capture artifact the session was read from
    pub source_pcap: String,
    /// Path of that artifact as passed to the tool
    pub source_pcap_path: String,
    pub parsed_at_utc: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_file_mtime_utc: Option<DateTime<Utc>>,
    /// Run context from the manifest sidecar, identical for a whole extraction batch
    #[serde(default)]
    pub manifest: Map<String, Value>,
}

impl SignatureRecord {
    /// The most specific fingerprint carried by the record (JA4, then JA4S)
    pub fn fingerprint(&self) -> Option<&str> {
        self.session.ja4.as_deref().or(self.session.ja4s.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_python_tool_keys() -> Result<(), serde_json::Error> {
        let session: ToolSession = serde_json::from_value(json!({
            "stream": 4,
            "src": "172.18.0.3",
            "dst": "142.250.72.4",
            "srcport": "51234",
            "domain": "www.google.com",
            "JA4": "t13d1516h2_8daaf6152771_02713d6af862",
            "JA4_r": "t13d1516h2_002f,0035_0005,000a_0403,0804"
        }))?;
        assert_eq!(session.stream, Some(StreamId::Number(4)));
        assert_eq!(session.domain.as_deref(), Some("www.google.com"));
        assert_eq!(session.ja4.as_deref(), Some("t13d1516h2_8daaf6152771_02713d6af862"));
        assert!(session.ja4_r.is_some());
        assert_eq!(session.extra.get("src"), Some(&json!("172.18.0.3")));
        assert_eq!(session.extra.get("srcport"), Some(&json!("51234")));
        assert!(!session.extra.contains_key("JA4"));
        Ok(())
    }

    #[test]
    fn accepts_rust_tool_keys() -> Result<(), serde_json::Error> {
        let session: ToolSession = serde_json::from_value(json!({
            "stream": "7",
            "tls_server_name": "example.com",
            "ja4s": "t130200_1301_234ea6891581"
        }))?;
        assert_eq!(session.stream, Some(StreamId::Text("7".into())));
        assert_eq!(session.domain.as_deref(), Some("example.com"));
        assert_eq!(session.ja4s.as_deref(), Some("t130200_1301_234ea6891581"));
        Ok(())
    }

    #[test]
    fn record_flattens_session_next_to_annotations() -> Result<(), serde_json::Error> {
        let record = SignatureRecord {
            session: ToolSession {
                stream: Some(StreamId::Number(0)),
                ja4: Some("t13d1516h2_8daaf6152771_02713d6af862".into()),
                ..ToolSession::default()
            },
            source_pcap: "capture.pcap".into(),
            source_pcap_path: "captures/squid/capture.pcap".into(),
            parsed_at_utc: Utc::now(),
            capture_file_mtime_utc: None,
            manifest: Map::new(),
        };
        let value = serde_json::to_value(&record)?;
        assert_eq!(value["ja4"], json!("t13d1516h2_8daaf6152771_02713d6af862"));
        assert_eq!(value["source_pcap"], json!("capture.pcap"));
        assert!(value.get("capture_file_mtime_utc").is_none());

        let back: SignatureRecord = serde_json::from_value(value)?;
        assert_eq!(back.fingerprint(), record.fingerprint());
        assert_eq!(back.source_pcap_path, record.source_pcap_path);
        Ok(())
    }

    #[test]
    fn odd_stream_values_are_kept_raw() -> Result<(), serde_json::Error> {
        for raw in [json!(-1), json!(1.5), json!(null), json!({"id": 3})] {
            let session: ToolSession = serde_json::from_value(json!({
                "stream": raw.clone(),
                "JA4": "t13d1516h2_8daaf6152771_02713d6af862"
            }))?;
            assert_eq!(session.stream, None);
            assert_eq!(session.ja4.as_deref(), Some("t13d1516h2_8daaf6152771_02713d6af862"));
            assert_eq!(session.extra.get("stream"), Some(&raw));

            let written = serde_json::to_value(&session)?;
            assert_eq!(written["stream"], raw);
            let reread: ToolSession = serde_json::from_value(written)?;
            assert_eq!(reread, session);
        }
        Ok(())
    }

    #[test]
    fn both_key_spellings_keep_both_values() -> Result<(), serde_json::Error> {
        let session: ToolSession = serde_json::from_value(json!({
            "stream": 2,
            "ja4": "t13d1516h2_8daaf6152771_02713d6af862",
            "JA4": "t13d1517h2_8daaf6152771_b0da82dd1658"
        }))?;
        assert_eq!(session.ja4.as_deref(), Some("t13d1516h2_8daaf6152771_02713d6af862"));
        assert_eq!(session.extra.get("JA4"), Some(&json!("t13d1517h2_8daaf6152771_b0da82dd1658")));

        let written = serde_json::to_value(&session)?;
        assert_eq!(written["ja4"], json!("t13d1516h2_8daaf6152771_02713d6af862"));
        assert_eq!(written["JA4"], json!("t13d1517h2_8daaf6152771_b0da82dd1658"));
        Ok(())
    }

    #[test]
    fn mistyped_fingerprint_stays_in_extra() -> Result<(), serde_json::Error> {
        let session: ToolSession = serde_json::from_value(json!({
            "JA4": 12,
            "JA4S": "t130200_1301_234ea6891581"
        }))?;
        assert_eq!(session.ja4, None);
        assert_eq!(session.ja4s.as_deref(), Some("t130200_1301_234ea6891581"));
        assert_eq!(session.extra.get("JA4"), Some(&json!(12)));
        Ok(())
    }
}
