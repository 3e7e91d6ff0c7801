use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::Value;

use crate::error::ScanError;
use crate::media::metadata::{MetadataFields, MetadataValue};

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeSection,
    #[serde(default)]
    streams: Vec<ProbeSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeSection {
    #[serde(default)]
    tags: serde_json::Map<String, Value>,
}

/// Container and stream tags reported by ffprobe.
pub fn read_container_fields(ffprobe: &Path, input_path: &Path) -> Result<MetadataFields, ScanError> {
    // ffprobe -v quiet -print_format json -show_format -show_streams input_file
    let mut child = Command::new(ffprobe)
        .arg("-v")
        .arg("quiet")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(input_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| probe_error(input_path, format!("failed to spawn ffprobe: {}", e)))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| probe_error(input_path, "failed to open ffprobe stdout".into()))?;
    let mut buffer = Vec::new();
    stdout
        .read_to_end(&mut buffer)
        .map_err(|e| probe_error(input_path, format!("failed to read ffprobe output: {}", e)))?;

    let status = child
        .wait()
        .map_err(|e| probe_error(input_path, format!("failed to wait on ffprobe: {}", e)))?;
    if !status.success() {
        return Err(probe_error(input_path, "ffprobe exited with non-zero status".into()));
    }

    parse_probe_output(&buffer).map_err(|e| probe_error(input_path, e.to_string()))
}

/// Format-level tags keep their own names; stream tags are reported as
/// `stream.<index>.<name>`.
pub fn parse_probe_output(json: &[u8]) -> Result<MetadataFields, serde_json::Error> {
    let output: ProbeOutput = serde_json::from_slice(json)?;
    let mut fields = MetadataFields::new();

    for (name, value) in &output.format.tags {
        if let Some(value) = convert(value) {
            fields.push(name.clone(), value);
        }
    }
    for (index, stream) in output.streams.iter().enumerate() {
        for (name, value) in &stream.tags {
            if let Some(value) = convert(value) {
                fields.push(format!("stream.{}.{}", index, name), value);
            }
        }
    }

    Ok(fields)
}

fn convert(value: &Value) -> Option<MetadataValue> {
    match value {
        Value::String(s) => Some(MetadataValue::Text(s.clone())),
        Value::Number(n) => Some(MetadataValue::Text(n.to_string())),
        Value::Array(items) => Some(MetadataValue::List(
            items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        )),
        _ => None,
    }
}

fn probe_error(path: &Path, reason: String) -> ScanError {
    ScanError::MetadataRead {
        path: path.to_path_buf(),
        reason,
    }
}
