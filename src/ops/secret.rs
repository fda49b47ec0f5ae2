//! Base64 encoding and decoding of a Secret manifest's `data` section.

use std::fmt;
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_yaml::{Mapping, Value};

use crate::configuration::SecretConfig;
use crate::errors::{AppError, CodecError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encode,
    Decode,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Encode => f.write_str("encode"),
            Direction::Decode => f.write_str("decode"),
        }
    }
}

/// Read a manifest from `input`, transcode it and write YAML to `out`.
pub fn run(config: &SecretConfig, input: &mut dyn Read, out: &mut dyn Write) -> Result<Direction, AppError> {
    tracing::info!("Reading secret from stdin");
    let mut manifest = String::new();
    input.read_to_string(&mut manifest)?;

    let (direction, rendered) = transcode(&manifest, config.direction)?;
    tracing::debug!("Secret data transcoded with direction {}", direction);
    out.write_all(rendered.as_bytes())?;
    out.flush()?;
    Ok(direction)
}

/// Transcode every value of the `data` mapping.
///
/// Without an explicit direction, values are decoded only when every one of
/// them is valid base64 of UTF-8 text; otherwise all are encoded. Fields
/// outside `data` are kept as they are.
pub fn transcode(input: &str, direction: Option<Direction>) -> Result<(Direction, String), CodecError> {
    let mut document = parse(input)?;
    let data = document
        .get_mut("data")
        .and_then(Value::as_mapping_mut)
        .ok_or(CodecError::NotASecret)?;

    let direction = match direction {
        Some(direction) => direction,
        None => infer_direction(data)?,
    };

    for (key, value) in data.iter_mut() {
        let name = key_name(key);
        let text = value
            .as_str()
            .ok_or_else(|| CodecError::NonString(name.clone()))?;
        let converted = match direction {
            Direction::Encode => STANDARD.encode(text),
            Direction::Decode => decode_value(&name, text)?,
        };
        *value = Value::String(converted);
    }

    Ok((direction, serde_yaml::to_string(&document)?))
}

fn parse(input: &str) -> Result<Value, CodecError> {
    match serde_yaml::from_str::<Value>(input) {
        Ok(document) => Ok(document),
        Err(yaml) => serde_json::from_str::<Value>(input).map_err(|json| CodecError::Parse {
            yaml: yaml.to_string(),
            json: json.to_string(),
        }),
    }
}

fn infer_direction(data: &Mapping) -> Result<Direction, CodecError> {
    for (key, value) in data {
        let name = key_name(key);
        let text = value.as_str().ok_or_else(|| CodecError::NonString(name.clone()))?;
        if decode_value(&name, text).is_err() {
            return Ok(Direction::Encode);
        }
    }
    Ok(Direction::Decode)
}

fn decode_value(key: &str, text: &str) -> Result<String, CodecError> {
    let bytes = STANDARD.decode(text).map_err(|source| CodecError::InvalidBase64 {
        key: key.to_string(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|_| CodecError::NotUtf8(key.to_string()))
}

fn key_name(key: &Value) -> String {
    match key.as_str() {
        Some(name) => name.to_string(),
        None => format!("{key:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const ENCODED: &str = "apiVersion: v1\nkind: Secret\nmetadata:\n  name: creds\ndata:\n  user: YWRtaW4=\n  pass: czNjcjN0\n";
    const PLAIN: &str = "apiVersion: v1\nkind: Secret\nmetadata:\n  name: creds\ndata:\n  user: admin\n  pass: s3cr3t\n";

    fn data_of(rendered: &str) -> Mapping {
        let doc: Value = serde_yaml::from_str(rendered).unwrap();
        doc["data"].as_mapping().unwrap().clone()
    }

    fn value<'a>(data: &'a Mapping, key: &str) -> &'a str {
        data.get(key).and_then(Value::as_str).unwrap()
    }

    #[test]
    fn explicit_encode() {
        let (direction, out) = transcode(PLAIN, Some(Direction::Encode)).unwrap();
        assert_eq!(direction, Direction::Encode);
        let data = data_of(&out);
        assert_eq!(value(&data, "user"), "YWRtaW4=");
        assert_eq!(value(&data, "pass"), "czNjcjN0");
    }

    #[test]
    fn explicit_decode_keeps_other_fields() {
        let (_, out) = transcode(ENCODED, Some(Direction::Decode)).unwrap();
        let doc: Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(doc["kind"].as_str(), Some("Secret"));
        assert_eq!(doc["metadata"]["name"].as_str(), Some("creds"));
        let data = data_of(&out);
        assert_eq!(value(&data, "user"), "admin");
        assert_eq!(value(&data, "pass"), "s3cr3t");
    }

    #[test]
    fn inferred_decode_when_every_value_is_base64() {
        let (direction, out) = transcode(ENCODED, None).unwrap();
        assert_eq!(direction, Direction::Decode);
        assert_eq!(value(&data_of(&out), "user"), "admin");
    }

    #[test]
    fn inferred_encode_when_any_value_is_plain() {
        let mixed = "data:\n  a: YWRtaW4=\n  b: not base64!\n";
        let (direction, out) = transcode(mixed, None).unwrap();
        assert_eq!(direction, Direction::Encode);
        let data = data_of(&out);
        assert_eq!(value(&data, "a"), STANDARD.encode("YWRtaW4="));
        assert_eq!(value(&data, "b"), STANDARD.encode("not base64!"));
    }

    #[test]
    fn json_input_is_accepted() {
        let json = r#"{"kind": "Secret", "data": {"token": "dG9rZW4="}}"#;
        let (_, out) = transcode(json, Some(Direction::Decode)).unwrap();
        assert_eq!(value(&data_of(&out), "token"), "token");
    }

    #[test]
    fn decode_failure_names_the_key() {
        assert_matches!(
            transcode(PLAIN, Some(Direction::Decode)),
            Err(CodecError::InvalidBase64 { key, .. }) if key == "user"
        );
    }

    #[test]
    fn binary_payload_is_not_decoded() {
        let binary = "data:\n  blob: /w==\n";
        assert_matches!(
            transcode(binary, Some(Direction::Decode)),
            Err(CodecError::NotUtf8(key)) if key == "blob"
        );
        let (direction, _) = transcode(binary, None).unwrap();
        assert_eq!(direction, Direction::Encode);
    }

    #[test]
    fn rejects_non_secrets() {
        assert_matches!(transcode("kind: ConfigMap\n", None), Err(CodecError::NotASecret));
        assert_matches!(transcode("data: [1, 2]\n", None), Err(CodecError::NotASecret));
        assert_matches!(
            transcode("data:\n  n: 3\n", None),
            Err(CodecError::NonString(key)) if key == "n"
        );
    }

    #[test]
    fn run_reads_input_and_writes_yaml() {
        let mut input = PLAIN.as_bytes();
        let mut out = Vec::new();
        let config = SecretConfig { direction: None };

        let direction = run(&config, &mut input, &mut out).unwrap();
        assert_eq!(direction, Direction::Encode);
        let rendered = String::from_utf8(out).unwrap();
        assert_eq!(value(&data_of(&rendered), "user"), "YWRtaW4=");
    }
}
