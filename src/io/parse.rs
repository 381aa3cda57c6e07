use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Decode source bytes into JSON documents.
///
/// A single JSON document (object or list) is parsed with SIMD acceleration.
/// Anything else is retried as newline-delimited JSON, one document per line.
pub fn decode_documents(bytes: &[u8]) -> Result<Vec<Value>> {
    // simd-json parses in place, so it needs its own mutable copy
    let mut content = bytes.to_vec();
    if let Ok(value) = simd_json::serde::from_slice::<Value>(&mut content) {
        return Ok(vec![value]);
    }

    let text = std::str::from_utf8(bytes).context("Source is not valid UTF-8")?;
    let mut documents = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse JSON on line {}", idx + 1))?;
        documents.push(value);
    }

    if documents.is_empty() {
        bail!("Source contains no JSON documents");
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_document() {
        let docs = decode_documents(br#"{"users": [{"id": 1}]}"#).unwrap();
        assert_eq!(docs, vec![json!({"users": [{"id": 1}]})]);
    }

    #[test]
    fn test_newline_delimited_documents() {
        let docs = decode_documents(b"{\"id\": 1}\n\n{\"id\": 2}\n").unwrap();
        assert_eq!(docs, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn test_bad_line_reports_its_number() {
        let err = decode_documents(b"{\"id\": 1}\n{oops\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_source_is_an_error() {
        assert!(decode_documents(b"   \n").is_err());
    }
}
