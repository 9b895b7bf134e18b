use std::io::{self, Read};

use ptrs_core::store::memory::DatasetSnapshot;

/// Reads a piped dataset snapshot. `None` when stdin is a terminal or the
/// pipe carried only whitespace.
pub fn read_dataset() -> Result<Option<DatasetSnapshot>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    parse_dataset(&buffer)
}

fn parse_dataset(text: &str) -> Result<Option<DatasetSnapshot>, Box<dyn std::error::Error>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let snapshot = serde_json::from_str(trimmed)
        .map_err(|e| format!("stdin is not a dataset snapshot: {}", e))?;
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_pipe_is_no_dataset() {
        assert!(parse_dataset(" \n\t").unwrap().is_none());
    }

    #[test]
    fn test_partial_snapshot_defaults_missing_tables() {
        let snapshot = parse_dataset(r#"{"runs": []}"#).unwrap().unwrap();
        assert_eq!(snapshot, DatasetSnapshot::default());
    }

    #[test]
    fn test_non_snapshot_json_is_rejected() {
        let err = parse_dataset(r#"{"runs": 3}"#).unwrap_err();
        assert!(err.to_string().starts_with("stdin is not a dataset snapshot"));
    }
}
