//! JSON persistence helpers
//!
//! Everything this crate writes to disk is pretty-printed JSON, except the
//! closed-loop time series which also has a CSV writer.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PastisResult;

/// Serialize `value` to pretty JSON at `path`
pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> PastisResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path.as_ref(), json)?;
    log::debug!("Wrote {}", path.as_ref().display());
    Ok(())
}

/// Read a JSON file written by [`write_json`]
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> PastisResult<T> {
    let json = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PastisError;

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result: PastisResult<Vec<f64>> = read_json(dir.path().join("absent.json"));
        assert!(matches!(result, Err(PastisError::Io(_))));
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let result: PastisResult<Vec<f64>> = read_json(&path);
        assert!(matches!(result, Err(PastisError::Serialization(_))));
    }
}
