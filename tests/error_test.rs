//! Tests for error types

use std::path::PathBuf;

use house_price_search::Error;

#[test]
fn test_data_shape_error() {
    let error = Error::DataShape {
        missing: vec!["sqft_lot".to_string()],
        extra: vec!["waterfront_view".to_string()],
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("does not match feature list"));
    assert!(error_str.contains("sqft_lot"));
    assert!(error_str.contains("waterfront_view"));
}

#[test]
fn test_artifact_not_found_error() {
    let error = Error::ArtifactNotFound(PathBuf::from("models/rf.bin"));
    let error_str = format!("{error}");
    assert!(error_str.contains("Artifact not found"));
    assert!(error_str.contains("models/rf.bin"));
}

#[test]
fn test_schema_mismatch_error() {
    let error = Error::SchemaMismatch {
        path: PathBuf::from("models/rf.json"),
        reason: "matches none of the declared shapes".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("schema mismatch"));
    assert!(error_str.contains("models/rf.json"));
}

#[test]
fn test_tracking_store_error() {
    let error = Error::TrackingStore("duplicate run".to_string());
    assert!(format!("{error}").contains("Tracking store error"));
}

#[test]
fn test_per_source_classification() {
    let per_source = [
        Error::ArtifactNotFound(PathBuf::from("a.bin")),
        Error::Corrupt {
            path: PathBuf::from("a.bin"),
            reason: "bad magic".to_string(),
        },
        Error::SchemaMismatch {
            path: PathBuf::from("a.json"),
            reason: "ambiguous".to_string(),
        },
        Error::ArtifactIo {
            path: PathBuf::from("a.bin"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        },
    ];
    assert!(per_source.iter().all(Error::is_per_source));

    let fatal = [
        Error::TrackingStore("down".to_string()),
        Error::FitFailure("singular".to_string()),
        Error::InvalidInput("k".to_string()),
    ];
    assert!(!fatal.iter().any(Error::is_per_source));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    assert!(format!("{error}").contains("IO error"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}
