use super::*;

#[test]
fn test_internal_errors_are_masked() {
    let err = TransferError::Internal("serde blew up at byte 42".to_string());
    assert!(!err.is_expected());
    assert_eq!(err.user_message(), UNEXPECTED_ERROR_MESSAGE);

    let descriptor = err.descriptor();
    assert_eq!(descriptor.kind, ErrorKind::Internal);
    assert!(!descriptor.message.contains("byte 42"));
}

#[test]
fn test_expected_errors_keep_their_message() {
    let err = TransferError::Schema("Target table does not exist".to_string());
    assert!(err.is_expected());
    assert_eq!(err.descriptor().message, "Target table does not exist");
    assert_eq!(err.kind(), ErrorKind::SchemaError);
}

#[test]
fn test_missing_columns_lists_names() {
    let err = TransferError::MissingColumns(vec!["c".to_string(), "d".to_string()]);
    assert_eq!(err.kind(), ErrorKind::SchemaError);
    assert_eq!(
        err.to_string(),
        "Selected columns not found in file header: c, d"
    );
}

#[test]
fn test_insert_error_kind_is_single_machine_kind() {
    let mismatch = TransferError::Insert {
        kind: InsertFailureKind::TypeMismatch,
        message: "Data type mismatch".to_string(),
    };
    let generic = TransferError::Insert {
        kind: InsertFailureKind::Generic,
        message: "boom".to_string(),
    };
    assert_eq!(mismatch.kind(), ErrorKind::InsertError);
    assert_eq!(generic.kind(), ErrorKind::InsertError);
}

#[test]
fn test_error_kind_serializes_snake_case() {
    let value = serde_json::to_value(ErrorKind::DdlError).unwrap();
    assert_eq!(value, serde_json::json!("ddl_error"));
}
