use chatstore_data::DataError;

#[test]
fn error_messages() {
    assert_eq!(
        DataError::NotFound("d1 in dialogues".to_string()).to_string(),
        "record not found: d1 in dialogues"
    );
    assert_eq!(
        DataError::RemoteRejected("Feed not found".to_string()).to_string(),
        "remote rejected request: Feed not found"
    );
    assert_eq!(
        DataError::StorageUnavailable("disk full".to_string()).to_string(),
        "storage unavailable: disk full"
    );
}

#[test]
fn classification_helpers() {
    assert!(DataError::NotFound(String::new()).is_not_found());
    assert!(!DataError::NotFound(String::new()).is_remote());
    assert!(DataError::RemoteRejected(String::new()).is_remote());
    assert!(DataError::RemoteUnavailable(String::new()).is_remote());
    assert!(!DataError::StorageUnavailable(String::new()).is_remote());
}

#[test]
fn io_errors_are_storage_failures() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: DataError = io.into();
    assert!(matches!(err, DataError::StorageUnavailable(_)));
}

#[test]
fn conversion_errors_are_invalid_records() {
    let err: DataError = chatstore_types::Error::NotAMapping("array").into();
    match err {
        DataError::InvalidRecord(message) => assert!(message.contains("array")),
        other => panic!("expected InvalidRecord, got {other:?}"),
    }
}
