//! Input validation rules

use market_chat::validation::{InputValidator, MAX_ID_LEN, MAX_MESSAGE_LEN};

#[test]
fn test_validate_id_valid() {
    assert!(InputValidator::validate_id("user", "uid_123-abc").is_ok());
}

#[test]
fn test_validate_id_empty() {
    assert!(InputValidator::validate_id("user", "").is_err());
    assert!(InputValidator::validate_id("user", "   ").is_err());
}

#[test]
fn test_validate_id_too_long() {
    assert!(InputValidator::validate_id("item", &"a".repeat(MAX_ID_LEN)).is_ok());
    assert!(InputValidator::validate_id("item", &"a".repeat(MAX_ID_LEN + 1)).is_err());
}

#[test]
fn test_validate_id_rejects_separators_and_whitespace() {
    assert!(InputValidator::validate_id("item", "a/b").is_err());
    assert!(InputValidator::validate_id("item", "a b").is_err());
    assert!(InputValidator::validate_id("item", "a\u{7}b").is_err());
}

#[test]
fn test_validate_participants() {
    assert!(InputValidator::validate_participants("alice", "bob").is_ok());
    assert!(InputValidator::validate_participants("alice", "alice").is_err());
    assert!(InputValidator::validate_participants("", "bob").is_err());
}

#[test]
fn test_sanitize_text() {
    assert_eq!(InputValidator::sanitize_text("  hello\u{0}  "), "hello");
    assert_eq!(InputValidator::sanitize_text("line one\nline two"), "line one\nline two");
}

#[test]
fn test_validate_message_text() {
    assert_eq!(
        InputValidator::validate_message_text("  is it still available?  ").expect("valid text"),
        "is it still available?"
    );
    assert!(InputValidator::validate_message_text("").is_err());
    assert!(InputValidator::validate_message_text("\u{1}\u{2}").is_err());
}

#[test]
fn test_validate_message_text_length_counts_chars() {
    let korean = "안".repeat(MAX_MESSAGE_LEN);
    assert!(InputValidator::validate_message_text(&korean).is_ok());

    let too_long = "안".repeat(MAX_MESSAGE_LEN + 1);
    assert!(InputValidator::validate_message_text(&too_long).is_err());
}

#[test]
fn test_validate_database_url() {
    assert!(InputValidator::validate_database_url("sqlite:data/chat.db").is_ok());
    assert!(InputValidator::validate_database_url(":memory:").is_ok());
    assert!(InputValidator::validate_database_url("").is_err());
    assert!(InputValidator::validate_database_url("postgres://localhost/chat").is_err());
}
