use chrono::{Duration, Utc};
use courier::reply::{indirect_window_open, ExecutionIdentity, ReplyRegistry, SYSTEM_USER};
use std::sync::Arc;

#[test]
fn test_zero_window_never_expires() {
    let sent = Utc::now() - Duration::days(30);
    assert!(indirect_window_open(Some(sent), 0, Utc::now()));
}

#[test]
fn test_window_open_just_inside() {
    let now = Utc::now();
    let sent = now - Duration::seconds(3599);
    assert!(indirect_window_open(Some(sent), 3600, now));
}

#[test]
fn test_window_closed_just_outside() {
    let now = Utc::now();
    let sent = now - Duration::seconds(3601);
    assert!(!indirect_window_open(Some(sent), 3600, now));
}

#[test]
fn test_window_without_send_time_is_closed() {
    assert!(!indirect_window_open(None, 3600, Utc::now()));
}

#[test]
fn test_identity_elevation_scopes() {
    let identity = Arc::new(ExecutionIdentity::new("webhook"));
    assert_eq!(identity.current(), "webhook");
    {
        let _guard = identity.elevate(SYSTEM_USER);
        assert_eq!(identity.current(), SYSTEM_USER);
    }
    assert_eq!(identity.current(), "webhook");
}

#[test]
fn test_identity_restored_after_panic_unwind() {
    let identity = Arc::new(ExecutionIdentity::new("webhook"));
    let cloned = Arc::clone(&identity);
    let result = std::panic::catch_unwind(move || {
        let _guard = cloned.elevate(SYSTEM_USER);
        panic!("handler blew up");
    });
    assert!(result.is_err());
    assert_eq!(identity.current(), "webhook");
}

#[test]
fn test_empty_registry_resolves_nothing() {
    let registry = ReplyRegistry::new();
    assert!(registry.get("order-confirm").is_none());
}
