use courier::types::{
    retry_disposition, strip_whatsapp_prefix, whatsapp_address, AttachmentRef, DeliveryStatus,
    Direction, MediaStatus, RetryDisposition, MAX_RETRIES,
};

#[test]
fn test_delivery_status_labels() {
    assert_eq!(DeliveryStatus::NotSent.as_str(), "Not Sent");
    assert_eq!(DeliveryStatus::Queued.as_str(), "Queued");
    assert_eq!(DeliveryStatus::parse("Not Sent"), Some(DeliveryStatus::NotSent));
    assert_eq!(DeliveryStatus::parse("not sent"), None);
}

#[test]
fn test_provider_status_mapping() {
    assert_eq!(
        DeliveryStatus::from_provider("queued"),
        Some(DeliveryStatus::Queued)
    );
    assert_eq!(
        DeliveryStatus::from_provider("accepted"),
        Some(DeliveryStatus::Queued)
    );
    assert_eq!(
        DeliveryStatus::from_provider("Delivered"),
        Some(DeliveryStatus::Delivered)
    );
    assert_eq!(
        DeliveryStatus::from_provider("undelivered"),
        Some(DeliveryStatus::Failed)
    );
    assert_eq!(DeliveryStatus::from_provider(""), None);
}

#[test]
fn test_terminal_states_are_sticky_set() {
    let terminal = [
        DeliveryStatus::Delivered,
        DeliveryStatus::Read,
        DeliveryStatus::Failed,
        DeliveryStatus::Error,
        DeliveryStatus::Expired,
    ];
    for status in terminal {
        assert!(status.is_terminal(), "{} should be terminal", status.as_str());
    }
    for status in [
        DeliveryStatus::NotSent,
        DeliveryStatus::Sending,
        DeliveryStatus::Queued,
        DeliveryStatus::Sent,
    ] {
        assert!(!status.is_terminal(), "{} should not be terminal", status.as_str());
    }
}

#[test]
fn test_media_status_labels() {
    assert_eq!(MediaStatus::ToDownload.as_str(), "To Download");
    assert_eq!(MediaStatus::parse("To Download"), Some(MediaStatus::ToDownload));
    assert_eq!(MediaStatus::parse("Pending"), None);
}

#[test]
fn test_direction_is_closed() {
    assert_eq!(Direction::parse("Sent"), Some(Direction::Sent));
    assert_eq!(Direction::parse("Received"), Some(Direction::Received));
    assert_eq!(Direction::parse("Outbound"), None);
}

#[test]
fn test_retry_disposition_increments_until_cap() {
    assert_eq!(retry_disposition(0), RetryDisposition::Retry(1));
    assert_eq!(retry_disposition(2), RetryDisposition::Retry(3));
    assert_eq!(retry_disposition(MAX_RETRIES), RetryDisposition::Terminal);
}

#[test]
fn test_whatsapp_address_helpers() {
    assert_eq!(whatsapp_address("+15551234567"), "whatsapp:+15551234567");
    assert_eq!(
        whatsapp_address("whatsapp:+15551234567"),
        "whatsapp:+15551234567"
    );
    assert_eq!(strip_whatsapp_prefix("whatsapp:+15551234567"), "+15551234567");
}

#[test]
fn test_attachment_ref_serialization() {
    let media = AttachmentRef::from_media("https://cdn.example.com/m/1", Some("image/png".into()));
    let raw = serde_json::to_string(&media).unwrap();
    assert!(raw.contains("media_url"));
    assert!(!raw.contains("file_id"));
    assert!(!raw.contains("print_artifact"));

    let print: AttachmentRef = serde_json::from_str(r#"{"print_artifact": true}"#).unwrap();
    assert!(print.print_artifact);
    assert!(!print.is_empty());
}

#[test]
fn test_attachment_ref_empty() {
    let empty: AttachmentRef = serde_json::from_str("{}").unwrap();
    assert!(empty.is_empty());
}
