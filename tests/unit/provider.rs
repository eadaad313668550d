use chrono::Utc;
use courier::config::{FreshchatConfig, TwilioConfig};
use courier::db::MessageRecord;
use courier::provider::freshchat::{map_freshchat_status, FreshchatProvider};
use courier::provider::twilio::{
    normalize_twilio_inbound, TwilioInboundForm, TwilioProvider,
};
use courier::provider::ProviderKind;
use courier::types::{DeliveryStatus, Direction};
use serde_json::json;

fn outbound_record() -> MessageRecord {
    let now = Utc::now();
    MessageRecord {
        id: "msg-1".to_string(),
        provider_id: None,
        direction: Direction::Sent,
        from_addr: "whatsapp:+15550001111".to_string(),
        to_addr: "whatsapp:+15551234567".to_string(),
        body: Some("Hi".to_string()),
        template: None,
        template_sid: None,
        content_variables: None,
        media_url: None,
        attachment: None,
        status: DeliveryStatus::NotSent,
        incoming_media_status: None,
        retry: 0,
        provider: ProviderKind::Twilio,
        reply_handler: None,
        reply_handler_expired: false,
        context_message: None,
        reference_doctype: None,
        reference_name: None,
        party: None,
        communication: None,
        profile_name: None,
        priority: 0,
        error: None,
        date_sent: None,
        created_at: now,
        updated_at: now,
    }
}

fn twilio_provider() -> TwilioProvider {
    TwilioProvider::new(
        reqwest::Client::new(),
        TwilioConfig {
            enabled: true,
            account_sid: Some("AC123".to_string()),
            auth_token: Some("secret".to_string()),
            api_base: "https://api.twilio.com".to_string(),
        },
        "https://erp.example.com".to_string(),
    )
}

#[test]
fn test_provider_kind_parse() {
    assert_eq!(ProviderKind::parse("Twilio"), Some(ProviderKind::Twilio));
    assert_eq!(ProviderKind::parse("Freshchat"), Some(ProviderKind::Freshchat));
    assert_eq!(ProviderKind::parse("Vonage"), None);
}

#[test]
fn test_twilio_form_free_text() {
    let form = twilio_provider().message_form(&outbound_record());
    assert!(form.contains(&("From".to_string(), "whatsapp:+15550001111".to_string())));
    assert!(form.contains(&("To".to_string(), "whatsapp:+15551234567".to_string())));
    assert!(form.contains(&("Body".to_string(), "Hi".to_string())));
    assert!(form.contains(&(
        "StatusCallback".to_string(),
        "https://erp.example.com/v1/whatsapp/status-callback".to_string()
    )));
    assert!(!form.iter().any(|(k, _)| k == "ContentSid"));
}

#[test]
fn test_twilio_form_template_takes_precedence() {
    let mut record = outbound_record();
    record.template_sid = Some("HX42".to_string());
    record.content_variables = Some(json!({"1": "Ada"}));

    let form = twilio_provider().message_form(&record);
    assert!(form.contains(&("ContentSid".to_string(), "HX42".to_string())));
    assert!(form
        .iter()
        .any(|(k, v)| k == "ContentVariables" && v.contains("Ada")));
    assert!(!form.iter().any(|(k, _)| k == "Body"));
}

#[test]
fn test_twilio_form_media_url() {
    let mut record = outbound_record();
    record.media_url = Some("https://erp.example.com/v1/media/msg-1?sig=abc".to_string());
    let form = twilio_provider().message_form(&record);
    assert!(form
        .iter()
        .any(|(k, v)| k == "MediaUrl" && v.contains("/v1/media/msg-1")));
}

#[test]
fn test_freshchat_payload_requires_template() {
    let provider = FreshchatProvider::new(reqwest::Client::new(), FreshchatConfig::default());
    assert!(provider.message_payload(&outbound_record()).is_err());
}

#[test]
fn test_freshchat_payload_shape() {
    let provider = FreshchatProvider::new(
        reqwest::Client::new(),
        FreshchatConfig {
            enabled: true,
            api_key: Some("key".to_string()),
            api_endpoint: "https://api.freshchat.com".to_string(),
            channel_id: Some("chan-1".to_string()),
            namespace: Some("ns".to_string()),
        },
    );
    let mut record = outbound_record();
    record.template_sid = Some("order_update".to_string());
    record.content_variables = Some(json!({"customer": "Ada", "order": "SO-1"}));
    record.media_url = Some("https://erp.example.com/v1/media/msg-1?sig=abc".to_string());

    let payload = provider.message_payload(&record).unwrap();
    assert_eq!(payload["channel_id"], "chan-1");
    assert_eq!(payload["from"]["phone_number"], "+15550001111");
    assert_eq!(payload["to"][0]["phone_number"], "+15551234567");

    let template = &payload["data"]["message_template"];
    assert_eq!(template["template_name"], "order_update");
    let params = template["rich_template_data"]["body"]["params"]
        .as_array()
        .unwrap();
    assert_eq!(params.len(), 2);
    assert_eq!(params[0]["data"], "Ada");
    assert_eq!(
        template["rich_template_data"]["header"]["media_url"],
        "https://erp.example.com/v1/media/msg-1?sig=abc"
    );
}

#[test]
fn test_freshchat_status_mapping() {
    assert_eq!(map_freshchat_status("IN_PROGRESS"), Some(DeliveryStatus::Queued));
    assert_eq!(map_freshchat_status("ACCEPTED"), Some(DeliveryStatus::Queued));
    assert_eq!(map_freshchat_status("SENT"), Some(DeliveryStatus::Sent));
    assert_eq!(map_freshchat_status("FAILED"), Some(DeliveryStatus::Failed));
    assert_eq!(map_freshchat_status("UNKNOWN"), None);
}

#[test]
fn test_normalize_twilio_inbound() {
    let event = normalize_twilio_inbound(TwilioInboundForm {
        message_sid: Some("SM999".to_string()),
        from: "whatsapp:+15551234567".to_string(),
        to: "whatsapp:+15550001111".to_string(),
        body: Some("Confirm".to_string()),
        profile_name: Some("Ada".to_string()),
        original_replied_message_sid: Some("SM123".to_string()),
        original_replied_message_sender: Some("whatsapp:+15550001111".to_string()),
        media_url0: Some("https://api.twilio.com/media/ME1".to_string()),
        media_content_type0: Some("image/jpeg".to_string()),
    });

    assert_eq!(event.from, "whatsapp:+15551234567");
    assert_eq!(event.provider_message_id.as_deref(), Some("SM999"));
    assert_eq!(event.replied_provider_id.as_deref(), Some("SM123"));
    assert_eq!(event.media_content_type.as_deref(), Some("image/jpeg"));
}
