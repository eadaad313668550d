use courier::config::{resolve_database_url, Config, DatabaseConfig};
use courier::provider::ProviderKind;

fn configured() -> Config {
    let mut cfg = Config::default();
    cfg.whatsapp.sender_number = Some("+15550001111".to_string());
    cfg.twilio.enabled = true;
    cfg.twilio.account_sid = Some("AC123".to_string());
    cfg.twilio.auth_token = Some("secret".to_string());
    cfg
}

#[test]
fn test_default_values() {
    let cfg = Config::default();
    assert_eq!(cfg.server.port, 8093);
    assert!(cfg.auth.token.is_none());
    assert_eq!(cfg.whatsapp.provider.as_deref(), Some("Twilio"));
    assert!(!cfg.whatsapp.mute);
    assert_eq!(cfg.queue.dispatch_batch, 500);
    assert_eq!(cfg.queue.reconcile_batch, 100);
    assert_eq!(cfg.queue.media_batch, 100);
    assert_eq!(cfg.queue.retention_days, 7);
    assert_eq!(cfg.twilio.api_base, "https://api.twilio.com");
}

#[test]
fn test_unconfigured_deployment_is_muted() {
    assert!(Config::default().messages_muted(None));
}

#[test]
fn test_configured_deployment_is_not_muted() {
    assert!(!configured().messages_muted(None));
}

#[test]
fn test_explicit_mute_overrides_configuration() {
    let mut cfg = configured();
    cfg.whatsapp.mute = true;
    assert!(cfg.messages_muted(None));
    assert!(cfg.messages_muted(Some(ProviderKind::Twilio)));
}

#[test]
fn test_mute_is_per_provider() {
    let cfg = configured();
    assert!(!cfg.messages_muted(Some(ProviderKind::Twilio)));
    assert!(cfg.messages_muted(Some(ProviderKind::Freshchat)));
}

#[test]
fn test_missing_sender_number_mutes() {
    let mut cfg = configured();
    cfg.whatsapp.sender_number = None;
    assert!(cfg.messages_muted(Some(ProviderKind::Twilio)));
}

#[test]
fn test_provider_enabled() {
    let cfg = configured();
    assert!(cfg.provider_enabled(ProviderKind::Twilio));
    assert!(!cfg.provider_enabled(ProviderKind::Freshchat));
}

#[test]
fn test_default_provider() {
    let mut cfg = configured();
    assert_eq!(cfg.default_provider(), Some(ProviderKind::Twilio));
    cfg.whatsapp.provider = Some("Freshchat".to_string());
    assert_eq!(cfg.default_provider(), Some(ProviderKind::Freshchat));
    cfg.whatsapp.provider = None;
    assert_eq!(cfg.default_provider(), None);
}

#[test]
fn test_resolve_database_url_prefers_explicit_url() {
    let cfg = Config {
        database: DatabaseConfig {
            url: Some("postgres://localhost/courier".to_string()),
            sqlite_path: "~/.courier/state.sqlite".to_string(),
        },
        ..Config::default()
    };
    assert_eq!(resolve_database_url(&cfg), "postgres://localhost/courier");
}

#[test]
fn test_resolve_database_url_falls_back_to_sqlite() {
    let cfg = Config {
        database: DatabaseConfig {
            url: None,
            sqlite_path: "/tmp/courier-test/state.sqlite".to_string(),
        },
        ..Config::default()
    };
    assert_eq!(
        resolve_database_url(&cfg),
        "sqlite:///tmp/courier-test/state.sqlite"
    );
}

#[test]
fn test_config_round_trips_through_json() {
    let cfg = configured();
    let raw = serde_json::to_string(&cfg).unwrap();
    let parsed: Config = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed.whatsapp.sender_number, cfg.whatsapp.sender_number);
    assert_eq!(parsed.twilio.account_sid, cfg.twilio.account_sid);
    assert!(parsed.twilio.enabled);
}

#[test]
fn test_partial_config_fills_defaults() {
    let parsed: Config =
        serde_json::from_str(r#"{"whatsapp": {"sender_number": "+1555"}}"#).unwrap();
    assert_eq!(parsed.whatsapp.sender_number.as_deref(), Some("+1555"));
    assert_eq!(parsed.server.port, 8093);
    assert_eq!(parsed.queue.retention_days, 7);
}
