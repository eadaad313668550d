use courier::media::{
    extension_for_mime, media_filename, mime_for_filename, sign_media_id, signed_media_url,
    verify_media_signature,
};

#[test]
fn test_extension_for_common_mimes() {
    assert_eq!(extension_for_mime("image/jpeg"), Some("jpg"));
    assert_eq!(extension_for_mime("image/png"), Some("png"));
    assert_eq!(extension_for_mime("audio/ogg"), Some("ogg"));
    assert_eq!(extension_for_mime("video/mp4"), Some("mp4"));
    assert_eq!(extension_for_mime("application/pdf"), Some("pdf"));
    assert_eq!(extension_for_mime("application/x-unknown"), None);
}

#[test]
fn test_filename_from_media_sid() {
    let url = "https://api.twilio.com/2010-04-01/Accounts/AC1/Messages/SM1/Media/ME7a3f";
    assert_eq!(media_filename(url, Some("image/jpeg")), "ME7a3f.jpg");
}

#[test]
fn test_filename_strips_query_and_fragment() {
    assert_eq!(
        media_filename("https://cdn.example.com/m/ME42?Expires=99#frag", Some("application/pdf")),
        "ME42.pdf"
    );
}

#[test]
fn test_filename_keeps_existing_extension() {
    assert_eq!(
        media_filename("https://cdn.example.com/m/photo.jpg", Some("image/jpeg")),
        "photo.jpg"
    );
}

#[test]
fn test_filename_unknown_mime_left_bare() {
    assert_eq!(
        media_filename("https://cdn.example.com/m/ME42", Some("application/x-unknown")),
        "ME42"
    );
    assert_eq!(media_filename("https://cdn.example.com/m/ME42", None), "ME42");
}

#[test]
fn test_mime_for_filename_fallback() {
    assert_eq!(mime_for_filename("voice.ogg"), "audio/ogg");
    assert_eq!(mime_for_filename("contract.pdf"), "application/pdf");
    assert_eq!(mime_for_filename("blob"), "application/octet-stream");
}

#[test]
fn test_signature_verifies_only_for_matching_inputs() {
    let sig = sign_media_id("secret", "message-1");
    assert!(verify_media_signature("secret", "message-1", &sig));
    assert!(!verify_media_signature("secret", "message-2", &sig));
    assert!(!verify_media_signature("wrong", "message-1", &sig));
}

#[test]
fn test_signature_rejects_garbage() {
    assert!(!verify_media_signature("secret", "message-1", ""));
    assert!(!verify_media_signature("secret", "message-1", "zzzz"));
    assert!(!verify_media_signature("secret", "message-1", "deadbeef"));
}

#[test]
fn test_signed_url_is_stable() {
    let a = signed_media_url("https://erp.example.com", "secret", "message-1");
    let b = signed_media_url("https://erp.example.com/", "secret", "message-1");
    assert_eq!(a, b);
    assert!(a.contains("/v1/media/"));
    assert!(a.contains("?sig="));
}
