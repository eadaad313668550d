use courier::db::{TemplateParameter, TemplateRecord};
use courier::template::{render_body, render_content_variables, render_value};
use serde_json::json;

fn appointment_template() -> TemplateRecord {
    TemplateRecord {
        name: "appointment-reminder".to_string(),
        template_sid: Some("HXa1b2c3".to_string()),
        body: "Hi {{ patient }}, your appointment is on {{ date }}.".to_string(),
        parameters: vec![
            TemplateParameter {
                variable: "patient".to_string(),
                value: "{{ doc.patient_name }}".to_string(),
            },
            TemplateParameter {
                variable: "date".to_string(),
                value: "{{ doc.appointment_date }}".to_string(),
            },
        ],
        media_variable: None,
        reply_handler: Some("appointment-replies".to_string()),
    }
}

#[test]
fn test_literal_values_bypass_rendering() {
    let ctx = json!({});
    assert_eq!(render_value("Queued", &ctx).unwrap(), "Queued");
}

#[test]
fn test_value_rendering_uses_context() {
    let ctx = json!({"doc": {"patient_name": "Ada Lovelace"}});
    assert_eq!(
        render_value("{{ doc.patient_name }}", &ctx).unwrap(),
        "Ada Lovelace"
    );
}

#[test]
fn test_variables_preserve_parameter_order() {
    let ctx = json!({"doc": {"patient_name": "Ada", "appointment_date": "2024-06-01"}});
    let variables = render_content_variables(&appointment_template(), &ctx).unwrap();
    let keys: Vec<&String> = variables.keys().collect();
    assert_eq!(keys, vec!["patient", "date"]);
}

#[test]
fn test_rendered_body_is_deterministic() {
    let template = appointment_template();
    let ctx = json!({"doc": {"patient_name": "Ada", "appointment_date": "2024-06-01"}});
    let variables = render_content_variables(&template, &ctx).unwrap();

    let first = render_body(&template, &variables).unwrap();
    let second = render_body(&template, &variables).unwrap();
    let third = render_body(&template, &variables).unwrap();

    assert_eq!(first, "Hi Ada, your appointment is on 2024-06-01.");
    assert_eq!(first, second);
    assert_eq!(second, third);
}

#[test]
fn test_missing_context_key_renders_empty() {
    let ctx = json!({"doc": {}});
    let rendered = render_value("{{ doc.patient_name }}", &ctx).unwrap();
    assert_eq!(rendered, "");
}

#[test]
fn test_template_record_parameters_round_trip() {
    let template = appointment_template();
    let raw = serde_json::to_string(&template.parameters).unwrap();
    let parsed: Vec<TemplateParameter> = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].variable, "patient");
}
