//! CRM (Systeme.io) lead webhook
//!
//! Systeme.io posts either JSON or a urlencoded form, and depending on the
//! automation the fields sit at the top level, under `contact`, or under
//! `contact.fields` (an object, or a list of `{slug, value}`).

use super::AppState;
use crate::coach::LeadOutcome;
use crate::contacts::Profile;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};

const PHONE: &[&str] = &["phone", "phone_number", "telephone", "tel", "whatsapp"];
const FIRST_NAME: &[&str] = &["first_name", "firstname", "prenom"];
const LAST_NAME: &[&str] = &["surname", "last_name", "lastname", "nom"];
const EMAIL: &[&str] = &["email"];
const GOAL: &[&str] = &["objectif", "goal", "objectifs"];
const CONSTRAINTS: &[&str] = &["contraintes", "constraints", "blessures"];
const LEVEL: &[&str] = &["niveau", "level"];

/// Scalars that describe the request rather than the person.
const NOT_PROFILE: &[&str] = &["secret", "id"];

pub async fn receive(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorized = match state.coach.config().systeme_secret.as_deref() {
        Some(expected) if !expected.is_empty() => {
            params.get("secret").map(String::as_str) == Some(expected)
        }
        _ => false,
    };
    if !authorized {
        tracing::warn!("CRM: rejected request with missing or wrong secret");
        return StatusCode::FORBIDDEN.into_response();
    }

    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    let payload = if is_form {
        parse_form(&body)
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| parse_form(&body))
    };

    let (phone, profile) = parse_lead(&payload);
    let Some(phone) = phone else {
        tracing::warn!("CRM: submission without phone number ignored");
        return (StatusCode::OK, Json(json!({ "status": "ignored" }))).into_response();
    };

    match state.coach.ingest_lead(&phone, profile).await {
        LeadOutcome::Accepted(id) => {
            (StatusCode::OK, Json(json!({ "status": "ok", "contact": id }))).into_response()
        }
        LeadOutcome::Ignored => {
            (StatusCode::OK, Json(json!({ "status": "ignored" }))).into_response()
        }
    }
}

/// Decode `a=1&b=2` into a flat JSON object. Bracketed keys keep their last
/// segment: `contact[fields][phone_number]` becomes `phone_number`.
fn parse_form(body: &[u8]) -> Value {
    let text = String::from_utf8_lossy(body);
    let mut object = Map::new();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);
        let key = key
            .rsplit('[')
            .next()
            .map(|k| k.trim_end_matches(']').to_string())
            .unwrap_or(key.clone());
        object.insert(key, Value::String(value));
    }
    Value::Object(object)
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn collect_scalars(object: &Map<String, Value>, into: &mut BTreeMap<String, String>) {
    for (key, value) in object {
        if let Some(v) = scalar(value) {
            into.insert(key.to_lowercase(), v);
        }
    }
}

fn collect_fields(fields: &Value, into: &mut BTreeMap<String, String>) {
    match fields {
        Value::Object(object) => collect_scalars(object, into),
        Value::Array(items) => {
            for item in items {
                let slug = item.get("slug").and_then(Value::as_str);
                let value = item.get("value").and_then(scalar);
                if let (Some(slug), Some(value)) = (slug, value) {
                    into.insert(slug.to_lowercase(), value);
                }
            }
        }
        _ => {}
    }
}

fn get_ci<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// Every scalar field of the payload, keyed by lowercased name. More
/// specific locations win: `contact.fields` over `contact` over top level.
fn flatten(payload: &Value) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let Some(root) = payload.as_object() else {
        return fields;
    };

    collect_scalars(root, &mut fields);
    if let Some(top_fields) = get_ci(root, "fields") {
        collect_fields(top_fields, &mut fields);
    }
    if let Some(contact) = get_ci(root, "contact").and_then(Value::as_object) {
        collect_scalars(contact, &mut fields);
        if let Some(contact_fields) = get_ci(contact, "fields") {
            collect_fields(contact_fields, &mut fields);
        }
    }
    fields
}

/// First non-empty value among `aliases`. Every alias is consumed.
fn take(fields: &mut BTreeMap<String, String>, aliases: &[&str]) -> Option<String> {
    let mut found = None;
    for alias in aliases {
        if let Some(value) = fields.remove(*alias)
            && found.is_none()
            && !value.is_empty()
        {
            found = Some(value);
        }
    }
    found
}

/// Split a CRM payload into the raw phone number and the profile.
pub(crate) fn parse_lead(payload: &Value) -> (Option<String>, Profile) {
    let mut fields = flatten(payload);

    let phone = take(&mut fields, PHONE);
    let profile = Profile {
        first_name: take(&mut fields, FIRST_NAME),
        last_name: take(&mut fields, LAST_NAME),
        email: take(&mut fields, EMAIL),
        goal: take(&mut fields, GOAL),
        constraints: take(&mut fields, CONSTRAINTS),
        level: take(&mut fields, LEVEL),
        extra: fields
            .into_iter()
            .filter(|(k, v)| !v.is_empty() && !NOT_PROFILE.contains(&k.as_str()))
            .collect(),
    };
    (phone, profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::ContactStore;
    use crate::gateway::router;
    use crate::tests::harness::Harness;
    use crate::tests::mocks::MockModel;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn test_parse_nested_contact_fields() {
        let payload = json!({
            "type": "contact.created",
            "contact": {
                "id": 12345,
                "email": "lea@example.com",
                "fields": [
                    { "slug": "first_name", "value": "Léa" },
                    { "slug": "surname", "value": "Durand" },
                    { "slug": "phone_number", "value": "06 12 34 56 78" },
                    { "slug": "objectif", "value": "Perdre 5 kg" },
                    { "slug": "ville", "value": "Lyon" }
                ]
            }
        });
        let (phone, profile) = parse_lead(&payload);
        assert_eq!(phone.as_deref(), Some("06 12 34 56 78"));
        assert_eq!(profile.first_name.as_deref(), Some("Léa"));
        assert_eq!(profile.last_name.as_deref(), Some("Durand"));
        assert_eq!(profile.email.as_deref(), Some("lea@example.com"));
        assert_eq!(profile.goal.as_deref(), Some("Perdre 5 kg"));
        assert_eq!(profile.extra.get("ville").map(String::as_str), Some("Lyon"));
        assert_eq!(profile.extra.get("type").map(String::as_str), Some("contact.created"));
        assert!(!profile.extra.contains_key("id"));
    }

    #[test]
    fn test_parse_top_level_aliases_case_insensitive() {
        let payload = json!({ "Telephone": "+33612345678", "Prenom": "Marc", "Niveau": "débutant" });
        let (phone, profile) = parse_lead(&payload);
        assert_eq!(phone.as_deref(), Some("+33612345678"));
        assert_eq!(profile.first_name.as_deref(), Some("Marc"));
        assert_eq!(profile.level.as_deref(), Some("débutant"));
        assert!(profile.extra.is_empty());
    }

    #[test]
    fn test_parse_form_body() {
        let form = parse_form(b"contact%5Bfields%5D%5Bphone_number%5D=0612345678&first_name=Jean+Pierre&blessures=genou%20gauche");
        let (phone, profile) = parse_lead(&form);
        assert_eq!(phone.as_deref(), Some("0612345678"));
        assert_eq!(profile.first_name.as_deref(), Some("Jean Pierre"));
        assert_eq!(profile.constraints.as_deref(), Some("genou gauche"));
    }

    #[test]
    fn test_empty_alias_falls_through() {
        let (phone, _) = parse_lead(&json!({ "phone": "", "whatsapp": "0612345678" }));
        assert_eq!(phone.as_deref(), Some("0612345678"));
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_wrong_secret_forbidden() {
        let h = Harness::new(MockModel::replying("ok"));
        let app = router(AppState::new(h.coach.clone()));
        let response = app
            .oneshot(post("/systeme-webhook?secret=nope", json!({ "phone": "0612345678" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(h.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_unset_secret_forbidden() {
        let config = crate::config::Config {
            systeme_secret: None,
            ..Harness::config()
        };
        let h = Harness::with_config(config, MockModel::replying("ok"));
        let response = router(AppState::new(h.coach.clone()))
            .oneshot(post("/systeme-webhook?secret=", json!({ "phone": "0612345678" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_phone_is_ok_and_ignored() {
        let h = Harness::new(MockModel::replying("ok"));
        let response = router(AppState::new(h.coach.clone()))
            .oneshot(post("/systeme-webhook?secret=crm-secret", json!({ "email": "x@example.com" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_lead_accepted() {
        let h = Harness::new(MockModel::replying("ok"));
        let response = router(AppState::new(h.coach.clone()))
            .oneshot(post(
                "/systeme-webhook?secret=crm-secret",
                json!({ "contact": { "fields": { "phone_number": "0612345678", "first_name": "Léa" } } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let contact = h.store.get("33612345678").await.unwrap();
        assert_eq!(contact.profile.first_name.as_deref(), Some("Léa"));
    }
}
