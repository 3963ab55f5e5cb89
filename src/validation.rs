use chrono::{Datelike, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::models::info_card::InfoCardDetailInput;
use crate::models::question::{TranslationInput, SUPPORTED_LANGUAGE_IDS};
use crate::models::flat::SUPPORTED_CURRENCIES;

/// Canonical address record produced by `normalize_address`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

/// Copies only the entries whose key is in the allow-list. Values pass
/// through untouched; unknown keys are dropped silently, never rejected.
pub fn filter_allowed(bag: &Map<String, Value>, allowed: &[&str]) -> Map<String, Value> {
    let mut filtered = Map::new();
    for (key, value) in bag {
        if allowed.contains(&key.as_str()) {
            filtered.insert(key.clone(), value.clone());
        }
    }
    filtered
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::String(s)) => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Resolves address data out of an attribute bag, in priority order:
/// a nested `address` object (possibly JSON-encoded as a string, parse
/// failure falls through), then flattened fields under their aliases,
/// then the legacy single `location` string mapped onto `street`.
/// Returns `None` when no address signal exists in any form.
pub fn normalize_address(payload: &Value) -> Option<Address> {
    let obj = payload.as_object()?;

    let nested = match obj.get("address") {
        Some(Value::Object(map)) => Some(map.clone()),
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|v| v.as_object().cloned()),
        _ => None,
    };
    if let Some(map) = nested {
        return Some(Address {
            street: string_field(&map, &["street"]),
            city: string_field(&map, &["city"]),
            state: string_field(&map, &["state"]),
            zip: string_field(&map, &["zip"]),
        });
    }

    let street = string_field(obj, &["street", "address_street", "addr_street"]);
    let city = string_field(obj, &["city", "address_city", "addr_city"]);
    let state = string_field(obj, &["state", "address_state", "addr_state"]);
    let zip = string_field(obj, &["zip", "address_zip", "addr_zip"]);
    if street.is_some() || city.is_some() || state.is_some() || zip.is_some() {
        return Some(Address { street, city, state, zip });
    }

    if let Some(location) = string_field(obj, &["location"]) {
        return Some(Address {
            street: Some(location),
            city: None,
            state: None,
            zip: None,
        });
    }

    None
}

/// Language ids may arrive as JSON numbers or numeric strings.
pub fn coerce_language_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Validates a translation set, collecting every violation: numeric
/// language id, membership in the supported set, no duplicate id within
/// the list (reported at the second occurrence), and non-empty question
/// and answer text.
pub fn validate_translations(translations: &[TranslationInput]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen: Vec<i64> = Vec::new();
    for (index, entry) in translations.iter().enumerate() {
        let n = index + 1;
        let language_id = match entry.language_id.as_ref().and_then(coerce_language_id) {
            Some(id) => id,
            None => {
                errors.push(format!("Translation {}: language id must be numeric", n));
                continue;
            }
        };
        if !SUPPORTED_LANGUAGE_IDS.contains(&language_id) {
            errors.push(format!("Translation {}: unsupported language id {}", n, language_id));
            continue;
        }
        if seen.contains(&language_id) {
            errors.push(format!("Translation {}: duplicate language id {}", n, language_id));
        } else {
            seen.push(language_id);
        }
        if entry.question.as_deref().map_or(true, |s| s.trim().is_empty()) {
            errors.push(format!("Translation {}: question text is required", n));
        }
        if entry.answer.as_deref().map_or(true, |s| s.trim().is_empty()) {
            errors.push(format!("Translation {}: answer text is required", n));
        }
    }
    errors
}

/// Same rules as `validate_translations`, for info-card details: the
/// language id checks are identical, the text requirement is the title.
pub fn validate_details(details: &[InfoCardDetailInput]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen: Vec<i64> = Vec::new();
    for (index, entry) in details.iter().enumerate() {
        let n = index + 1;
        let language_id = match entry.language_id.as_ref().and_then(coerce_language_id) {
            Some(id) => id,
            None => {
                errors.push(format!("Detail {}: language id must be numeric", n));
                continue;
            }
        };
        if !SUPPORTED_LANGUAGE_IDS.contains(&language_id) {
            errors.push(format!("Detail {}: unsupported language id {}", n, language_id));
            continue;
        }
        if seen.contains(&language_id) {
            errors.push(format!("Detail {}: duplicate language id {}", n, language_id));
        } else {
            seen.push(language_id);
        }
        if entry.title.as_deref().map_or(true, |s| s.trim().is_empty()) {
            errors.push(format!("Detail {}: title is required", n));
        }
    }
    errors
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Numbers may arrive as JSON numbers or numeric strings (form fields).
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn coerce_age(value: Option<&Value>) -> Option<f64> {
    value.and_then(coerce_number)
}

/// Validates registration fields, collecting all violations: required
/// presence and types first, then a second pass over the normalized email
/// and the coerced age.
pub fn validate_credentials(body: &Value) -> Vec<String> {
    let obj = match body.as_object() {
        Some(o) => o,
        None => return vec!["Request body must be a JSON object".to_string()],
    };
    let mut errors = Vec::new();

    match obj.get("email") {
        None | Some(Value::Null) => errors.push("Email is required".to_string()),
        Some(Value::String(_)) => {}
        Some(_) => errors.push("Email must be a string".to_string()),
    }
    match obj.get("address") {
        None | Some(Value::Null) => errors.push("Address is required".to_string()),
        Some(Value::String(_)) => {}
        Some(_) => errors.push("Address must be a string".to_string()),
    }
    if matches!(obj.get("age"), None | Some(Value::Null)) {
        errors.push("Age is required".to_string());
    }
    for (key, label) in [("first_name", "First name"), ("last_name", "Last name")] {
        match obj.get(key).and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => {}
            _ => errors.push(format!("{} is required", label)),
        }
    }
    match obj.get("password") {
        None | Some(Value::Null) => errors.push("Password is required".to_string()),
        Some(Value::String(s)) => {
            if s.len() < 6 {
                errors.push("Password must be at least 6 characters".to_string());
            }
        }
        Some(_) => errors.push("Password must be a string".to_string()),
    }

    // second pass over normalized values
    if let Some(raw) = obj.get("email").and_then(|v| v.as_str()) {
        if !email_regex().is_match(&normalize_email(raw)) {
            errors.push("Email is not a valid address".to_string());
        }
    }
    match coerce_age(obj.get("age")) {
        Some(age) => {
            if !(0.0..=150.0).contains(&age) {
                errors.push("Age must be between 0 and 150".to_string());
            }
        }
        None => {
            if obj.get("age").map_or(false, |v| !v.is_null()) {
                errors.push("Age must be a number".to_string());
            }
        }
    }

    errors
}

/// January 1st of (current year − floor(age)), used when registration
/// carries an age but no birth date.
pub fn synthesize_birth_date(age: f64) -> String {
    let year = Utc::now().year() as i64 - age.floor() as i64;
    format!("{:04}-01-01", year)
}

/// Trims and upper-cases a currency code. Absent or empty input yields
/// `Ok(None)` so the caller can fall back to the stored default; anything
/// outside the supported set is rejected.
pub fn normalize_currency(raw: Option<&str>) -> Result<Option<String>, String> {
    let raw = match raw {
        Some(r) => r.trim(),
        None => return Ok(None),
    };
    if raw.is_empty() {
        return Ok(None);
    }
    let upper = raw.to_uppercase();
    if SUPPORTED_CURRENCIES.contains(&upper.as_str()) {
        Ok(Some(upper))
    } else {
        Err(format!(
            "Unsupported currency '{}', expected one of GEL, USD, EUR",
            raw
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn translation(language_id: Value, question: &str, answer: &str) -> TranslationInput {
        TranslationInput {
            language_id: Some(language_id),
            question: Some(question.to_string()),
            answer: Some(answer.to_string()),
        }
    }

    #[test]
    fn filter_allowed_drops_unknown_keys() {
        let bag = json!({
            "first_name": "Nino",
            "age": 30,
            "flat_ids": ["x"],
            "role": "admin"
        });
        let filtered = filter_allowed(bag.as_object().unwrap(), &["first_name", "age"]);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.get("first_name"), Some(&json!("Nino")));
        assert_eq!(filtered.get("age"), Some(&json!(30)));
        assert!(filtered.get("flat_ids").is_none());
        assert!(filtered.get("role").is_none());
    }

    #[test]
    fn address_from_json_encoded_string() {
        let addr = normalize_address(&json!({"address": "{\"street\":\"A\"}"})).unwrap();
        assert_eq!(addr.street.as_deref(), Some("A"));
        assert_eq!(addr.city, None);
        assert_eq!(addr.state, None);
        assert_eq!(addr.zip, None);
    }

    #[test]
    fn address_from_flattened_fields() {
        let addr = normalize_address(&json!({"street": "A"})).unwrap();
        assert_eq!(addr.street.as_deref(), Some("A"));
        assert_eq!(addr.city, None);

        let aliased = normalize_address(&json!({"addr_street": " A ", "address_city": "Tbilisi"}))
            .unwrap();
        assert_eq!(aliased.street.as_deref(), Some("A"));
        assert_eq!(aliased.city.as_deref(), Some("Tbilisi"));
    }

    #[test]
    fn address_from_legacy_location() {
        let addr = normalize_address(&json!({"location": "A"})).unwrap();
        assert_eq!(addr.street.as_deref(), Some("A"));
        assert_eq!(addr.city, None);
        assert_eq!(addr.state, None);
        assert_eq!(addr.zip, None);
    }

    #[test]
    fn address_nested_object_takes_precedence() {
        let addr = normalize_address(&json!({
            "address": {"street": "Nested"},
            "street": "Flattened",
            "location": "Legacy"
        }))
        .unwrap();
        assert_eq!(addr.street.as_deref(), Some("Nested"));
    }

    #[test]
    fn address_unparseable_string_falls_through() {
        let addr = normalize_address(&json!({"address": "not json {", "street": "B"})).unwrap();
        assert_eq!(addr.street.as_deref(), Some("B"));
    }

    #[test]
    fn address_none_when_no_signal() {
        assert_eq!(normalize_address(&json!({"price": 1000})), None);
        assert_eq!(normalize_address(&json!("just a string")), None);
    }

    #[test]
    fn translations_reject_duplicate_language_id() {
        let errors = validate_translations(&[
            translation(json!(1), "q1", "a1"),
            translation(json!("1"), "q2", "a2"),
        ]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("duplicate language id 1"), "{}", errors[0]);
    }

    #[test]
    fn translations_collect_all_violations() {
        let errors = validate_translations(&[
            translation(json!("abc"), "q", "a"),
            translation(json!(9), "q", "a"),
            translation(json!(2), "", "a"),
        ]);
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("must be numeric"));
        assert!(errors[1].contains("unsupported language id 9"));
        assert!(errors[2].contains("question text is required"));
    }

    #[test]
    fn translations_accept_valid_set() {
        let errors = validate_translations(&[
            translation(json!(1), "q", "a"),
            translation(json!(2), "q", "a"),
            translation(json!(3), "q", "a"),
        ]);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn credentials_collect_all_violations() {
        let errors = validate_credentials(&json!({
            "email": "bad",
            "age": 200,
            "password": "short"
        }));
        assert!(errors.iter().any(|e| e.contains("valid address")), "{:?}", errors);
        assert!(errors.iter().any(|e| e.contains("between 0 and 150")), "{:?}", errors);
        assert!(errors.iter().any(|e| e.contains("at least 6")), "{:?}", errors);
        // presence failures are reported in the same batch
        assert!(errors.iter().any(|e| e.contains("First name")), "{:?}", errors);
        assert!(errors.iter().any(|e| e.contains("Address is required")), "{:?}", errors);
    }

    #[test]
    fn credentials_accept_valid_registration() {
        let errors = validate_credentials(&json!({
            "email": " Nino@Example.COM ",
            "address": "Rustaveli Ave 12",
            "age": 30,
            "first_name": "Nino",
            "last_name": "Beridze",
            "password": "secret1"
        }));
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn birth_date_synthesized_from_age() {
        let year = Utc::now().year() as i64 - 30;
        assert_eq!(synthesize_birth_date(30.7), format!("{}-01-01", year));
    }

    #[test]
    fn currency_normalization() {
        assert_eq!(normalize_currency(Some("usd")), Ok(Some("USD".to_string())));
        assert_eq!(normalize_currency(Some(" gel ")), Ok(Some("GEL".to_string())));
        assert_eq!(normalize_currency(Some("")), Ok(None));
        assert_eq!(normalize_currency(None), Ok(None));
        assert!(normalize_currency(Some("BTC")).is_err());
    }
}
