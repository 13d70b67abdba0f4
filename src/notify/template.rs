//! Notification title/body templating (`spec.md` §4.3 "Jinja-style
//! placeholders", §9 "String-keyed feature flags and templated messages").
//!
//! The source renders templates through a general-purpose expression
//! engine; this is deliberately narrower. Only the placeholders in
//! [`PLACEHOLDERS`] are substituted — anything else in `{{ ... }}` is left
//! untouched. There is no expression evaluation, no loops, no filters:
//! this closes the code-execution surface a general templating engine
//! would open for a field that ultimately comes from user-editable YAML.

use chrono::{DateTime, Utc};

use crate::types::Detection;

/// The whitelist of substitutable placeholders.
pub const PLACEHOLDERS: &[&str] = &[
    "common_name",
    "scientific_name",
    "confidence",
    "timestamp",
    "latitude",
    "longitude",
];

/// The detection fields a template may reference.
pub struct NotificationContext {
    pub common_name: String,
    pub scientific_name: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl NotificationContext {
    pub fn from_detection(detection: &Detection) -> Self {
        Self {
            common_name: detection.common_name.clone(),
            scientific_name: detection.scientific_name.clone(),
            confidence: detection.confidence,
            timestamp: detection.timestamp,
            latitude: detection.latitude,
            longitude: detection.longitude,
        }
    }

    fn value_for(&self, placeholder: &str) -> Option<String> {
        match placeholder {
            "common_name" => Some(self.common_name.clone()),
            "scientific_name" => Some(self.scientific_name.clone()),
            "confidence" => Some(format!("{:.2}", self.confidence)),
            "timestamp" => Some(self.timestamp.to_rfc3339()),
            "latitude" => Some(self.latitude.map(|v| v.to_string()).unwrap_or_default()),
            "longitude" => Some(self.longitude.map(|v| v.to_string()).unwrap_or_default()),
            _ => None,
        }
    }
}

/// Replaces every `{{ placeholder }}` occurrence of a whitelisted name
/// with its value from `ctx`. Whitespace inside the braces is tolerated
/// (`{{common_name}}` and `{{ common_name }}` both match). Anything else —
/// an unrecognised placeholder, a malformed `{{` with no matching `}}` —
/// is left in the output verbatim rather than treated as an error; a
/// template is user-editable config, not code that should be able to fail
/// a detection.
pub fn render(template: &str, ctx: &NotificationContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];

        let Some(close) = after_open.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };

        let key = after_open[..close].trim();
        match ctx.value_for(key) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }

        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NotificationContext {
        NotificationContext {
            common_name: "American Robin".to_string(),
            scientific_name: "Turdus migratorius".to_string(),
            confidence: 0.873,
            timestamp: "2026-05-01T12:00:00Z".parse().unwrap(),
            latitude: Some(40.0),
            longitude: Some(-74.0),
        }
    }

    #[test]
    fn substitutes_whitelisted_placeholders() {
        let rendered = render("{{common_name}} ({{scientific_name}}) at {{confidence}}", &ctx());
        assert_eq!(rendered, "American Robin (Turdus migratorius) at 0.87");
    }

    #[test]
    fn tolerates_whitespace_inside_braces() {
        assert_eq!(render("{{ common_name }}", &ctx()), "American Robin");
    }

    #[test]
    fn unknown_placeholders_are_left_untouched() {
        let rendered = render("{{common_name}} saw {{exec('rm -rf /')}}", &ctx());
        assert_eq!(rendered, "American Robin saw {{exec('rm -rf /')}}");
    }

    #[test]
    fn unterminated_braces_are_left_untouched() {
        assert_eq!(render("hello {{common_name", &ctx()), "hello {{common_name");
    }

    #[test]
    fn missing_coordinates_render_as_empty_string() {
        let mut c = ctx();
        c.latitude = None;
        assert_eq!(render("lat={{latitude}}", &c), "lat=");
    }
}
