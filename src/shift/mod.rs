//! Shift records and their identity.
//!
//! A [`Shift`] is what clients submit. A [`ScheduledShift`] is what the
//! external scheduling API reports back. The two are compared on their
//! [`ShiftKey`]: company, user, start and end. The `action` field and any
//! extra fields the scheduling API attaches do not take part in matching.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// A shift submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    /// Company the shift belongs to.
    pub company_id: String,
    /// User working the shift. Also the sharding key.
    pub user_id: String,
    /// Shift start, as sent by the client.
    pub start_time: String,
    /// Shift end, as sent by the client.
    pub end_time: String,
    /// Free-form action tag forwarded to the scheduling API.
    #[serde(default)]
    pub action: String,
}

impl Shift {
    /// Create a new shift.
    pub fn new(
        company_id: impl Into<String>,
        user_id: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            company_id: company_id.into(),
            user_id: user_id.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            action: action.into(),
        }
    }

    /// Borrow the identity of this shift.
    pub fn key(&self) -> ShiftKey<'_> {
        ShiftKey {
            company_id: &self.company_id,
            user_id: &self.user_id,
            start_time: &self.start_time,
            end_time: &self.end_time,
        }
    }

    /// Check that the shift is well formed.
    ///
    /// Times are opaque strings to the scheduling API, so only RFC 3339
    /// values are ordered; anything else passes through untouched.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("companyId", &self.company_id),
            ("userId", &self.user_id),
            ("startTime", &self.start_time),
            ("endTime", &self.end_time),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(field.to_string()));
            }
        }

        if let (Ok(start), Ok(end)) = (
            DateTime::parse_from_rfc3339(&self.start_time),
            DateTime::parse_from_rfc3339(&self.end_time),
        ) {
            if end <= start {
                return Err(ValidationError::InvalidTimeRange {
                    start: self.start_time.clone(),
                    end: self.end_time.clone(),
                });
            }
        }

        Ok(())
    }
}

/// The fields that identify a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShiftKey<'a> {
    pub company_id: &'a str,
    pub user_id: &'a str,
    pub start_time: &'a str,
    pub end_time: &'a str,
}

/// A shift as reported by the scheduling API.
///
/// The entry is kept exactly as received so the listing can be echoed back to
/// clients unchanged. Key fields only take part in matching when they are
/// strings; an entry with a missing or non-string key field matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduledShift {
    fields: Map<String, Value>,
}

impl ScheduledShift {
    /// Wrap a raw listing entry.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// The entry as received.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// A single field of the entry.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Borrow the identity of this scheduled shift, if every key field is a
    /// string.
    pub fn key(&self) -> Option<ShiftKey<'_>> {
        Some(ShiftKey {
            company_id: self.text("companyId")?,
            user_id: self.text("userId")?,
            start_time: self.text("startTime")?,
            end_time: self.text("endTime")?,
        })
    }

    /// Whether this entry is the scheduled counterpart of `shift`.
    pub fn matches(&self, shift: &Shift) -> bool {
        self.key() == Some(shift.key())
    }
}

impl From<&Shift> for ScheduledShift {
    fn from(shift: &Shift) -> Self {
        let mut fields = Map::new();
        for (name, value) in [
            ("companyId", &shift.company_id),
            ("userId", &shift.user_id),
            ("startTime", &shift.start_time),
            ("endTime", &shift.end_time),
            ("action", &shift.action),
        ] {
            fields.insert(name.to_string(), Value::String(value.clone()));
        }
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Shift {
        Shift::new(
            "acme",
            "user-1",
            "2024-05-01T09:00:00Z",
            "2024-05-01T17:00:00Z",
            "create",
        )
    }

    #[test]
    fn test_shift_json_uses_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["companyId"], "acme");
        assert_eq!(json["userId"], "user-1");
        assert_eq!(json["startTime"], "2024-05-01T09:00:00Z");
        assert_eq!(json["endTime"], "2024-05-01T17:00:00Z");
        assert_eq!(json["action"], "create");
    }

    #[test]
    fn test_matches_ignores_action_and_extra_fields() {
        let shift = sample();
        let scheduled: ScheduledShift = serde_json::from_value(serde_json::json!({
            "companyId": "acme",
            "userId": "user-1",
            "startTime": "2024-05-01T09:00:00Z",
            "endTime": "2024-05-01T17:00:00Z",
            "action": "delete",
            "id": 42
        }))
        .unwrap();

        assert!(scheduled.matches(&shift));
        assert_eq!(scheduled.get("id"), Some(&serde_json::json!(42)));
    }

    #[test]
    fn test_matches_requires_every_key_field() {
        let shift = sample();
        let scheduled = ScheduledShift::from(&shift);
        assert!(scheduled.matches(&shift));

        let mut fields = scheduled.fields().clone();
        fields.insert("endTime".to_string(), serde_json::json!("2024-05-01T18:00:00Z"));
        assert!(!ScheduledShift::from_fields(fields).matches(&shift));
    }

    #[test]
    fn test_scheduled_shift_tolerates_missing_fields() {
        let raw = serde_json::json!({ "userId": "user-1" });
        let scheduled: ScheduledShift = serde_json::from_value(raw.clone()).unwrap();
        assert!(scheduled.key().is_none());
        assert!(!scheduled.matches(&sample()));
        assert_eq!(serde_json::to_value(&scheduled).unwrap(), raw);
    }

    #[test]
    fn test_non_string_key_fields_match_nothing() {
        let raw = serde_json::json!({
            "companyId": "acme",
            "userId": 42,
            "startTime": null,
            "endTime": "2024-05-01T17:00:00Z"
        });
        let scheduled: ScheduledShift = serde_json::from_value(raw.clone()).unwrap();
        assert!(scheduled.key().is_none());
        assert!(!scheduled.matches(&sample()));
        assert_eq!(serde_json::to_value(&scheduled).unwrap(), raw);
    }

    #[test]
    fn test_extra_fields_survive_echo() {
        let raw = serde_json::json!({
            "companyId": "acme",
            "userId": "user-1",
            "startTime": "a",
            "endTime": "b",
            "note": "night"
        });
        let scheduled: ScheduledShift = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&scheduled).unwrap(), raw);
    }

    #[test]
    fn test_validate_accepts_well_formed_shift() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_user() {
        let mut shift = sample();
        shift.user_id = "  ".to_string();
        let err = shift.validate().unwrap_err();
        assert!(err.to_string().contains("userId"));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut shift = sample();
        shift.end_time = "2024-05-01T08:00:00Z".to_string();
        assert!(matches!(
            shift.validate(),
            Err(ValidationError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn test_validate_passes_opaque_times_through() {
        let shift = Shift::new("acme", "user-1", "morning", "evening", "create");
        assert!(shift.validate().is_ok());
    }
}
