//! Lenient parsing of request fields.
//!
//! Requests carry dates and references as loose strings and numbers.
//! Blank or unparseable dates become `None` rather than failing the
//! request; a zero user reference means "unassigned".

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job::UserId;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A request field that is present but not acceptable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for {field}: {value:?}")]
pub struct FieldError {
    pub field: &'static str,
    pub value: String,
}

/// `YYYY-MM-DD`, or `None`
pub fn date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// `YYYY-MM-DDTHH:MM:SS`, falling back to a bare date at midnight
pub fn date_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT)
        .ok()
        .or_else(|| date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Non-blank text, kept as given
pub fn text(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Zero and negative ids are "not assigned"
pub fn user_ref(id: Option<UserId>) -> Option<UserId> {
    id.filter(|&id| id > 0)
}

/// Container sizes accepted at stage 1 and stage 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerSize {
    #[serde(rename = "20")]
    Twenty,
    #[serde(rename = "40")]
    Forty,
    #[serde(rename = "LCL")]
    Lcl,
}

impl ContainerSize {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Twenty => "20",
            Self::Forty => "40",
            Self::Lcl => "LCL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "20" => Some(Self::Twenty),
            "40" => Some(Self::Forty),
            "LCL" | "lcl" => Some(Self::Lcl),
            _ => None,
        }
    }

    /// Blank is `Ok(None)`; anything else must be a known size
    pub fn from_field(field: &'static str, s: &str) -> Result<Option<Self>, FieldError> {
        if s.trim().is_empty() {
            return Ok(None);
        }
        Self::parse(s).map(Some).ok_or_else(|| FieldError {
            field,
            value: s.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_parsing() {
        assert_eq!(date("2024-03-15"), NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(date(""), None);
        assert_eq!(date("15/03/2024"), None);
    }

    #[test]
    fn test_date_time_falls_back_to_date() {
        let full = date_time("2024-03-15T10:30:00").unwrap();
        assert_eq!(full.format(DATE_TIME_FORMAT).to_string(), "2024-03-15T10:30:00");

        let midnight = date_time("2024-03-15").unwrap();
        assert_eq!(midnight.format(DATE_TIME_FORMAT).to_string(), "2024-03-15T00:00:00");

        assert_eq!(date_time("soon"), None);
    }

    #[test]
    fn test_zero_user_ref_is_unassigned() {
        assert_eq!(user_ref(Some(0)), None);
        assert_eq!(user_ref(None), None);
        assert_eq!(user_ref(Some(4)), Some(4));
    }

    #[test]
    fn test_container_size_field() {
        assert_eq!(ContainerSize::from_field("size", ""), Ok(None));
        assert_eq!(ContainerSize::from_field("size", "40"), Ok(Some(ContainerSize::Forty)));
        assert!(ContainerSize::from_field("size", "45").is_err());
    }
}
