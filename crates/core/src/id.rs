//! Strongly-typed identifiers used across the dispatch engine.

use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a job (taken from the source record id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub(crate) String);

/// Partition key: jobs sharing a provider are processed one at a time, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Provider(String);

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Build the identifier, rejecting empty or whitespace-only values.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(DomainError::invalid_id(format!("{}: empty value", $name)));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_newtype!(JobId, "JobId");
impl_string_newtype!(Provider, "Provider");

impl JobId {
    /// Id recorded for a queue message whose body carries no usable id: the
    /// queue's own reference for the message.
    pub fn from_message_ref(reference: impl core::fmt::Display) -> Self {
        let reference = reference.to_string();
        if reference.trim().is_empty() {
            return Self("unidentified".to_string());
        }
        Self(reference)
    }
}

impl Provider {
    /// Provider assigned to records that do not carry one.
    pub fn fallback() -> Self {
        Self("default".to_string())
    }
}

/// Format a business date the way every key in the system does (`YYYY-MM-DD`).
pub fn format_business_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Channel-level deduplication key: `{job id}@{business date}`.
///
/// Two enqueues of the same record on the same day collapse to one message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeduplicationKey(String);

impl DeduplicationKey {
    pub fn for_job(job_id: &JobId, date: NaiveDate) -> Self {
        Self(format!("{}@{}", job_id, format_business_date(date)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DeduplicationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation id forwarded to both downstream services: `{job id}@{business date}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn for_job(job_id: &JobId, date: NaiveDate) -> Self {
        Self(format!("{}@{}", job_id, format_business_date(date)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_ids_are_rejected() {
        assert!(matches!(JobId::new(""), Err(DomainError::InvalidId(_))));
        assert!(matches!(Provider::new("   "), Err(DomainError::InvalidId(_))));
        assert!("job-1".parse::<JobId>().is_ok());
    }

    #[test]
    fn dedup_key_is_id_at_date() {
        let id = JobId::new("rec-7").unwrap();
        let key = DeduplicationKey::for_job(&id, date(2026, 3, 9));
        assert_eq!(key.as_str(), "rec-7@2026-03-09");
    }

    #[test]
    fn dedup_key_changes_with_the_day() {
        let id = JobId::new("rec-7").unwrap();
        let monday = DeduplicationKey::for_job(&id, date(2026, 3, 9));
        let tuesday = DeduplicationKey::for_job(&id, date(2026, 3, 10));
        assert_ne!(monday, tuesday);
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = JobId::new("abc").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let provider: Provider = serde_json::from_str("\"p1\"").unwrap();
        assert_eq!(provider.as_str(), "p1");
    }
}
