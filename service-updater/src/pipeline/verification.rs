//! Completeness check run last for every entity.
//!
//! Missing fields are not an error: the entity is simply left unverified.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::core::{ServiceRecord, ServiceUpdate};
use crate::errors::PersistenceError;
use crate::ports::{PersistenceService, UpdateOptions};

/// A field that must be non-empty for a service to be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    /// Long-form description.
    Description,
    /// ROI estimate.
    Roi,
    /// Engagement duration.
    Duration,
    /// At least one tag.
    Tags,
    /// Retail price.
    RetailPrice,
    /// Billing unit of the retail price.
    PriceDuration,
    /// Disclaimer reference.
    Disclaimer,
    /// Funnel document.
    FunnelContent,
    /// At least one pricing tier.
    PricingTiers,
}

impl RequiredField {
    /// Every required field.
    pub const ALL: [Self; 9] = [
        Self::Description,
        Self::Roi,
        Self::Duration,
        Self::Tags,
        Self::RetailPrice,
        Self::PriceDuration,
        Self::Disclaimer,
        Self::FunnelContent,
        Self::PricingTiers,
    ];

    /// Field name as persisted.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Roi => "roi",
            Self::Duration => "duration",
            Self::Tags => "tags",
            Self::RetailPrice => "retail_price",
            Self::PriceDuration => "price_duration",
            Self::Disclaimer => "disclaimer_id",
            Self::FunnelContent => "funnel_content",
            Self::PricingTiers => "pricing_tiers",
        }
    }

    /// Returns true if `record` has a non-empty value for this field.
    #[must_use]
    pub fn is_present(&self, record: &ServiceRecord) -> bool {
        match self {
            Self::Description => filled(record.description.as_deref()),
            Self::Roi => filled(record.roi.as_deref()),
            Self::Duration => filled(record.duration.as_deref()),
            Self::Tags => record.tags.iter().any(|t| !t.trim().is_empty()),
            Self::RetailPrice => record.retail_price.is_some_and(f64::is_finite),
            Self::PriceDuration => filled(record.price_duration.as_deref()),
            Self::Disclaimer => filled(record.disclaimer_id.as_deref()),
            Self::FunnelContent => record.funnel_content.as_ref().is_some_and(|funnel| {
                match funnel {
                    serde_json::Value::Null => false,
                    serde_json::Value::Object(map) => !map.is_empty(),
                    serde_json::Value::Array(items) => !items.is_empty(),
                    serde_json::Value::String(s) => !s.trim().is_empty(),
                    _ => true,
                }
            }),
            Self::PricingTiers => !record.pricing_tiers.is_empty(),
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn filled(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Result of a completeness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Every required field is present.
    pub verified: bool,
    /// Fields that are missing.
    pub missing: Vec<RequiredField>,
}

/// Checks the nine required fields.
#[must_use]
pub fn check_completeness(record: &ServiceRecord) -> VerificationReport {
    let missing: Vec<_> = RequiredField::ALL
        .into_iter()
        .filter(|field| !field.is_present(record))
        .collect();
    VerificationReport {
        verified: missing.is_empty(),
        missing,
    }
}

/// Loads the persisted entity, checks it and writes the verified flag when it
/// changed.
pub async fn verify_entity(
    persistence: &dyn PersistenceService,
    entity_id: &str,
    options: UpdateOptions,
) -> Result<VerificationReport, PersistenceError> {
    let record = persistence.fetch_entity(entity_id).await?;
    let report = check_completeness(&record);

    if record.ai_verified != report.verified {
        let update = ServiceUpdate {
            ai_verified: Some(report.verified),
            ..ServiceUpdate::default()
        };
        persistence.update_entity(entity_id, &update, options).await?;
    }

    if report.verified {
        info!(entity_id = %entity_id, "Service verified");
    } else {
        let missing: Vec<_> = report.missing.iter().map(RequiredField::as_str).collect();
        debug!(entity_id = %entity_id, missing = ?missing, "Service incomplete");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockPersistenceService;
    use crate::testing::complete_service_record;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_complete_record_verifies() {
        let report = check_completeness(&complete_service_record("svc-1"));
        assert!(report.verified);
        assert!(report.missing.is_empty());
    }

    #[test]
    fn test_missing_only_pricing_tiers() {
        let mut record = complete_service_record("svc-1");
        record.pricing_tiers.clear();

        let report = check_completeness(&record);
        assert!(!report.verified);
        assert_eq!(report.missing, vec![RequiredField::PricingTiers]);
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let mut record = complete_service_record("svc-1");
        record.description = Some("   ".to_string());
        record.tags = vec![String::new()];
        record.funnel_content = Some(serde_json::json!({}));

        let report = check_completeness(&record);
        assert_eq!(
            report.missing,
            vec![
                RequiredField::Description,
                RequiredField::Tags,
                RequiredField::FunnelContent
            ]
        );
    }

    #[tokio::test]
    async fn test_verify_writes_flag_only_on_change() {
        let mut persistence = MockPersistenceService::new();
        persistence
            .expect_fetch_entity()
            .returning(|id| Ok(complete_service_record(id)));
        persistence
            .expect_update_entity()
            .withf(|id, update, _| id == "svc-1" && update.ai_verified == Some(true))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let report = verify_entity(&persistence, "svc-1", UpdateOptions { retry_attempts: 2 })
            .await
            .unwrap();
        assert!(report.verified);
    }

    #[tokio::test]
    async fn test_verify_skips_write_when_unchanged() {
        let mut persistence = MockPersistenceService::new();
        persistence.expect_fetch_entity().returning(|id| {
            let mut record = complete_service_record(id);
            record.ai_verified = true;
            Ok(record)
        });
        persistence.expect_update_entity().never();

        let report = verify_entity(&persistence, "svc-1", UpdateOptions { retry_attempts: 2 })
            .await
            .unwrap();
        assert!(report.verified);
    }
}
