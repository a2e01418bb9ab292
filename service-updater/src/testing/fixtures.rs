//! Service records and generated content for tests.

use serde_json::{json, Value};

use crate::core::{EntityRef, PricingMode, PricingTier, ServiceRecord, StageName, TierDuration};

/// Entity references named after their ids.
#[must_use]
pub fn entity_refs(ids: &[&str]) -> Vec<EntityRef> {
    ids.iter()
        .map(|id| EntityRef::new(*id, format!("Service {id}")))
        .collect()
}

/// A record with only an id and a name.
#[must_use]
pub fn bare_service(id: &str) -> ServiceRecord {
    ServiceRecord::new(id, format!("Service {id}"))
}

/// A record with every required field filled in.
#[must_use]
pub fn complete_service_record(id: &str) -> ServiceRecord {
    ServiceRecord {
        category: Some("Finance".to_string()),
        description: Some("Monthly bookkeeping and reconciliation".to_string()),
        roi: Some("Saves 10 hours a month".to_string()),
        duration: Some("Ongoing".to_string()),
        tags: vec!["bookkeeping".to_string(), "finance".to_string()],
        retail_price: Some(450.0),
        price_duration: Some("month".to_string()),
        disclaimer_id: Some(format!("disc-{id}")),
        funnel_content: Some(json!({"headline": "Books closed on time"})),
        pricing_tiers: vec![PricingTier {
            name: "Standard".to_string(),
            description: None,
            price: Some(450.0),
            duration: TierDuration::Month,
            features: vec!["Monthly close".to_string()],
            position: 0,
            request_pricing: false,
        }],
        pricing_mode: Some(PricingMode::Fixed),
        ..bare_service(id)
    }
}

/// Content a well-behaved generator returns for `stage`. Merged together the
/// outputs fill every required field.
#[must_use]
pub fn default_stage_content(stage: StageName) -> Value {
    match stage {
        StageName::Research => json!({
            "summary": "Small firms outsource bookkeeping to cut admin time",
            "competitors": ["Acme Books", "LedgerPro"]
        }),
        StageName::Details => json!({
            "description": "Monthly bookkeeping and reconciliation",
            "roi": "Saves 10 hours a month",
            "duration": "Ongoing",
            "tags": ["bookkeeping", "finance"],
            "retail_price": "$450",
            "price_duration": "month",
            "pricing_tiers": [
                {"name": "Starter", "price": 450, "duration": "monthly", "features": ["Monthly close"]},
                {"name": "Growth", "price": "$900", "duration": "month", "features": ["Monthly close", "Payroll"]},
                {"name": "Enterprise", "request_pricing": true, "features": ["Dedicated accountant"]}
            ]
        }),
        StageName::Disclaimer => json!({
            "disclaimer_id": "disc-standard",
            "text": "Results vary by business."
        }),
        StageName::Funnel => json!({
            "headline": "Books closed on time, every month",
            "steps": ["Book a call", "Connect your bank", "Relax"]
        }),
        StageName::Faqs => json!({"faqs": [
            {"question": "Which software do you use?", "answer": "Whatever you already use."},
            {"question": "How fast is onboarding?", "answer": "About a week."},
            {"question": "Can I cancel?", "answer": "Any time."}
        ]}),
        StageName::Verification => json!({"checked": true}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{plan_merge, MergeLimits, StageOutputs};
    use crate::pipeline::check_completeness;

    #[test]
    fn test_default_content_merges_into_complete_record() {
        let mut record = bare_service("svc-1");
        let outputs = StageOutputs {
            details: Some(default_stage_content(StageName::Details)),
            disclaimer: Some(default_stage_content(StageName::Disclaimer)),
            funnel: Some(default_stage_content(StageName::Funnel)),
            faqs: Some(default_stage_content(StageName::Faqs)),
        };
        record.apply(&plan_merge(&record.clone(), &outputs, MergeLimits::default()).update);

        assert!(check_completeness(&record).verified);
        assert!(check_completeness(&complete_service_record("svc-2")).verified);
        assert!(!check_completeness(&bare_service("svc-3")).verified);
    }
}
