//! Deterministic merge of stage outputs into one persistence write.
//!
//! Each rule is a pure function over generated JSON and the current record:
//! details fields are copied only when present, the funnel's FAQ sections are
//! back-filled from the `faqs` result, pricing tiers are normalized, the
//! pricing mode is detected, and FAQ rows are produced for a replace-all write.

mod faqs;
mod pricing;

pub use faqs::{
    backfill_funnel_faqs, extract_faq_items, faq_records, has_faq_sections, FaqItem,
    DEFAULT_FAQ_TITLES,
};
pub use pricing::{detect_pricing_mode, normalize_pricing_tiers, parse_price};

use serde_json::Value;

use crate::config::UpdaterConfig;
use crate::core::{FaqRecord, ServiceRecord, ServiceUpdate};

/// Outputs of the generation stages for one entity. A failed stage is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutputs {
    /// `details` result.
    pub details: Option<Value>,
    /// `disclaimer` result.
    pub disclaimer: Option<Value>,
    /// `funnel` result.
    pub funnel: Option<Value>,
    /// `faqs` result.
    pub faqs: Option<Value>,
}

/// Caps applied by the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeLimits {
    /// Maximum pricing tiers kept.
    pub max_pricing_tiers: usize,
    /// Maximum FAQ rows persisted.
    pub max_faqs: usize,
}

impl Default for MergeLimits {
    fn default() -> Self {
        Self {
            max_pricing_tiers: 4,
            max_faqs: 10,
        }
    }
}

impl From<&UpdaterConfig> for MergeLimits {
    fn from(config: &UpdaterConfig) -> Self {
        Self {
            max_pricing_tiers: config.max_pricing_tiers,
            max_faqs: config.max_faqs,
        }
    }
}

/// What to write for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    /// Partial field update, submitted as one write.
    pub update: ServiceUpdate,
    /// FAQ rows replacing all existing ones; `None` leaves them untouched.
    pub faqs: Option<Vec<FaqRecord>>,
}

/// Builds the persistence write for `existing` from the stage outputs.
#[must_use]
pub fn plan_merge(existing: &ServiceRecord, outputs: &StageOutputs, limits: MergeLimits) -> MergePlan {
    let mut update = ServiceUpdate::default();

    if let Some(details) = &outputs.details {
        copy_details(details, &mut update, limits);
    }

    if let Some(disclaimer) = &outputs.disclaimer {
        update.disclaimer_id = string_field(disclaimer, "disclaimer_id")
            .or_else(|| string_field(disclaimer, "id"));
    }

    let faq_items = outputs
        .faqs
        .as_ref()
        .map(extract_faq_items)
        .unwrap_or_default();

    if let Some(funnel) = &outputs.funnel {
        let mut funnel = funnel.clone();
        backfill_funnel_faqs(&mut funnel, &faq_items);
        update.funnel_content = Some(funnel);
    }

    if let Some(tiers) = &update.pricing_tiers {
        update.pricing_mode = detect_pricing_mode(existing.pricing_mode, tiers);
    }

    let faqs = (!faq_items.is_empty()).then(|| faq_records(&faq_items, limits.max_faqs));

    MergePlan { update, faqs }
}

fn copy_details(details: &Value, update: &mut ServiceUpdate, limits: MergeLimits) {
    update.description = string_field(details, "description");
    update.roi = string_field(details, "roi");
    update.duration = string_field(details, "duration");
    update.price_duration = string_field(details, "price_duration");
    update.retail_price = details.get("retail_price").and_then(parse_price);

    update.tags = details
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|tags| !tags.is_empty());

    update.pricing_tiers = details
        .get("pricing_tiers")
        .and_then(Value::as_array)
        .map(|raw| normalize_pricing_tiers(raw, limits.max_pricing_tiers))
        .filter(|tiers| !tiers.is_empty());
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
