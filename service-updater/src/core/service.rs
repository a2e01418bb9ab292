//! Catalog service records as seen by the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A catalog service as stored by the persistence collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Catalog category.
    #[serde(default)]
    pub category: Option<String>,
    /// Long-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Return-on-investment estimate.
    #[serde(default)]
    pub roi: Option<String>,
    /// Typical engagement duration.
    #[serde(default)]
    pub duration: Option<String>,
    /// Search and filter tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Retail price.
    #[serde(default)]
    pub retail_price: Option<f64>,
    /// Billing unit of the retail price.
    #[serde(default)]
    pub price_duration: Option<String>,
    /// Reference to the disclaimer record.
    #[serde(default)]
    pub disclaimer_id: Option<String>,
    /// Sales funnel document.
    #[serde(default)]
    pub funnel_content: Option<serde_json::Value>,
    /// Pricing tiers, ordered by `position`.
    #[serde(default)]
    pub pricing_tiers: Vec<PricingTier>,
    /// Pricing mode.
    #[serde(default)]
    pub pricing_mode: Option<PricingMode>,
    /// Set by verification when every required field is present.
    #[serde(default)]
    pub ai_verified: bool,
}

impl ServiceRecord {
    /// Creates a bare record.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Applies a partial update in place. `None` fields are left untouched.
    pub fn apply(&mut self, update: &ServiceUpdate) {
        if let Some(ref v) = update.description {
            self.description = Some(v.clone());
        }
        if let Some(ref v) = update.roi {
            self.roi = Some(v.clone());
        }
        if let Some(ref v) = update.duration {
            self.duration = Some(v.clone());
        }
        if let Some(ref v) = update.tags {
            self.tags.clone_from(v);
        }
        if let Some(v) = update.retail_price {
            self.retail_price = Some(v);
        }
        if let Some(ref v) = update.price_duration {
            self.price_duration = Some(v.clone());
        }
        if let Some(ref v) = update.disclaimer_id {
            self.disclaimer_id = Some(v.clone());
        }
        if let Some(ref v) = update.funnel_content {
            self.funnel_content = Some(v.clone());
        }
        if let Some(ref v) = update.pricing_tiers {
            self.pricing_tiers.clone_from(v);
        }
        if let Some(v) = update.pricing_mode {
            self.pricing_mode = Some(v);
        }
        if let Some(v) = update.ai_verified {
            self.ai_verified = v;
        }
    }
}

/// Partial field set submitted through the persistence collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceUpdate {
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New ROI estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi: Option<String>,
    /// New engagement duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Replacement tag list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// New retail price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retail_price: Option<f64>,
    /// New billing unit for the retail price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_duration: Option<String>,
    /// New disclaimer reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer_id: Option<String>,
    /// Replacement funnel document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_content: Option<serde_json::Value>,
    /// Replacement pricing tiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_tiers: Option<Vec<PricingTier>>,
    /// New pricing mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_mode: Option<PricingMode>,
    /// Verification outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_verified: Option<bool>,
}

impl ServiceUpdate {
    /// Returns true if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Billing unit of a pricing tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TierDuration {
    /// Billed once.
    #[serde(rename = "one-time")]
    OneTime,
    /// Per hour.
    #[serde(rename = "hour")]
    Hour,
    /// Per day.
    #[serde(rename = "day")]
    Day,
    /// Per week.
    #[serde(rename = "week")]
    Week,
    /// Per month.
    #[default]
    #[serde(rename = "month")]
    Month,
    /// Per year.
    #[serde(rename = "year")]
    Year,
}

impl TierDuration {
    /// Maps free text onto the closed set, `None` if unrecognized.
    #[must_use]
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let cleaned = raw.trim().to_ascii_lowercase();
        let cleaned = cleaned
            .trim_start_matches("per ")
            .trim_start_matches('/')
            .trim();
        let unit = match cleaned {
            "one-time" | "one time" | "one_time" | "onetime" | "once" | "fixed" | "project" => {
                Self::OneTime
            }
            "hour" | "hours" | "hourly" | "hr" | "h" => Self::Hour,
            "day" | "days" | "daily" => Self::Day,
            "week" | "weeks" | "weekly" | "wk" => Self::Week,
            "month" | "months" | "monthly" | "mo" => Self::Month,
            "year" | "years" | "yearly" | "annual" | "annually" | "yr" => Self::Year,
            _ => return None,
        };
        Some(unit)
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneTime => "one-time",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for TierDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pricing tier of a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingTier {
    /// Tier name.
    pub name: String,
    /// Short pitch.
    #[serde(default)]
    pub description: Option<String>,
    /// Numeric price, absent for quote-only tiers.
    #[serde(default)]
    pub price: Option<f64>,
    /// Billing unit.
    #[serde(default)]
    pub duration: TierDuration,
    /// Included features.
    #[serde(default)]
    pub features: Vec<String>,
    /// Zero-based, contiguous.
    #[serde(default)]
    pub position: usize,
    /// Price is only available on request.
    #[serde(default)]
    pub request_pricing: bool,
}

/// How a service is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    /// Let the pipeline detect the mode from the tiers.
    Auto,
    /// Published prices.
    Fixed,
    /// Prices quoted on request.
    CustomQuote,
}

/// A persisted FAQ entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqRecord {
    /// Question text.
    pub question: String,
    /// Answer text.
    pub answer: String,
    /// Zero-based display order.
    pub position: usize,
}
