//! Pricing-tier normalization and pricing-mode detection.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::core::{PricingMode, PricingTier, TierDuration};

fn price_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").ok())
        .as_ref()
}

/// Reads a price from a number or from text such as `"$1,200/mo"`.
///
/// Negative, non-finite and unparseable values yield `None`.
#[must_use]
pub fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let found = price_pattern()?.find(s)?;
            found.as_str().replace(',', "").parse::<f64>().ok()?
        }
        _ => return None,
    };
    (price.is_finite() && price >= 0.0).then_some(price)
}

/// Normalizes generated tiers.
///
/// Non-object entries are dropped, at most `max` tiers are kept, positions are
/// reassigned `0..n`, durations are coerced onto [`TierDuration`] (month when
/// unrecognized) and malformed feature lists become empty. Serializing the
/// output and normalizing it again yields the same tiers.
#[must_use]
pub fn normalize_pricing_tiers(raw: &[Value], max: usize) -> Vec<PricingTier> {
    raw.iter()
        .filter_map(Value::as_object)
        .take(max)
        .enumerate()
        .map(|(position, tier)| PricingTier {
            name: tier
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map_or_else(|| format!("Tier {}", position + 1), str::to_string),
            description: tier
                .get("description")
                .and_then(Value::as_str)
                .filter(|d| !d.trim().is_empty())
                .map(str::to_string),
            price: tier.get("price").and_then(parse_price),
            duration: tier
                .get("duration")
                .and_then(Value::as_str)
                .and_then(TierDuration::parse_loose)
                .unwrap_or_default(),
            features: tier.get("features").map(features).unwrap_or_default(),
            position,
            request_pricing: tier.get("request_pricing").is_some_and(truthy),
        })
        .collect()
}

fn features(value: &Value) -> Vec<String> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Detects the pricing mode from tiers when the current mode allows it.
///
/// Returns `None` when the service already has an explicit fixed or
/// custom-quote mode. Otherwise fixed if any tier has a positive price and is
/// not request-pricing-only, else custom quote.
#[must_use]
pub fn detect_pricing_mode(
    current: Option<PricingMode>,
    tiers: &[PricingTier],
) -> Option<PricingMode> {
    if !matches!(current, None | Some(PricingMode::Auto)) {
        return None;
    }
    let fixed = tiers
        .iter()
        .any(|tier| !tier.request_pricing && tier.price.is_some_and(|p| p > 0.0));
    Some(if fixed {
        PricingMode::Fixed
    } else {
        PricingMode::CustomQuote
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn raw_tiers() -> Vec<Value> {
        vec![
            json!({"name": "Starter", "price": "$1,200", "duration": "Monthly", "features": ["a"], "position": 7}),
            json!("not a tier"),
            json!({"name": "", "price": 0, "duration": "fortnight", "features": "lots"}),
            json!({"name": "Scale", "price": 5000.5, "duration": "per year", "features": ["b", 3]}),
            json!({"name": "Enterprise", "request_pricing": true}),
            json!({"name": "Overflow", "price": 10}),
        ]
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(&json!(99)), Some(99.0));
        assert_eq!(parse_price(&json!("$1,200.50 / month")), Some(1200.5));
        assert_eq!(parse_price(&json!("Contact us")), None);
        assert_eq!(parse_price(&json!(-5)), None);
        assert_eq!(parse_price(&json!(null)), None);
    }

    #[test]
    fn test_normalize_caps_and_positions() {
        let tiers = normalize_pricing_tiers(&raw_tiers(), 4);

        let names: Vec<_> = tiers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Starter", "Tier 2", "Scale", "Enterprise"]);
        let positions: Vec<_> = tiers.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_normalize_coerces_fields() {
        let tiers = normalize_pricing_tiers(&raw_tiers(), 4);

        assert_eq!(tiers[0].price, Some(1200.0));
        assert_eq!(tiers[0].duration, TierDuration::Month);
        assert_eq!(tiers[1].duration, TierDuration::Month);
        assert!(tiers[1].features.is_empty());
        assert_eq!(tiers[2].duration, TierDuration::Year);
        assert!(tiers[2].features.is_empty());
        assert!(tiers[3].request_pricing);
        assert_eq!(tiers[3].price, None);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_pricing_tiers(&raw_tiers(), 4);
        let reserialized: Vec<Value> = once
            .iter()
            .map(|tier| serde_json::to_value(tier).unwrap())
            .collect();
        let twice = normalize_pricing_tiers(&reserialized, 4);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_detect_pricing_mode() {
        let tiers = normalize_pricing_tiers(&raw_tiers(), 4);
        assert_eq!(detect_pricing_mode(None, &tiers), Some(PricingMode::Fixed));
        assert_eq!(
            detect_pricing_mode(Some(PricingMode::Auto), &tiers),
            Some(PricingMode::Fixed)
        );
        assert_eq!(detect_pricing_mode(Some(PricingMode::CustomQuote), &tiers), None);

        let quote_only = normalize_pricing_tiers(
            &[json!({"name": "Ent", "price": 900, "request_pricing": true}), json!({"name": "Free", "price": 0})],
            4,
        );
        assert_eq!(detect_pricing_mode(None, &quote_only), Some(PricingMode::CustomQuote));
    }
}
