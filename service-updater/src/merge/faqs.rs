//! FAQ extraction, funnel back-fill and replace-all records.

use serde_json::{json, Value};

use crate::core::FaqRecord;

/// Section titles used positionally when generated FAQs carry none.
pub const DEFAULT_FAQ_TITLES: [&str; 6] = [
    "What is included?",
    "How long does it take?",
    "How much does it cost?",
    "Who is this for?",
    "What do I need to get started?",
    "What support is available?",
];

/// One generated question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaqItem {
    /// Section title, when the generator supplied one.
    pub title: Option<String>,
    /// Question.
    pub question: String,
    /// Answer.
    pub answer: String,
}

/// Reads FAQ items from a `faqs` result.
///
/// Accepts either a bare array or an object with a `faqs` array. Entries
/// without both a question and an answer are dropped.
#[must_use]
pub fn extract_faq_items(output: &Value) -> Vec<FaqItem> {
    let items = match output {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("faqs")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice),
        _ => &[],
    };

    items
        .iter()
        .filter_map(|item| {
            let question = text(item, "question")?;
            let answer = text(item, "answer")?;
            Some(FaqItem {
                title: text(item, "title"),
                question,
                answer,
            })
        })
        .collect()
}

fn text(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Returns true if the funnel already has a non-empty `faq_sections` array.
#[must_use]
pub fn has_faq_sections(funnel: &Value) -> bool {
    funnel
        .get("faq_sections")
        .and_then(Value::as_array)
        .is_some_and(|sections| !sections.is_empty())
}

/// Fills `faq_sections` from `items` unless the funnel has its own.
///
/// Returns true if the funnel was changed. Non-object funnels are left alone.
pub fn backfill_funnel_faqs(funnel: &mut Value, items: &[FaqItem]) -> bool {
    if items.is_empty() || has_faq_sections(funnel) {
        return false;
    }
    let Some(map) = funnel.as_object_mut() else {
        return false;
    };

    let sections = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let title = item
                .title
                .clone()
                .or_else(|| DEFAULT_FAQ_TITLES.get(i).map(|t| (*t).to_string()))
                .unwrap_or_else(|| item.question.clone());
            json!({
                "title": title,
                "question": item.question,
                "answer": item.answer,
            })
        })
        .collect();
    map.insert("faq_sections".to_string(), Value::Array(sections));
    true
}

/// Persisted FAQ rows, in order, capped at `max`.
#[must_use]
pub fn faq_records(items: &[FaqItem], max: usize) -> Vec<FaqRecord> {
    items
        .iter()
        .take(max)
        .enumerate()
        .map(|(position, item)| FaqRecord {
            question: item.question.clone(),
            answer: item.answer.clone(),
            position,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn faq_output(n: usize) -> Value {
        let faqs: Vec<Value> = (0..n)
            .map(|i| json!({"question": format!("Q{i}?"), "answer": format!("A{i}")}))
            .collect();
        json!({ "faqs": faqs })
    }

    #[test]
    fn test_extract_accepts_both_shapes() {
        assert_eq!(extract_faq_items(&faq_output(3)).len(), 3);
        let bare = json!([{"question": "Q?", "answer": "A", "title": "Scope"}, {"question": "no answer"}]);
        let items = extract_faq_items(&bare);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Scope"));
        assert!(extract_faq_items(&json!("text")).is_empty());
    }

    #[test]
    fn test_backfill_uses_default_titles_positionally() {
        let mut funnel = json!({"headline": "Grow"});
        let items = extract_faq_items(&faq_output(2));

        assert!(backfill_funnel_faqs(&mut funnel, &items));
        let sections = funnel["faq_sections"].as_array().unwrap();
        assert_eq!(sections[0]["title"], DEFAULT_FAQ_TITLES[0]);
        assert_eq!(sections[1]["title"], DEFAULT_FAQ_TITLES[1]);
        assert_eq!(sections[1]["answer"], "A1");
    }

    #[test]
    fn test_backfill_keeps_existing_sections() {
        let mut funnel = json!({"faq_sections": [{"title": "Own", "question": "Q", "answer": "A"}]});
        let before = funnel.clone();

        assert!(!backfill_funnel_faqs(&mut funnel, &extract_faq_items(&faq_output(2))));
        assert_eq!(funnel, before);
    }

    #[test]
    fn test_backfill_past_default_titles_uses_question() {
        let mut funnel = json!({});
        backfill_funnel_faqs(&mut funnel, &extract_faq_items(&faq_output(8)));
        assert_eq!(funnel["faq_sections"][7]["title"], "Q7?");
    }

    #[test]
    fn test_faq_records_capped_and_ordered() {
        let records = faq_records(&extract_faq_items(&faq_output(12)), 10);
        assert_eq!(records.len(), 10);
        assert_eq!(records[0].question, "Q0?");
        assert_eq!(records[9].position, 9);
    }
}
