//! Prompt construction and tolerant parsing of post analyses.
//!
//! Models wrap JSON in prose or code fences, misspell enum values and return
//! product lists in several shapes. The parser accepts all of those and only
//! fails when no JSON object can be found at all.

use serde_json::Value;
use vibe_common::{PostAnalysis, ProductMention, Sentiment};

use crate::traits::LlmError;

const MAX_PROMPT_CHARS: usize = 4000;

pub fn analysis_prompt(text: &str, categories: &[String]) -> String {
    let body: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    let category_list = if categories.is_empty() {
        "(none)".to_string()
    } else {
        categories.join(", ")
    };

    format!(
        r#"POST:
"""
{body}
"""

AVAILABLE CATEGORIES: {category_list}

Respond with ONLY this JSON object:
{{
  "sentiment": "positive|negative|neutral|mixed",
  "confidence": 0.0,
  "products": [
    {{"name": "product", "sentiment": "positive|negative|neutral|mixed", "confidence": 0.0, "context": "short quote"}}
  ],
  "categories": ["one or more of the available categories"],
  "explanation": "one sentence"
}}"#
    )
}

/// Parse a model reply into a [`PostAnalysis`].
pub fn parse_analysis(raw: &str, model: Option<String>) -> Result<PostAnalysis, LlmError> {
    let value = extract_json_object(raw)?;

    let sentiment = value
        .get("sentiment")
        .and_then(Value::as_str)
        .map(lenient_sentiment)
        .unwrap_or(Sentiment::Neutral);
    let confidence = value.get("confidence").and_then(as_score).unwrap_or(0.0);

    let products = value
        .get("products")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(product_from_value).collect())
        .unwrap_or_default();

    let mut categories: Vec<String> = value
        .get("categories")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();
    categories.sort();
    categories.dedup();

    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(PostAnalysis {
        sentiment,
        confidence,
        products,
        categories,
        explanation,
        model,
    })
}

fn extract_json_object(raw: &str) -> Result<Value, LlmError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if s < e => &raw[s..=e],
        _ => return Err(LlmError::Parse(format!("no JSON object in: {}", snippet(raw)))),
    };
    let value: Value = serde_json::from_str(slice)
        .map_err(|e| LlmError::Parse(format!("{e} in: {}", snippet(raw))))?;
    if !value.is_object() {
        return Err(LlmError::Parse("top-level value is not an object".into()));
    }
    Ok(value)
}

/// Unknown labels become neutral rather than failing the whole analysis.
fn lenient_sentiment(raw: &str) -> Sentiment {
    let lower = raw.trim().to_ascii_lowercase();
    if let Ok(s) = lower.parse() {
        return s;
    }
    match lower.as_str() {
        "pos" | "good" | "favorable" => Sentiment::Positive,
        "neg" | "bad" | "unfavorable" => Sentiment::Negative,
        "mix" | "both" => Sentiment::Mixed,
        _ => Sentiment::Neutral,
    }
}

fn as_score(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then(|| n.clamp(0.0, 1.0))
}

fn product_from_value(v: &Value) -> Option<ProductMention> {
    match v {
        Value::String(name) if !name.trim().is_empty() => Some(ProductMention {
            name: name.trim().to_string(),
            sentiment: None,
            confidence: None,
            context: None,
        }),
        Value::Object(obj) => {
            let name = obj
                .get("name")
                .or_else(|| obj.get("product"))
                .and_then(Value::as_str)?
                .trim();
            if name.is_empty() {
                return None;
            }
            Some(ProductMention {
                name: name.to_string(),
                sentiment: obj.get("sentiment").and_then(Value::as_str).map(lenient_sentiment),
                confidence: obj.get("confidence").and_then(as_score),
                context: obj
                    .get("context")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        }
        _ => None,
    }
}

fn snippet(raw: &str) -> String {
    raw.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_reply_with_mixed_product_shapes() {
        let raw = r#"Sure! Here you go:
```json
{"sentiment": "Negative", "confidence": "0.85",
 "products": ["Cursor", {"name": "VS Code", "sentiment": "pos", "confidence": 1.4}],
 "categories": ["vscode", " bugs ", "vscode"],
 "explanation": "Complains about crashes."}
```"#;
        let a = parse_analysis(raw, Some("gpt-4o-mini".into())).unwrap();
        assert_eq!(a.sentiment, Sentiment::Negative);
        assert!((a.confidence - 0.85).abs() < 1e-9);
        assert_eq!(a.products.len(), 2);
        assert_eq!(a.products[0].name, "Cursor");
        assert_eq!(a.products[1].sentiment, Some(Sentiment::Positive));
        assert_eq!(a.products[1].confidence, Some(1.0));
        assert_eq!(a.categories, vec!["bugs".to_string(), "vscode".to_string()]);
        assert_eq!(a.model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn missing_fields_fall_back_to_neutral_and_zero_confidence() {
        let a = parse_analysis(r#"{"sentiment": "ecstatic"}"#, None).unwrap();
        assert_eq!(a.sentiment, Sentiment::Neutral);
        assert_eq!(a.confidence, 0.0);
        assert!(a.products.is_empty());
        assert!(a.categories.is_empty());
    }

    #[test]
    fn prose_without_json_is_an_error() {
        assert!(matches!(
            parse_analysis("I cannot help with that.", None),
            Err(LlmError::Parse(_))
        ));
        assert!(parse_analysis("} backwards {", None).is_err());
    }

    #[test]
    fn prompt_lists_categories_and_truncates_body() {
        let long = "a".repeat(MAX_PROMPT_CHARS + 50);
        let prompt = analysis_prompt(&long, &["vscode".into(), "webdev".into()]);
        assert!(prompt.contains("AVAILABLE CATEGORIES: vscode, webdev"));
        assert!(!prompt.contains(&"a".repeat(MAX_PROMPT_CHARS + 1)));
        assert!(analysis_prompt("hi", &[]).contains("(none)"));
    }
}
