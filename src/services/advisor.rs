//! Advisory text generator.
//!
//! Takes a financial/occupancy snapshot and asks a Gemini model for a
//! short free-text recommendation. Purely advisory: any failure degrades
//! to a static fallback message and never surfaces as a core error or
//! affects state.

use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::AppConfig;

pub const FALLBACK_ANALYSIS: &str =
    "We could not analyze your portfolio right now. Please try again later.";

#[derive(Debug, Clone)]
pub struct FinancialSnapshot {
    pub collected_income: Decimal,
    pub total_expenses: Decimal,
    pub occupancy_rate: f64,
    pub overdue_amount: Decimal,
}

pub async fn generate_analysis(
    http_client: &reqwest::Client,
    config: &AppConfig,
    snapshot: &FinancialSnapshot,
) -> String {
    let Some(api_key) = config.gemini_api_key.as_deref() else {
        return FALLBACK_ANALYSIS.to_string();
    };

    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
        config.gemini_model, api_key
    );
    let payload = json!({
        "contents": [{ "parts": [{ "text": build_prompt(snapshot) }] }]
    });

    let response = match http_client.post(&url).json(&payload).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Advisor request failed: {e}");
            return FALLBACK_ANALYSIS.to_string();
        }
    };

    if !response.status().is_success() {
        warn!(status = %response.status(), "Advisor request rejected");
        return FALLBACK_ANALYSIS.to_string();
    }

    let body = match response.json::<Value>().await {
        Ok(body) => body,
        Err(e) => {
            warn!("Advisor response was not valid JSON: {e}");
            return FALLBACK_ANALYSIS.to_string();
        }
    };

    extract_text(&body).unwrap_or_else(|| {
        warn!("Advisor response had no candidate text");
        FALLBACK_ANALYSIS.to_string()
    })
}

fn build_prompt(snapshot: &FinancialSnapshot) -> String {
    format!(
        "As a property management expert, analyze the following portfolio \
         figures and give brief recommendations to improve financial \
         performance:\n\
         - Collected income: {}\n\
         - Total expenses: {}\n\
         - Occupancy rate: {:.1}%\n\
         - Overdue payments: {}\n\n\
         Keep the recommendations concise and actionable.",
        snapshot.collected_income,
        snapshot.total_expenses,
        snapshot.occupancy_rate,
        snapshot.overdue_amount
    )
}

fn extract_text(body: &Value) -> Option<String> {
    let text = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()?
        .trim();
    if text.is_empty() {
        return None;
    }
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::{build_prompt, extract_text, FinancialSnapshot};
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn prompt_carries_the_snapshot() {
        let prompt = build_prompt(&FinancialSnapshot {
            collected_income: dec!(12000),
            total_expenses: dec!(3000),
            occupancy_rate: 87.5,
            overdue_amount: dec!(450),
        });
        assert!(prompt.contains("12000"));
        assert!(prompt.contains("3000"));
        assert!(prompt.contains("87.5%"));
        assert!(prompt.contains("450"));
    }

    #[test]
    fn extracts_candidate_text() {
        let body = json!({
            "candidates": [
                { "content": { "parts": [{ "text": "Raise rents modestly." }] } }
            ]
        });
        assert_eq!(
            extract_text(&body).as_deref(),
            Some("Raise rents modestly.")
        );
        assert_eq!(extract_text(&json!({})), None);
        assert_eq!(
            extract_text(&json!({"candidates": [{"content": {"parts": [{"text": "  "}]}}]})),
            None
        );
    }
}
