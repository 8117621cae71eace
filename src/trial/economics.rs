use serde::{ Deserialize, Serialize };
use serde_json::Value;

use super::DAILY_COST;

const DEFAULT_DURATION_WEEKS: f64 = 52.0;
/// Share of the original duration an AI-assisted design is assumed to need.
const AI_DURATION_FACTOR: f64 = 0.8;
const REVENUE_LEVELS: [f64; 6] = [1e4, 1e6, 1e8, 5e8, 1e9, 2e9];

/// One raw registry row. Field names vary between exports.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrialRow {
    #[serde(default, alias = "NCTId", alias = "nct_id", alias = "NctId")]
    pub id: Option<Value>,
    #[serde(default, alias = "DurationWeeks", alias = "durationWeeks")]
    pub duration_weeks: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialEconomics {
    pub id: String,
    pub duration_days: f64,
    pub cost: f64,
    #[serde(rename = "durationAI")]
    pub duration_ai: f64,
    #[serde(rename = "costAI")]
    pub cost_ai: f64,
    pub cost_savings: f64,
    pub roi_efficiency: &'static str,
}

fn is_truthy(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn parse_weeks(value: &Option<Value>) -> f64 {
    let weeks = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    weeks
        .filter(|w| w.is_finite() && *w > 0.0)
        .unwrap_or(DEFAULT_DURATION_WEEKS)
}

fn row_id(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) if n.as_f64().map_or(false, |f| f != 0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// `✓` when the AI design's ROI beats the original at every revenue level.
pub fn roi_efficiency(cost_original: f64, cost_ai: f64) -> &'static str {
    let improves = REVENUE_LEVELS.iter().all(|revenue| {
        let roi_original = (revenue - cost_original) / cost_original;
        let roi_ai = (revenue - cost_ai) / cost_ai;
        roi_ai > roi_original
    });
    if improves { "✓" } else { "—" }
}

pub fn transform_row(row: &TrialRow, index: usize) -> TrialEconomics {
    let duration_days = parse_weeks(&row.duration_weeks) * 7.0;
    let duration_ai = duration_days * AI_DURATION_FACTOR;
    let cost = duration_days * DAILY_COST;
    let cost_ai = duration_ai * DAILY_COST;

    TrialEconomics {
        id: row_id(&row.id).unwrap_or_else(|| format!("Trial-{}", index + 1)),
        duration_days,
        cost,
        duration_ai,
        cost_ai,
        cost_savings: cost - cost_ai,
        roi_efficiency: roi_efficiency(cost, cost_ai),
    }
}

/// Drops rows with neither an id nor a duration, then transforms the rest in order.
pub fn transform_dataset(rows: &[TrialRow]) -> Vec<TrialEconomics> {
    rows.iter()
        .filter(|row| is_truthy(&row.id) || is_truthy(&row.duration_weeks))
        .enumerate()
        .map(|(index, row)| transform_row(row, index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<TrialRow> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn accepts_registry_field_spellings() {
        let parsed = rows(json!([
            {"NCTId": "NCT001", "DurationWeeks": "26"},
            {"nct_id": "NCT002", "durationWeeks": 10}
        ]));
        let out = transform_dataset(&parsed);
        assert_eq!(out[0].id, "NCT001");
        assert_eq!(out[0].duration_days, 182.0);
        assert_eq!(out[1].id, "NCT002");
        assert_eq!(out[1].duration_days, 70.0);
    }

    #[test]
    fn empty_rows_are_dropped_and_ids_follow_filtered_order() {
        let parsed = rows(json!([
            {},
            {"DurationWeeks": "12"},
            {"NCTId": "", "DurationWeeks": ""},
            {"DurationWeeks": 8}
        ]));
        let out = transform_dataset(&parsed);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "Trial-1");
        assert_eq!(out[1].id, "Trial-2");
    }

    #[test]
    fn bad_durations_fall_back_to_a_year() {
        let parsed = rows(json!([
            {"NCTId": "A", "DurationWeeks": "abc"},
            {"NCTId": "B", "DurationWeeks": -3},
            {"NCTId": "C"}
        ]));
        for row in transform_dataset(&parsed) {
            assert_eq!(row.duration_days, 364.0);
        }
    }

    #[test]
    fn savings_are_a_fifth_of_the_cost() {
        let out = transform_row(&TrialRow { id: None, duration_weeks: Some(json!(10)) }, 0);
        assert!((out.cost_savings - out.cost * 0.2).abs() < 1e-6);
        assert!((out.duration_ai - 56.0).abs() < 1e-9);
    }

    #[test]
    fn cheaper_designs_have_better_roi() {
        assert_eq!(roi_efficiency(1000.0, 800.0), "✓");
        assert_eq!(roi_efficiency(800.0, 1000.0), "—");
    }
}
