//! Chart recommendation.
//!
//! Given a result set, suggest a small set of chart specs. The LLM is asked
//! first; its answer is validated against the actual result columns, and a
//! rule-based recommender covers model failures and empty answers.
//!
//! Rules: more than 10 categorical buckets discourages pie/donut, a time
//! column encourages line/area, two numeric columns encourage scatter.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::llm::{parse, LlmClient, LlmRequest};
use crate::prompts::PromptLibrary;

/// Supported chart types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Area,
    Scatter,
    Pie,
    Donut,
    Composed,
    Radial,
    Treemap,
    Funnel,
}

/// One recommended chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartRecommendation {
    /// Chart type.
    pub chart_type: ChartType,
    /// Display title.
    pub title: String,
    /// What the chart shows.
    pub description: String,
    /// X axis column.
    pub x_axis: String,
    /// Y axis column.
    pub y_axis: String,
    /// Optional secondary Y axis column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_y_axis: Option<String>,
    /// Confidence in [0, 1].
    pub confidence_score: f64,
}

/// Recommendation report for one result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartReport {
    /// Whether the data can be charted at all.
    pub is_visualizable: bool,
    /// Why not, when `is_visualizable` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Recommended charts, best first.
    pub recommendations: Vec<ChartRecommendation>,
}

impl ChartReport {
    fn not_visualizable(reason: &str) -> Self {
        Self {
            is_visualizable: false,
            reason: Some(reason.to_string()),
            recommendations: Vec::new(),
        }
    }
}

/// Column-type summary of a result set.
#[derive(Debug, Clone, Default)]
pub struct DataCharacteristics {
    /// Total rows.
    pub row_count: usize,
    /// Numeric columns.
    pub numeric: Vec<String>,
    /// Categorical columns.
    pub categorical: Vec<String>,
    /// Date/time columns.
    pub temporal: Vec<String>,
}

/// Classify result columns from sample rows.
#[must_use]
pub fn analyze_characteristics(rows: &[JsonValue]) -> DataCharacteristics {
    let mut characteristics = DataCharacteristics {
        row_count: rows.len(),
        ..DataCharacteristics::default()
    };

    let Some(first) = rows.first().and_then(|r| r.as_object()) else {
        return characteristics;
    };
    let date_re = Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("static date pattern");

    for column in first.keys() {
        let sample = rows
            .iter()
            .take(10)
            .filter_map(|r| r.get(column))
            .find(|v| !v.is_null());

        match sample {
            Some(JsonValue::Number(_)) => characteristics.numeric.push(column.clone()),
            Some(JsonValue::String(s)) => {
                let name_hints = ["date", "time", "year", "created", "updated"];
                let lower = column.to_lowercase();
                if date_re.is_match(s) || name_hints.iter().any(|h| lower.contains(h)) {
                    characteristics.temporal.push(column.clone());
                } else {
                    characteristics.categorical.push(column.clone());
                }
            }
            _ => characteristics.categorical.push(column.clone()),
        }
    }

    characteristics
}

/// Rule-based recommendations.
#[must_use]
pub fn heuristic_recommendations(characteristics: &DataCharacteristics) -> Vec<ChartRecommendation> {
    let mut recommendations = Vec::new();

    if let (Some(cat), Some(num)) = (
        characteristics.categorical.first(),
        characteristics.numeric.first(),
    ) {
        recommendations.push(ChartRecommendation {
            chart_type: ChartType::Bar,
            title: format!("{num} by {cat}"),
            description: "Bar chart comparing values across categories".to_string(),
            x_axis: cat.clone(),
            y_axis: num.clone(),
            secondary_y_axis: None,
            confidence_score: 0.8,
        });

        // Pie charts degrade past ten buckets.
        if characteristics.row_count <= 10 {
            recommendations.push(ChartRecommendation {
                chart_type: ChartType::Pie,
                title: format!("{num} share by {cat}"),
                description: "Proportional share per category".to_string(),
                x_axis: cat.clone(),
                y_axis: num.clone(),
                secondary_y_axis: None,
                confidence_score: 0.6,
            });
        }
    }

    if let (Some(time), Some(num)) = (
        characteristics.temporal.first(),
        characteristics.numeric.first(),
    ) {
        recommendations.insert(
            0,
            ChartRecommendation {
                chart_type: ChartType::Line,
                title: format!("{num} over {time}"),
                description: "Trend over time".to_string(),
                x_axis: time.clone(),
                y_axis: num.clone(),
                secondary_y_axis: None,
                confidence_score: 0.9,
            },
        );
    }

    if characteristics.numeric.len() >= 2 {
        recommendations.push(ChartRecommendation {
            chart_type: ChartType::Scatter,
            title: format!(
                "{} vs {}",
                characteristics.numeric[0], characteristics.numeric[1]
            ),
            description: "Correlation between two measures".to_string(),
            x_axis: characteristics.numeric[0].clone(),
            y_axis: characteristics.numeric[1].clone(),
            secondary_y_axis: None,
            confidence_score: 0.7,
        });
    }

    recommendations.truncate(3);
    recommendations
}

/// Chart recommender combining the model with heuristics.
pub struct ChartRecommender {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl ChartRecommender {
    /// Create a recommender.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }

    /// Recommend charts for a result set.
    pub async fn recommend(&self, question: &str, rows: &[JsonValue]) -> ChartReport {
        let characteristics = analyze_characteristics(rows);

        if characteristics.row_count == 0 {
            return ChartReport::not_visualizable("empty result set");
        }
        if characteristics.numeric.is_empty() {
            return ChartReport::not_visualizable("no numeric columns to plot");
        }

        if let Some(report) = self.llm_recommend(question, rows, &characteristics).await {
            if !report.recommendations.is_empty() {
                return report;
            }
        }

        let recommendations = heuristic_recommendations(&characteristics);
        ChartReport {
            is_visualizable: !recommendations.is_empty(),
            reason: if recommendations.is_empty() {
                Some("no suitable chart type for this shape".to_string())
            } else {
                None
            },
            recommendations,
        }
    }

    async fn llm_recommend(
        &self,
        question: &str,
        rows: &[JsonValue],
        characteristics: &DataCharacteristics,
    ) -> Option<ChartReport> {
        let sample = serde_json::to_string(&rows.iter().take(3).collect::<Vec<_>>()).ok()?;
        let summary = format!(
            "rows: {}, numeric: {:?}, categorical: {:?}, temporal: {:?}",
            characteristics.row_count,
            characteristics.numeric,
            characteristics.categorical,
            characteristics.temporal
        );

        let messages = self
            .prompts
            .chart_recommendation
            .render(&[
                ("question", question),
                ("results", sample.as_str()),
                ("data_characteristics", summary.as_str()),
            ])
            .ok()?;

        let response = match self.llm.complete(LlmRequest::new(messages)).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "chart recommendation call failed");
                return None;
            }
        };

        let value = parse::extract_json(&response.content)?;
        let mut report: ChartReport = serde_json::from_value(value).ok()?;

        // Drop charts whose axes are not actual result columns.
        let known: Vec<&String> = characteristics
            .numeric
            .iter()
            .chain(&characteristics.categorical)
            .chain(&characteristics.temporal)
            .collect();
        report
            .recommendations
            .retain(|c| known.iter().any(|k| **k == c.x_axis) && known.iter().any(|k| **k == c.y_axis));
        report.recommendations.truncate(3);
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows_by_category(n: usize) -> Vec<JsonValue> {
        (0..n)
            .map(|i| serde_json::json!({"supplier": format!("S{i}"), "avg_rate": 50.0 + i as f64}))
            .collect()
    }

    #[test]
    fn test_characteristics_classification() {
        let rows = vec![serde_json::json!({
            "supplier": "TCS",
            "avg_rate": 52.0,
            "work_start_date": "2023-01-15"
        })];
        let c = analyze_characteristics(&rows);
        assert_eq!(c.numeric, vec!["avg_rate"]);
        assert_eq!(c.categorical, vec!["supplier"]);
        assert_eq!(c.temporal, vec!["work_start_date"]);
    }

    #[test]
    fn test_heuristics_prefer_line_for_time_series() {
        let rows = vec![serde_json::json!({"year": "2023-01-01", "avg_rate": 50.0})];
        let recs = heuristic_recommendations(&analyze_characteristics(&rows));
        assert_eq!(recs[0].chart_type, ChartType::Line);
    }

    #[test]
    fn test_heuristics_discourage_pie_past_ten_buckets() {
        let small = heuristic_recommendations(&analyze_characteristics(&rows_by_category(5)));
        assert!(small.iter().any(|r| r.chart_type == ChartType::Pie));

        let large = heuristic_recommendations(&analyze_characteristics(&rows_by_category(15)));
        assert!(!large.iter().any(|r| r.chart_type == ChartType::Pie));
        assert!(!large.iter().any(|r| r.chart_type == ChartType::Donut));
    }

    #[test]
    fn test_heuristics_scatter_for_two_numerics() {
        let rows = vec![serde_json::json!({"rate": 50.0, "experience_years": 4.0})];
        let recs = heuristic_recommendations(&analyze_characteristics(&rows));
        assert!(recs.iter().any(|r| r.chart_type == ChartType::Scatter));
    }

    #[test]
    fn test_empty_rows_not_visualizable() {
        let c = analyze_characteristics(&[]);
        assert_eq!(c.row_count, 0);
        assert!(heuristic_recommendations(&c).is_empty());
    }

    #[test]
    fn test_chart_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ChartType::Treemap).unwrap(), "\"treemap\"");
    }
}
