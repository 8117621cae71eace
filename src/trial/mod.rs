//! Trial-design calculator and economics transform behind the demo pages.

pub mod economics;
pub mod model;
pub mod score;

use serde::{ Deserialize, Serialize };

/// Operating cost of one enrolled participant per day, in USD.
pub const DAILY_COST: f64 = 23737.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    #[serde(alias = "Placebo")]
    Placebo,
    #[serde(alias = "Active Comparator")]
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blinding {
    #[serde(alias = "Open Label")]
    Open,
    #[serde(alias = "Single Blind")]
    Single,
    #[serde(alias = "Double Blind")]
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    #[serde(alias = "HbA1c Change")]
    Hba1c,
    #[serde(alias = "Fasting Glucose")]
    Fasting,
    #[serde(alias = "Composite")]
    Composite,
}

/// Design parameters of a type 2 diabetes trial. Missing fields take the page defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrialInputs {
    pub participants: u32,
    #[serde(alias = "duration")]
    pub duration_months: u32,
    #[serde(alias = "controlType")]
    pub control: ControlType,
    pub blinding: Blinding,
    pub endpoint: Endpoint,
}

impl Default for TrialInputs {
    fn default() -> Self {
        Self {
            participants: 280,
            duration_months: 14,
            control: ControlType::Placebo,
            blinding: Blinding::Double,
            endpoint: Endpoint::Hba1c,
        }
    }
}

pub fn estimate_cost(participants: u32, duration_months: u32) -> f64 {
    let duration_days = f64::from(duration_months) * 30.0;
    f64::from(participants) * DAILY_COST * (duration_days / 365.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let inputs: TrialInputs = serde_json::from_str(r#"{"participants": 120}"#).unwrap();
        assert_eq!(inputs.participants, 120);
        assert_eq!(inputs.duration_months, 14);
        assert_eq!(inputs.blinding, Blinding::Double);
    }

    #[test]
    fn display_labels_are_accepted() {
        let inputs: TrialInputs = serde_json::from_str(
            r#"{"duration": 20, "controlType": "Active Comparator", "blinding": "Open Label", "endpoint": "Fasting Glucose"}"#
        ).unwrap();
        assert_eq!(inputs.duration_months, 20);
        assert_eq!(inputs.control, ControlType::Active);
        assert_eq!(inputs.blinding, Blinding::Open);
        assert_eq!(inputs.endpoint, Endpoint::Fasting);
    }

    #[test]
    fn cost_scales_with_enrollment_and_duration() {
        let cost = estimate_cost(365, 1);
        assert!((cost - 365.0 * DAILY_COST * 30.0 / 365.0).abs() < 1e-6);
        assert_eq!(estimate_cost(0, 12), 0.0);
    }
}
