use serde::Serialize;

use super::{ estimate_cost, Blinding, Endpoint, TrialInputs };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recommendation {
    #[serde(rename = "rec_duration")]
    ReduceDuration,
    #[serde(rename = "rec_participants")]
    IncreaseParticipants,
    #[serde(rename = "rec_endpoint")]
    ChangeEndpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialAssessment {
    pub success_prob: f64,
    pub cost: f64,
    pub efficiency_score: f64,
    pub recommendations: Vec<Recommendation>,
}

fn blinding_bonus(blinding: Blinding) -> f64 {
    match blinding {
        Blinding::Double => 0.08,
        Blinding::Single => 0.04,
        Blinding::Open => 0.0,
    }
}

fn endpoint_weight(endpoint: Endpoint) -> f64 {
    match endpoint {
        Endpoint::Hba1c => 0.07,
        Endpoint::Fasting => 0.03,
        Endpoint::Composite => 0.05,
    }
}

/// Heuristic assessment shown on the calculator page.
pub fn assess(inputs: &TrialInputs) -> TrialAssessment {
    let sample_factor = f64::from(inputs.participants) / 2000.0;
    let bonus = blinding_bonus(inputs.blinding);
    let duration = f64::from(inputs.duration_months);

    let success_prob = (0.45 + sample_factor + bonus + endpoint_weight(inputs.endpoint)
        - duration * 0.01).clamp(0.2, 0.92);
    let efficiency_score = (0.72 + sample_factor * 0.1 + bonus * 0.8 - duration * 0.01)
        .clamp(0.3, 0.95);

    let mut recommendations = Vec::new();
    if inputs.duration_months > 18 {
        recommendations.push(Recommendation::ReduceDuration);
    }
    if inputs.participants < 150 {
        recommendations.push(Recommendation::IncreaseParticipants);
    }
    if inputs.endpoint == Endpoint::Fasting {
        recommendations.push(Recommendation::ChangeEndpoint);
    }

    TrialAssessment {
        success_prob,
        cost: estimate_cost(inputs.participants, inputs.duration_months),
        efficiency_score,
        recommendations,
    }
}
