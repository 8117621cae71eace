use serde::Serialize;

use super::{ estimate_cost, Blinding, ControlType, Endpoint, TrialInputs };

/// Coefficients of the logistic success model.
#[derive(Debug, Clone, Copy)]
pub struct ModelWeights {
    pub intercept: f64,
    pub enrollment: f64,
    pub duration_weeks: f64,
    pub endpoint_hba1c: f64,
    pub endpoint_fpg: f64,
    pub endpoint_composite: f64,
    pub masking_single: f64,
    pub masking_double: f64,
    pub masking_open: f64,
    pub comparator_placebo: f64,
    pub comparator_active: f64,
}

pub const MODEL_WEIGHTS: ModelWeights = ModelWeights {
    intercept: -8.5,
    enrollment: 0.000958,
    duration_weeks: 0.128752,
    endpoint_hba1c: 4.505112,
    endpoint_fpg: -1.225437,
    endpoint_composite: -0.803665,
    masking_single: 0.724678,
    masking_double: 0.052367,
    masking_open: -0.512649,
    comparator_placebo: 0.288967,
    comparator_active: -0.429503,
};

const SUCCESS_WEIGHT: f64 = 120.0;
const COST_SCALE: f64 = 750_000.0;
const DURATION_WEIGHT: f64 = 1.25;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignScore {
    pub inputs: TrialInputs,
    pub success_probability: f64,
    pub cost: f64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub original: DesignScore,
    pub optimized: DesignScore,
    pub suggestions: Vec<String>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn predict_success(inputs: &TrialInputs) -> f64 {
    let w = &MODEL_WEIGHTS;
    let mut score = w.intercept;

    score += f64::from(inputs.participants) * w.enrollment;
    score += (f64::from(inputs.duration_months) * 4.0 / 10.0) * w.duration_weeks;

    score += match inputs.endpoint {
        Endpoint::Hba1c => w.endpoint_hba1c,
        Endpoint::Fasting => w.endpoint_fpg,
        Endpoint::Composite => w.endpoint_composite,
    };
    score += match inputs.blinding {
        Blinding::Single => w.masking_single,
        Blinding::Double => w.masking_double,
        Blinding::Open => w.masking_open,
    };
    score += match inputs.control {
        ControlType::Placebo => w.comparator_placebo,
        ControlType::Active => w.comparator_active,
    };

    sigmoid(score)
}

pub fn calculate_efficiency(success_probability: f64, cost: f64, duration_months: u32) -> f64 {
    let denominator = cost / COST_SCALE + f64::from(duration_months) * DURATION_WEIGHT;
    if denominator <= 0.0 {
        return 0.0;
    }
    (success_probability * SUCCESS_WEIGHT) / denominator
}

/// Rule-based redesign: preferred endpoint, masking and comparator, more power, shorter run.
pub fn optimize_design(inputs: &TrialInputs) -> TrialInputs {
    let mut optimized = *inputs;

    optimized.endpoint = Endpoint::Hba1c;
    if optimized.blinding == Blinding::Open {
        optimized.blinding = Blinding::Single;
    }
    if optimized.control == ControlType::Active {
        optimized.control = ControlType::Placebo;
    }
    if optimized.participants < 150 {
        optimized.participants += 50;
    }
    if optimized.duration_months > 18 {
        optimized.duration_months -= 4;
    }

    optimized
}

pub fn suggestions(inputs: &TrialInputs) -> Vec<String> {
    let mut out = Vec::new();
    if inputs.duration_months > 18 {
        out.push("AI suggests reducing trial duration to improve efficiency.".to_string());
    }
    if inputs.participants < 150 {
        out.push("AI suggests increasing sample size to improve statistical power.".to_string());
    }
    if inputs.endpoint != Endpoint::Hba1c {
        out.push(
            "AI suggests using HbA1c Change as a primary endpoint for stronger success likelihood.".to_string()
        );
    }
    out
}

pub fn score_design(inputs: &TrialInputs) -> DesignScore {
    let success_probability = predict_success(inputs);
    let cost = estimate_cost(inputs.participants, inputs.duration_months);
    DesignScore {
        inputs: *inputs,
        success_probability,
        cost,
        efficiency: calculate_efficiency(success_probability, cost, inputs.duration_months),
    }
}

pub fn optimize(inputs: &TrialInputs) -> OptimizationReport {
    OptimizationReport {
        original: score_design(inputs),
        optimized: score_design(&optimize_design(inputs)),
        suggestions: suggestions(inputs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weak() -> TrialInputs {
        TrialInputs {
            participants: 100,
            duration_months: 24,
            control: ControlType::Active,
            blinding: Blinding::Open,
            endpoint: Endpoint::Composite,
        }
    }

    #[test]
    fn probability_is_a_sigmoid_of_the_linear_score() {
        let inputs = TrialInputs::default();
        let w = MODEL_WEIGHTS;
        let linear = w.intercept
            + 280.0 * w.enrollment
            + 5.6 * w.duration_weeks
            + w.endpoint_hba1c
            + w.masking_double
            + w.comparator_placebo;
        assert!((predict_success(&inputs) - sigmoid(linear)).abs() < 1e-12);
        assert!(predict_success(&inputs) > 0.0 && predict_success(&inputs) < 1.0);
    }

    #[test]
    fn redesign_applies_every_rule() {
        let optimized = optimize_design(&weak());
        assert_eq!(optimized.endpoint, Endpoint::Hba1c);
        assert_eq!(optimized.blinding, Blinding::Single);
        assert_eq!(optimized.control, ControlType::Placebo);
        assert_eq!(optimized.participants, 150);
        assert_eq!(optimized.duration_months, 20);
    }

    #[test]
    fn strong_designs_are_left_alone() {
        let inputs = TrialInputs::default();
        assert_eq!(optimize_design(&inputs), inputs);
        assert!(suggestions(&inputs).is_empty());
    }

    #[test]
    fn redesign_improves_the_predicted_success() {
        let report = optimize(&weak());
        assert!(report.optimized.success_probability > report.original.success_probability);
        assert_eq!(report.suggestions.len(), 3);
    }

    #[test]
    fn efficiency_handles_zero_denominator() {
        assert_eq!(calculate_efficiency(0.5, 0.0, 0), 0.0);
        let e = calculate_efficiency(0.5, 750_000.0, 4);
        assert!((e - 60.0 / 6.0).abs() < 1e-9);
    }
}
