//! Fixed per-model-class rate table used as a pricing stand-in when a caller
//! reports zero cost alongside nonzero token counts. Rates are USD per 1k
//! tokens and are deliberately static, not live pricing.

struct ModelRate {
    prefix: &'static str,
    input_per_1k: f64,
    output_per_1k: f64,
}

/// Ordered by specificity: first matching prefix wins.
const MODEL_RATES: &[ModelRate] = &[
    ModelRate {
        prefix: "gpt-4o-mini",
        input_per_1k: 0.000_15,
        output_per_1k: 0.000_6,
    },
    ModelRate {
        prefix: "gpt-4o",
        input_per_1k: 0.002_5,
        output_per_1k: 0.01,
    },
    ModelRate {
        prefix: "gpt-4",
        input_per_1k: 0.03,
        output_per_1k: 0.06,
    },
    ModelRate {
        prefix: "gpt-3.5",
        input_per_1k: 0.000_5,
        output_per_1k: 0.001_5,
    },
];

// Unrecognized models fall back to the cheapest class rather than zero, so a
// missing table entry never silently erases cost.
const DEFAULT_RATE: ModelRate = ModelRate {
    prefix: "",
    input_per_1k: 0.000_15,
    output_per_1k: 0.000_6,
};

fn rate_for(model: &str) -> &'static ModelRate {
    MODEL_RATES
        .iter()
        .find(|r| model.starts_with(r.prefix))
        .unwrap_or(&DEFAULT_RATE)
}

/// Estimate the USD cost of a request from its token counts, rounded to
/// 8 decimal places.
pub fn estimate_cost(model: &str, prompt_tokens: i64, completion_tokens: i64) -> f64 {
    let rate = rate_for(model);
    let cost = prompt_tokens as f64 * rate.input_per_1k / 1000.0
        + completion_tokens as f64 * rate.output_per_1k / 1000.0;
    (cost * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpt_4o_mini_rates() {
        // 1k prompt + 1k completion at the mini rates
        let cost = estimate_cost("gpt-4o-mini-2024-07-18", 1000, 1000);
        assert!((cost - 0.00075).abs() < 1e-9);
    }

    #[test]
    fn test_prefix_specificity() {
        // "gpt-4o" must not swallow "gpt-4o-mini"
        let mini = estimate_cost("gpt-4o-mini", 1000, 0);
        let full = estimate_cost("gpt-4o", 1000, 0);
        assert!(mini < full);
    }

    #[test]
    fn test_unknown_model_uses_default_rate() {
        let cost = estimate_cost("some-unknown-model", 1000, 1000);
        assert!((cost - 0.00075).abs() < 1e-9);
    }

    #[test]
    fn test_zero_tokens_zero_cost() {
        assert_eq!(estimate_cost("gpt-4o", 0, 0), 0.0);
    }

    #[test]
    fn test_rounding_to_8_places() {
        let cost = estimate_cost("gpt-4o-mini", 1, 0);
        // 0.00000015 exactly at 8 decimal places
        assert_eq!(cost, 0.000_000_15);
    }
}
