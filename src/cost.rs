//! Cost estimator.
//!
//! Ported from a per-model pricing table and formatting helpers, with one
//! deliberate semantic change: cache creation and cache read are both
//! priced at 25% of the input rate rather than at the full input-token
//! price. Recorded in DESIGN.md as an Open Question resolution.

const MID_TIER_DEFAULT: &str = "claude-3-5-sonnet";

struct ModelPrice {
    fragment: &'static str,
    input_per_million: f64,
    output_per_million: f64,
}

/// Keyed by a model-name fragment rather than the exact string, since
/// providers append date suffixes (`claude-3-5-sonnet-20241022`).
const PRICE_TABLE: &[ModelPrice] = &[
    ModelPrice { fragment: "claude-3-5-haiku", input_per_million: 0.80, output_per_million: 4.00 },
    ModelPrice { fragment: "claude-3-haiku", input_per_million: 0.25, output_per_million: 1.25 },
    ModelPrice { fragment: "claude-3-5-sonnet", input_per_million: 3.00, output_per_million: 15.00 },
    ModelPrice { fragment: "claude-3-opus", input_per_million: 15.00, output_per_million: 75.00 },
    ModelPrice { fragment: "claude-3-sonnet", input_per_million: 3.00, output_per_million: 15.00 },
    ModelPrice { fragment: "gpt-4o-mini", input_per_million: 0.15, output_per_million: 0.60 },
    ModelPrice { fragment: "gpt-4o", input_per_million: 2.50, output_per_million: 10.00 },
    ModelPrice { fragment: "o1-mini", input_per_million: 3.00, output_per_million: 12.00 },
    ModelPrice { fragment: "gemini-1.5-flash", input_per_million: 0.075, output_per_million: 0.30 },
    ModelPrice { fragment: "gemini-1.5-pro", input_per_million: 1.25, output_per_million: 5.00 },
];

fn pricing_for(model: &str) -> (f64, f64) {
    let lower = model.to_lowercase();
    PRICE_TABLE
        .iter()
        .find(|p| lower.contains(p.fragment))
        .or_else(|| PRICE_TABLE.iter().find(|p| p.fragment == MID_TIER_DEFAULT))
        .map(|p| (p.input_per_million, p.output_per_million))
        .unwrap_or((3.00, 15.00))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
}

/// `cost = input*inPerM/1e6 + output*outPerM/1e6 + (cacheCreation+cacheRead)*inPerM/1e6*0.25`.
pub fn estimate_cost(model: &str, usage: TokenUsage) -> f64 {
    let (in_per_million, out_per_million) = pricing_for(model);
    let input_cost = usage.input as f64 * in_per_million / 1_000_000.0;
    let output_cost = usage.output as f64 * out_per_million / 1_000_000.0;
    let cache_cost = (usage.cache_creation + usage.cache_read) as f64 * in_per_million / 1_000_000.0 * 0.25;
    input_cost + output_cost + cache_cost
}

/// 4 decimals below $0.01, 2 decimals otherwise.
pub fn format_cost(usd: f64) -> String {
    if usd < 0.01 {
        format!("${usd:.4}")
    } else {
        format!("${usd:.2}")
    }
}

/// Condense with K/M suffixes.
pub fn format_tokens(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_matches_by_fragment_ignoring_date_suffix() {
        let (input, output) = pricing_for("claude-3-5-sonnet-20241022");
        assert_eq!((input, output), (3.00, 15.00));
    }

    #[test]
    fn unknown_model_defaults_to_mid_tier() {
        let (input, output) = pricing_for("some-unknown-model-xyz");
        assert_eq!((input, output), (3.00, 15.00));
    }

    #[test]
    fn estimate_cost_applies_quarter_rate_cache_pricing() {
        let usage = TokenUsage { input: 1_000_000, output: 1_000_000, cache_creation: 500_000, cache_read: 500_000 };
        let cost = estimate_cost("claude-3-5-sonnet", usage);
        // 3.00 + 15.00 + (1_000_000 * 3.00/1e6 * 0.25) = 3 + 15 + 0.75 = 18.75
        assert!((cost - 18.75).abs() < 1e-9);
    }

    #[test]
    fn format_cost_uses_four_decimals_below_a_cent() {
        assert_eq!(format_cost(0.0034), "$0.0034");
        assert_eq!(format_cost(1.5), "$1.50");
    }

    #[test]
    fn format_tokens_condenses_with_suffixes() {
        assert_eq!(format_tokens(500), "500");
        assert_eq!(format_tokens(1_500), "1.5K");
        assert_eq!(format_tokens(2_500_000), "2.5M");
    }
}
