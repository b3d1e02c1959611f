//! API cost estimation from recorded token usage.

use rust_decimal::Decimal;
use serde::Serialize;

/// Model used for brand extraction cost estimates.
const EXTRACTION_MODEL: &str = "gpt-4o-mini";
/// Rough per-analysis token budget for the extraction call.
const EXTRACTION_INPUT_TOKENS: i64 = 500;
const EXTRACTION_OUTPUT_TOKENS: i64 = 200;

/// USD per 1M tokens as `(input, output)`, in cents.
fn token_price_cents(model: &str) -> Option<(i64, i64)> {
    let price = match model {
        m if m.starts_with("gpt-5") => (200, 800),
        "gpt-4o-mini" => (15, 60),
        "gpt-4o" => (250, 1000),
        "gemini-3-flash-preview" | "gemini-2.0-flash" => (10, 40),
        "sonar" => (100, 100),
        "sonar-pro" => (300, 1500),
        _ => return None,
    };
    Some(price)
}

/// USD per request, for vendors that bill per call on top of tokens.
fn request_fee(model: &str) -> Decimal {
    match model {
        // $5 per 1000 requests
        "sonar" | "sonar-pro" => Decimal::new(5, 3),
        _ => Decimal::ZERO,
    }
}

/// Aggregated token usage for one provider/model pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelUsage {
    pub provider: String,
    pub model: String,
    pub queries: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderCost {
    pub provider: String,
    pub model: String,
    pub queries: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub request_cost: Decimal,
    pub total_cost: Decimal,
}

fn token_cost(tokens: i64, cents_per_million: i64) -> Decimal {
    Decimal::from(tokens) * Decimal::new(cents_per_million, 2) / Decimal::from(1_000_000)
}

fn cost_line(
    provider: &str,
    model: &str,
    queries: i64,
    input_tokens: i64,
    output_tokens: i64,
    fee: Decimal,
) -> ProviderCost {
    let (input_price, output_price) = token_price_cents(model).unwrap_or((0, 0));
    let input_cost = token_cost(input_tokens, input_price);
    let output_cost = token_cost(output_tokens, output_price);
    let request_cost = Decimal::from(queries) * fee;

    ProviderCost {
        provider: provider.to_string(),
        model: model.to_string(),
        queries,
        input_tokens,
        output_tokens,
        input_cost: input_cost.round_dp(4),
        output_cost: output_cost.round_dp(4),
        request_cost: request_cost.round_dp(4),
        total_cost: (input_cost + output_cost + request_cost).round_dp(4),
    }
}

/// One cost line per provider/model, plus an `extraction` line estimating the
/// brand-extraction calls. Unknown models are priced at zero.
#[must_use]
pub fn compute_costs(usage: &[ModelUsage]) -> Vec<ProviderCost> {
    let mut costs: Vec<ProviderCost> = usage
        .iter()
        .map(|u| {
            cost_line(
                &u.provider,
                &u.model,
                u.queries,
                u.input_tokens,
                u.output_tokens,
                request_fee(&u.model),
            )
        })
        .collect();

    let total_queries: i64 = usage.iter().map(|u| u.queries).sum();
    if total_queries > 0 {
        costs.push(cost_line(
            "extraction",
            EXTRACTION_MODEL,
            total_queries,
            total_queries * EXTRACTION_INPUT_TOKENS,
            total_queries * EXTRACTION_OUTPUT_TOKENS,
            Decimal::ZERO,
        ));
    }

    costs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(provider: &str, model: &str, queries: i64, input: i64, output: i64) -> ModelUsage {
        ModelUsage {
            provider: provider.to_string(),
            model: model.to_string(),
            queries,
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[test]
    fn sonar_includes_request_fee() {
        let costs = compute_costs(&[usage("perplexity", "sonar", 10, 1_000_000, 500_000)]);
        let line = &costs[0];
        assert_eq!(line.input_cost, Decimal::new(1, 0));
        assert_eq!(line.output_cost, Decimal::new(5, 1));
        assert_eq!(line.request_cost, Decimal::new(5, 2));
        assert_eq!(line.total_cost, Decimal::new(155, 2));
    }

    #[test]
    fn gpt5_family_shares_pricing() {
        let costs = compute_costs(&[usage("openai", "gpt-5.2-chat-latest", 1, 1_000_000, 0)]);
        assert_eq!(costs[0].input_cost, Decimal::new(2, 0));
        assert_eq!(costs[0].request_cost, Decimal::ZERO);
    }

    #[test]
    fn unknown_model_costs_nothing() {
        let costs = compute_costs(&[usage("mystery", "llm-x", 3, 9_999, 9_999)]);
        assert_eq!(costs[0].total_cost, Decimal::ZERO);
    }

    #[test]
    fn extraction_line_estimates_per_query_tokens() {
        let costs = compute_costs(&[
            usage("openai", "gpt-4o", 2, 0, 0),
            usage("gemini", "gemini-2.0-flash", 3, 0, 0),
        ]);
        let extraction = costs.last().unwrap();
        assert_eq!(extraction.provider, "extraction");
        assert_eq!(extraction.queries, 5);
        assert_eq!(extraction.input_tokens, 2_500);
        assert_eq!(extraction.output_tokens, 1_000);
        // 2500 * 0.15/1M + 1000 * 0.60/1M = 0.000375 + 0.0006
        assert_eq!(extraction.total_cost, Decimal::new(10, 4));
    }

    #[test]
    fn empty_usage_has_no_extraction_line() {
        assert!(compute_costs(&[]).is_empty());
    }
}
