//! Cost estimates for chat-completion tokens and TTS characters.

use std::fmt::Write as _;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Serialize, Serializer};

use crate::error::{PipelineError, Result};
use crate::model::LlmUsage;

pub const DEFAULT_COST_MODEL: &str = "gpt-3.5";
pub const TTS_USD_PER_1K_CHARS: f64 = 0.015;

const USD_BRL_URL: &str = "https://economia.awesomeapi.com.br/json/last/USD-BRL";
const EXCHANGE_RATE_TIMEOUT_SECS: u64 = 5;

/// USD per 1000 tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub model: &'static str,
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

pub const MODEL_PRICING: &[ModelPricing] = &[
    ModelPricing {
        model: "gpt-4o",
        input_per_1k: 0.005,
        output_per_1k: 0.02,
    },
    ModelPricing {
        model: "gpt-4.1",
        input_per_1k: 0.002,
        output_per_1k: 0.008,
    },
    ModelPricing {
        model: "gpt-4.1-mini",
        input_per_1k: 0.0004,
        output_per_1k: 0.0016,
    },
    ModelPricing {
        model: "gpt-4.1-nano",
        input_per_1k: 0.0001,
        output_per_1k: 0.0004,
    },
    ModelPricing {
        model: "gpt-3.5",
        input_per_1k: 0.0005,
        output_per_1k: 0.0015,
    },
];

/// Case-insensitive lookup in [`MODEL_PRICING`].
pub fn pricing_for(model: &str) -> Result<&'static ModelPricing> {
    let wanted = model.trim().to_lowercase();
    MODEL_PRICING
        .iter()
        .find(|pricing| pricing.model == wanted)
        .ok_or_else(|| {
            let known = MODEL_PRICING
                .iter()
                .map(|pricing| pricing.model)
                .collect::<Vec<_>>()
                .join(", ");
            PipelineError::invalid_argument(format!(
                "unknown model {model:?}; choose one of: {known}"
            ))
        })
}

/// Rough token count for `text`: one token per four characters, at least one.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = u64::try_from(text.chars().count()).unwrap_or(u64::MAX);
    (chars / 4).max(1)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub model: String,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub chars_tts: u64,
    #[serde(serialize_with = "rounded")]
    pub cost_gpt: f64,
    #[serde(serialize_with = "rounded")]
    pub cost_tts: f64,
    #[serde(rename = "total_cost_usd", serialize_with = "rounded")]
    pub total: f64,
}

impl CostEstimate {
    pub fn new(pricing: &ModelPricing, usage: &LlmUsage, tts_chars: u64) -> Self {
        let cost_gpt = per_thousand(usage.prompt_tokens, pricing.input_per_1k)
            + per_thousand(usage.completion_tokens, pricing.output_per_1k);
        let cost_tts = per_thousand(tts_chars, TTS_USD_PER_1K_CHARS);
        Self {
            model: pricing.model.to_owned(),
            tokens_input: usage.prompt_tokens,
            tokens_output: usage.completion_tokens,
            chars_tts: tts_chars,
            cost_gpt,
            cost_tts,
            total: cost_gpt + cost_tts,
        }
    }

    /// Human-readable report; BRL amounts appear only with a known rate.
    pub fn render_text(&self, usd_to_brl: Option<f64>) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "model:         {}", self.model);
        let _ = writeln!(out, "input tokens:  {}", self.tokens_input);
        let _ = writeln!(out, "output tokens: {}", self.tokens_output);
        let _ = writeln!(out, "tts chars:     {}", self.chars_tts);
        for (label, usd) in [
            ("gpt cost:     ", self.cost_gpt),
            ("tts cost:     ", self.cost_tts),
            ("total cost:   ", self.total),
        ] {
            match usd_to_brl {
                Some(rate) => {
                    let _ = writeln!(out, "{label} ${usd:.6} - R$ {:.6}", usd * rate);
                }
                None => {
                    let _ = writeln!(out, "{label} ${usd:.6}");
                }
            }
        }
        out
    }
}

fn per_thousand(units: u64, price: f64) -> f64 {
    units as f64 / 1000.0 * price
}

fn round_micro(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

fn rounded<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_micro(*value))
}

/// Current USD to BRL bid from the AwesomeAPI quote service.
pub async fn fetch_usd_brl_rate() -> anyhow::Result<f64> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(EXCHANGE_RATE_TIMEOUT_SECS))
        .build()
        .context("build http client")?;
    let resp = client
        .get(USD_BRL_URL)
        .send()
        .await
        .context("request exchange rate")?;
    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("exchange rate service returned {status}");
    }
    let value: serde_json::Value = resp.json().await.context("parse exchange rate json")?;
    let bid = value
        .pointer("/USDBRL/bid")
        .and_then(|v| v.as_str())
        .context("exchange rate response has no USDBRL.bid")?;
    bid.trim()
        .parse::<f64>()
        .with_context(|| format!("invalid exchange rate: {bid:?}"))
}
