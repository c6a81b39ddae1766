//! Logit extraction and the similarity distance.

use std::collections::HashMap;

use serde_json::Value;

use crate::ValidationOutcome;

/// Per-token logprob data from one chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenLogprobs {
    pub token: String,
    /// Top-k alternatives at this position, `(token, logprob)`.
    pub top: Vec<(String, f64)>,
}

/// Pulls the deterministic token sequence plus top-k logprobs out of an
/// OpenAI-style chat completion body.
pub fn extract_token_logprobs(response: &Value) -> Option<Vec<TokenLogprobs>> {
    let content = response
        .get("choices")?
        .get(0)?
        .get("logprobs")?
        .get("content")?
        .as_array()?;

    let mut positions = Vec::with_capacity(content.len());
    for entry in content {
        let token = entry.get("token")?.as_str()?.to_owned();
        let top = entry
            .get("top_logprobs")
            .and_then(Value::as_array)
            .map(|alternatives| {
                alternatives
                    .iter()
                    .filter_map(|alt| {
                        Some((
                            alt.get("token")?.as_str()?.to_owned(),
                            alt.get("logprob")?.as_f64()?,
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();
        positions.push(TokenLogprobs { token, top });
    }
    Some(positions)
}

/// Compares the validator's re-run against the original.
///
/// Length and token-sequence mismatches short-circuit into their own
/// outcomes (reported as valid until tokenization across node versions is
/// guaranteed). Matching sequences get the similarity distance.
pub fn compare_logits(
    original: &[TokenLogprobs],
    validator: &[TokenLogprobs],
    epsilon: f64,
) -> ValidationOutcome {
    if original.len() != validator.len() {
        return ValidationOutcome::DifferentLength {
            original: original.len(),
            validator: validator.len(),
        };
    }
    if original
        .iter()
        .zip(validator)
        .any(|(o, v)| o.token != v.token)
    {
        return ValidationOutcome::DifferentTokens;
    }

    let top_k = original
        .iter()
        .map(|position| position.top.len())
        .max()
        .unwrap_or(1)
        .max(1);

    let mut total_distance = 0.0;
    for (orig, val) in original.iter().zip(validator) {
        total_distance += position_distance(orig, val, epsilon);
    }

    let denominator = (original.len().max(100) * top_k) as f64;
    let similarity = (1.0 - total_distance / denominator).max(0.0);
    ValidationOutcome::Similarity(similarity)
}

/// Distance at one token position.
///
/// Missing tokens in the original top-k are priced at the estimated "next"
/// logprob `min1 - (min2 - min1)`.
fn position_distance(original: &TokenLogprobs, validator: &TokenLogprobs, epsilon: f64) -> f64 {
    let original_map: HashMap<&str, f64> = original
        .top
        .iter()
        .map(|(token, logprob)| (token.as_str(), *logprob))
        .collect();

    let next_logprob = estimate_next_logprob(&original.top);

    validator
        .top
        .iter()
        .map(|(token, v_logprob)| {
            let o_logprob = original_map
                .get(token.as_str())
                .copied()
                .unwrap_or(next_logprob);
            let diff = (v_logprob - o_logprob).abs();
            0.5 * diff / (epsilon + v_logprob.abs() + o_logprob.abs())
        })
        .sum()
}

fn estimate_next_logprob(top: &[(String, f64)]) -> f64 {
    let mut min1 = f64::INFINITY;
    let mut min2 = f64::INFINITY;
    for (_, logprob) in top {
        if *logprob < min1 {
            min2 = min1;
            min1 = *logprob;
        } else if *logprob < min2 {
            min2 = *logprob;
        }
    }
    if min1.is_infinite() {
        return 0.0;
    }
    if min2.is_infinite() {
        return min1;
    }
    min1 - (min2 - min1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(token: &str, top: &[(&str, f64)]) -> TokenLogprobs {
        TokenLogprobs {
            token: token.to_owned(),
            top: top.iter().map(|(t, lp)| ((*t).to_owned(), *lp)).collect(),
        }
    }

    #[test]
    fn identical_logprobs_are_fully_similar() {
        let positions = vec![
            position("hello", &[("hello", -0.01), ("hi", -4.2)]),
            position("world", &[("world", -0.02), ("earth", -3.9)]),
        ];
        match compare_logits(&positions, &positions, 1e-6) {
            ValidationOutcome::Similarity(similarity) => {
                assert!(similarity > 0.999999, "similarity = {similarity}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn token_mismatch_is_its_own_outcome() {
        let original = vec![position("hello", &[]), position("world", &[])];
        let validator = vec![position("hello", &[]), position("!", &[])];
        assert_eq!(
            compare_logits(&original, &validator, 1e-6),
            ValidationOutcome::DifferentTokens
        );
    }

    #[test]
    fn length_mismatch_is_its_own_outcome() {
        let original = vec![position("a", &[])];
        let validator = vec![position("a", &[]), position("b", &[])];
        assert_eq!(
            compare_logits(&original, &validator, 1e-6),
            ValidationOutcome::DifferentLength {
                original: 1,
                validator: 2
            }
        );
    }

    #[test]
    fn diverging_logprobs_lower_similarity() {
        let original: Vec<_> = (0..100)
            .map(|i| position(&format!("t{i}"), &[(&format!("t{i}"), -0.1)]))
            .collect();
        let validator: Vec<_> = (0..100)
            .map(|i| position(&format!("t{i}"), &[(&format!("t{i}"), -9.0)]))
            .collect();

        match compare_logits(&original, &validator, 1e-6) {
            ValidationOutcome::Similarity(similarity) => {
                assert!(similarity < 0.99, "similarity = {similarity}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn missing_token_uses_next_logprob_estimate() {
        assert_eq!(
            estimate_next_logprob(&[("a".to_owned(), -1.0), ("b".to_owned(), -3.0)]),
            -5.0
        );
        assert_eq!(estimate_next_logprob(&[("a".to_owned(), -2.0)]), -2.0);
        assert_eq!(estimate_next_logprob(&[]), 0.0);
    }

    #[test]
    fn extracts_openai_logprobs_shape() {
        let response = serde_json::json!({
            "choices": [{
                "message": {"content": "hi"},
                "logprobs": {"content": [
                    {
                        "token": "hi",
                        "logprob": -0.01,
                        "top_logprobs": [
                            {"token": "hi", "logprob": -0.01},
                            {"token": "hey", "logprob": -4.0}
                        ]
                    }
                ]}
            }]
        });

        let positions = extract_token_logprobs(&response).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].token, "hi");
        assert_eq!(positions[0].top.len(), 2);
    }

    #[test]
    fn missing_logprobs_yield_none() {
        let response = serde_json::json!({"choices": [{"message": {"content": "hi"}}]});
        assert!(extract_token_logprobs(&response).is_none());
    }
}
