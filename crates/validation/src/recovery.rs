//! Startup recovery: rerun validations missed while the process was down,
//! then claim the previous epoch's rewards.

use std::collections::HashSet;

use futures_util::future::join_all;
use infernet_chain::{ChainMsg, ChainQuery};
use infernet_config::ValidationParams;
use infernet_db::{SeedSlot, Store};
use infernet_primitives::{InferenceRecord, InferenceStatus};
use tracing::{info, warn};

use crate::{should_validate, SamplingInfo, ValidationError, Validator};

/// Inference ids this validator should have validated but has no recorded
/// validation for.
pub fn missed_validations(
    records: &[InferenceRecord],
    already_validated: &HashSet<String>,
    seed: i64,
    validator: &str,
    validator_power: u64,
    params: &ValidationParams,
) -> Vec<String> {
    records
        .iter()
        .filter(|record| {
            matches!(
                record.status,
                InferenceStatus::Finished | InferenceStatus::Validated | InferenceStatus::Invalidated
            )
        })
        .filter(|record| !already_validated.contains(&record.inference_id))
        .filter(|record| {
            let info = SamplingInfo {
                inference_id: record.inference_id.clone(),
                executor_id: record.executor_id.clone(),
                total_power: record.total_power,
                executor_power: record.executor_power,
            };
            should_validate(seed, &info, validator_power, validator, params).validate
        })
        .map(|record| record.inference_id.clone())
        .collect()
}

/// Runs the recovery sweep once at startup.
///
/// When an unclaimed settle amount exists for the previous epoch and the
/// stored seed matches, every missed validation is rerun in parallel before
/// the reward claim is submitted.
pub async fn run_startup_recovery(
    validator: &Validator,
    store: &Store,
    query: &dyn ChainQuery,
    txmgr: &infernet_txmgr::TxManager,
) -> Result<(), ValidationError> {
    let participant = validator.participant().to_owned();

    let Some(settle) = query.settle_amount(participant.clone()).await? else {
        return Ok(());
    };
    let Some(previous_seed) = store.seed(SeedSlot::Previous)? else {
        return Ok(());
    };
    if previous_seed.claimed || previous_seed.epoch_index != settle.epoch_index {
        return Ok(());
    }

    info!(
        epoch = settle.epoch_index,
        amount = settle.total_amount,
        "unclaimed settle amount found; sweeping missed validations"
    );

    // The tracked power starts at its boot default; pull the on-chain value
    // before resampling.
    match query.participant(participant.clone()).await {
        Ok(Some(info)) => validator.set_validator_power(info.power),
        Ok(None) => {}
        Err(err) => warn!(%err, "participant power query failed; using tracked power"),
    }

    let records = query.epoch_inferences(settle.epoch_index).await?;
    let validated: HashSet<String> = query
        .epoch_validated_ids(settle.epoch_index, participant.clone())
        .await?
        .into_iter()
        .collect();

    // Resample with the same power live validation used, or the recovered
    // set diverges from the decisions actually owed.
    let params = validator.params();
    let missed = missed_validations(
        &records,
        &validated,
        previous_seed.seed,
        &participant,
        validator.validator_power(),
        &params,
    );
    info!(missed = missed.len(), "missed validations detected");

    let results = join_all(
        missed
            .iter()
            .map(|inference_id| validator.validate_inference_by_id(inference_id, false)),
    )
    .await;
    for (inference_id, result) in missed.iter().zip(results) {
        if let Err(err) = result {
            warn!(inference_id, %err, "recovery validation failed");
        }
    }

    let claim = ChainMsg::ClaimRewards {
        seed: previous_seed.seed,
        epoch_index: previous_seed.epoch_index,
    };
    match txmgr.send_transaction_async_with_retry(claim).await {
        Ok(_) | Err(infernet_txmgr::TxError::FailedQueuedForRetry) => {}
        Err(err) => return Err(err.into()),
    }
    store.mark_seed_claimed(previous_seed.epoch_index)?;
    info!(epoch = previous_seed.epoch_index, "reward claim submitted");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, executor: &str, status: InferenceStatus) -> InferenceRecord {
        InferenceRecord {
            inference_id: id.to_owned(),
            prompt_hash: String::new(),
            executor_id: executor.to_owned(),
            model: "llama-3".to_owned(),
            node_version: String::new(),
            epoch_id: 42,
            status,
            prompt_payload: None,
            response_payload: None,
            total_power: 1_000,
            executor_power: 100,
        }
    }

    fn always_sample() -> ValidationParams {
        ValidationParams {
            min_validation_probability: 1.0,
            max_validation_probability: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn finds_unvalidated_sampled_inferences() {
        let records = vec![
            record("i1", "exec", InferenceStatus::Finished),
            record("i2", "exec", InferenceStatus::Finished),
            record("i3", "exec", InferenceStatus::Finished),
            // own inference: never sampled
            record("i4", "me", InferenceStatus::Finished),
            // never finished: not expected to be validated
            record("i5", "exec", InferenceStatus::Started),
        ];
        let validated = HashSet::from(["i2".to_owned()]);

        let missed = missed_validations(&records, &validated, 7, "me", 1, &always_sample());
        assert_eq!(missed, vec!["i1".to_owned(), "i3".to_owned()]);
    }

    #[test]
    fn empty_when_everything_validated() {
        let records = vec![record("i1", "exec", InferenceStatus::Finished)];
        let validated = HashSet::from(["i1".to_owned()]);
        assert!(missed_validations(&records, &validated, 7, "me", 1, &always_sample()).is_empty());
    }
}
