//! Keyed routing of tx events to handlers.

use infernet_chain::TxEventData;

/// What a tx event asks the control plane to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxAction {
    /// `inference_finished.inference_id`: candidate for validation sampling.
    ValidateInference { inference_id: String },
    /// `inference_validation.needs_revalidation=true`: re-verify.
    Revalidate { inference_id: String },
    /// `training_task_assigned.task_id`: hand to the training executor.
    TrainingAssigned { task_id: String },
    /// `submit_proposal.proposal_id`: logged for the operator.
    ProposalSubmitted { proposal_id: String },
    /// Typed BLS events, routed to the BLS subsystem.
    Bls,
}

/// Flattens one tx event into the actions it triggers, in attribute order.
pub fn classify_tx_event(event: &TxEventData) -> Vec<TxAction> {
    let mut actions = Vec::new();

    if let Some(ids) = event.attributes.get("inference_finished.inference_id") {
        for inference_id in ids {
            actions.push(TxAction::ValidateInference {
                inference_id: inference_id.clone(),
            });
        }
    }

    if event.has_flag("inference_validation.needs_revalidation", "true") {
        if let Some(ids) = event.attributes.get("inference_validation.inference_id") {
            for inference_id in ids {
                actions.push(TxAction::Revalidate {
                    inference_id: inference_id.clone(),
                });
            }
        }
    }

    if let Some(tasks) = event.attributes.get("training_task_assigned.task_id") {
        for task_id in tasks {
            actions.push(TxAction::TrainingAssigned {
                task_id: task_id.clone(),
            });
        }
    }

    if let Some(proposals) = event.attributes.get("submit_proposal.proposal_id") {
        for proposal_id in proposals {
            actions.push(TxAction::ProposalSubmitted {
                proposal_id: proposal_id.clone(),
            });
        }
    }

    if event.attributes.keys().any(|key| key.starts_with("bls.")) {
        actions.push(TxAction::Bls);
    }

    actions
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn event(attributes: &[(&str, &[&str])]) -> TxEventData {
        TxEventData {
            height: 10,
            attributes: attributes
                .iter()
                .map(|(key, values)| {
                    (
                        (*key).to_owned(),
                        values.iter().map(|v| (*v).to_owned()).collect::<Vec<_>>(),
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn finished_inferences_route_to_validation() {
        let actions = classify_tx_event(&event(&[(
            "inference_finished.inference_id",
            &["a", "b"],
        )]));
        assert_eq!(
            actions,
            vec![
                TxAction::ValidateInference {
                    inference_id: "a".to_owned()
                },
                TxAction::ValidateInference {
                    inference_id: "b".to_owned()
                },
            ]
        );
    }

    #[test]
    fn revalidation_requires_the_flag() {
        let without_flag = classify_tx_event(&event(&[(
            "inference_validation.inference_id",
            &["a"],
        )]));
        assert!(without_flag.is_empty());

        let with_flag = classify_tx_event(&event(&[
            ("inference_validation.inference_id", &["a"]),
            ("inference_validation.needs_revalidation", &["true"]),
        ]));
        assert_eq!(
            with_flag,
            vec![TxAction::Revalidate {
                inference_id: "a".to_owned()
            }]
        );
    }

    #[test]
    fn bls_events_route_once() {
        let actions = classify_tx_event(&event(&[
            ("bls.epoch_id", &["4"]),
            ("bls.round", &["2"]),
        ]));
        assert_eq!(actions, vec![TxAction::Bls]);
    }

    #[test]
    fn unknown_events_yield_nothing() {
        assert!(classify_tx_event(&event(&[("transfer.amount", &["5"])])).is_empty());
    }
}
