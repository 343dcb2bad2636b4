//! Completion counting under arbitrary duplicate delivery.

mod common;

use common::*;
use dal_ledger::{LedgerGateway, ProjectSetup};
use dal_types::{ParticipantAddress, Phase};
use proptest::prelude::*;
use std::collections::HashSet;

const BATCH: usize = 8;

struct Observation {
    before: Option<usize>,
    after: Option<usize>,
    phase: Phase,
}

fn replay(picks: &[usize]) -> Vec<Observation> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let harness = Harness::new(ProjectSetup::new(COORDINATOR));
        let names: Vec<String> = (0..BATCH).map(|i| format!("s{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        harness
            .ledger
            .start_batch_voting(
                &project(),
                &ParticipantAddress::from(COORDINATOR),
                &batch(&refs),
            )
            .await
            .unwrap();

        let session = harness.contributor().await;
        assert_eq!(session.snapshot().phase, Phase::Voting);

        let mut observations = Vec::with_capacity(picks.len());
        for &pick in picks {
            let before = session.snapshot().completed_samples();
            session
                .apply_ledger_event(completed(1, &names[pick]))
                .await
                .unwrap();
            let snapshot = session.snapshot();
            observations.push(Observation {
                before,
                after: snapshot.completed_samples(),
                phase: snapshot.phase,
            });
        }
        session.end().await;
        observations
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn completed_count_equals_distinct_samples(picks in prop::collection::vec(0usize..BATCH, 1..24)) {
        let observations = replay(&picks);
        let mut distinct = HashSet::new();

        for (pick, observed) in picks.iter().zip(&observations) {
            let voting_before = observed.before.is_some();
            distinct.insert(*pick);

            if !voting_before {
                // Batch already closed: later completions change nothing.
                prop_assert_ne!(observed.phase, Phase::Voting);
                continue;
            }
            if distinct.len() < BATCH {
                prop_assert_eq!(observed.phase, Phase::Voting);
                prop_assert_eq!(observed.after, Some(distinct.len()));
                let step = observed.after.unwrap_or(0) - observed.before.unwrap_or(0);
                prop_assert!(step <= 1);
            } else {
                prop_assert_ne!(observed.phase, Phase::Voting);
            }
        }
        prop_assert_eq!(
            observations.last().map(|o| o.phase == Phase::Voting),
            Some(distinct.len() < BATCH)
        );
    }
}
