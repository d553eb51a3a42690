use contracts::{
    Contradiction, CredibilitySignal, ImpeachmentValue, KeyAdmission, PriorStatement,
    TestimonyEvent,
};

use super::{BatchOutcome, StepOutcome, TrialEngine};
use crate::actions::{self, ActionContext};
use crate::{contradiction, credibility, momentum, source};

impl TrialEngine {
    /// The per-event transition. Total: invalid events move only the
    /// warning counter, everything else advances the state exactly once.
    /// No I/O happens here; persistence is the caller's boundary.
    pub fn process(&mut self, event: &TestimonyEvent) -> StepOutcome {
        if let Err(reason) = source::validate_event(event) {
            self.state.warning_count += 1;
            return StepOutcome {
                accepted: false,
                actions: Vec::new(),
                changes: vec![format!("rejected invalid event: {reason}")],
            };
        }

        let stream_index = self.state.events_processed;
        let mut changes = Vec::new();

        let mut fresh = contradiction::detect(&self.state, event, self.comparer.as_ref());
        for found in &mut fresh {
            found.contradiction_id =
                format!("contradiction_{:04}", self.state.next_contradiction_seq);
            self.state.next_contradiction_seq += 1;
            changes.push(format!(
                "{}: {} contradicted their {} statement on {} ({} impeachment value)",
                found.contradiction_id,
                found.witness,
                found.statement_b.phase.as_str(),
                found.topic,
                found.impeachment_value.as_str()
            ));
        }

        let gain_tiers = self.gain_eligible_tiers(event, &fresh);
        self.state.contradictions.extend(fresh.iter().cloned());
        self.record_prior_statements(event, stream_index);

        let momentum_update = momentum::apply(
            &mut self.state,
            &self.config,
            event.credibility_signal,
            !fresh.is_empty(),
            &gain_tiers,
        );
        if momentum_update.applied_delta != 0 {
            changes.push(format!(
                "momentum {} -> {} ({})",
                momentum_update.score_before,
                momentum_update.score_after,
                momentum_update.trend.as_str()
            ));
        }

        let credibility_update = credibility::apply(
            &mut self.state,
            &self.config,
            &event.speaker_name,
            event.credibility_signal,
            fresh.len(),
        );
        if credibility_update.score_after != credibility_update.score_before {
            changes.push(format!(
                "credibility of {} {} -> {}",
                event.speaker_name,
                credibility_update.score_before,
                credibility_update.score_after
            ));
        }

        let emitted = actions::prioritize(
            &mut self.state,
            &self.config,
            ActionContext {
                event,
                fresh_contradictions: &fresh,
                momentum: &momentum_update,
                credibility: &credibility_update,
            },
        );
        for action in &emitted {
            changes.push(format!(
                "queued {:?} {} action targeting {}",
                action.priority,
                action.action_type.as_str(),
                action.target
            ));
        }

        self.state.events_processed += 1;

        if event.credibility_signal.is_polar()
            && momentum_update.applied_delta.abs() >= self.config.significant_admission_threshold
        {
            self.state.key_admissions.push(KeyAdmission {
                stream_index,
                speaker_name: event.speaker_name.clone(),
                topic_tags: event.topic_tags.clone(),
                credibility_signal: event.credibility_signal,
                momentum_delta: momentum_update.applied_delta,
                timestamp: event.timestamp.clone(),
                excerpt: excerpt(&event.text),
            });
            changes.push(format!(
                "key admission recorded at index {stream_index} (delta {})",
                momentum_update.applied_delta
            ));
        }

        StepOutcome {
            accepted: true,
            actions: emitted,
            changes,
        }
    }

    /// Fold a slice of already-validated events. An empty slice leaves the
    /// state untouched.
    pub fn process_batch(&mut self, events: &[TestimonyEvent]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for event in events {
            let step = self.process(event);
            if step.accepted {
                outcome.processed += 1;
            } else {
                outcome.rejected += 1;
            }
            outcome.actions.extend(step.actions);
            outcome.changes.extend(step.changes);
        }
        outcome
    }

    /// Impeachment tiers that still feed the momentum score. Gains apply
    /// only when the incoming statement is harmful (an adverse witness
    /// caught flipping); pairs whose witness/topic already carry an
    /// exploited contradiction are withheld when the discount policy is on.
    fn gain_eligible_tiers(
        &self,
        event: &TestimonyEvent,
        fresh: &[Contradiction],
    ) -> Vec<ImpeachmentValue> {
        if event.credibility_signal != CredibilitySignal::Harmful {
            return Vec::new();
        }
        fresh
            .iter()
            .filter(|found| !self.gain_suppressed(found))
            .map(|found| found.impeachment_value)
            .collect()
    }

    fn gain_suppressed(&self, found: &Contradiction) -> bool {
        self.config.exploited_contradictions_discounted
            && self.state.contradictions.iter().any(|prior| {
                prior.exploited && prior.witness == found.witness && prior.topic == found.topic
            })
    }

    /// Append the event to the (speaker, topic) index. History stays:
    /// superseded entries are retained so later re-contradiction is still
    /// detectable against the full record.
    fn record_prior_statements(&mut self, event: &TestimonyEvent, stream_index: u64) {
        for topic in &event.topic_tags {
            self.state
                .prior_statements
                .entry(event.speaker_name.clone())
                .or_default()
                .entry(topic.clone())
                .or_default()
                .push(PriorStatement {
                    speaker_name: event.speaker_name.clone(),
                    topic: topic.clone(),
                    text: event.text.clone(),
                    phase: event.phase,
                    timestamp: event.timestamp.clone(),
                    credibility_signal: event.credibility_signal,
                    exhibit_refs: event.exhibit_refs.clone(),
                    stream_index,
                });
        }
    }
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 160;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(MAX).collect();
        format!("{truncated}…")
    }
}
