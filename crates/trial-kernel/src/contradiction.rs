use chrono::DateTime;
use contracts::{
    Contradiction, ImpeachmentValue, PriorStatement, StatementRef, TestimonyEvent, TrialPhase,
    TrialState,
};

/// Pluggable deep-text comparison. The detector's structural contract
/// (same speaker, same topic, opposing polarity) stays fixed; a stricter
/// semantic comparer can be swapped in without touching the state machine.
pub trait StatementComparer: Send + Sync {
    fn conflicts(&self, prior: &PriorStatement, event: &TestimonyEvent) -> bool;
}

/// Default comparer: polarity alone decides, text is never inspected.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolarityComparer;

impl StatementComparer for PolarityComparer {
    fn conflicts(&self, _prior: &PriorStatement, _event: &TestimonyEvent) -> bool {
        false
    }
}

/// Scan the incoming event against the retained statement index.
/// At most one contradiction per topic tag; when several priors qualify the
/// most recent one (by timestamp, stream order as fallback) becomes the
/// counterpart. The index itself is not mutated here.
pub fn detect(
    state: &TrialState,
    event: &TestimonyEvent,
    comparer: &dyn StatementComparer,
) -> Vec<Contradiction> {
    let mut found = Vec::new();

    for topic in &event.topic_tags {
        let priors = state.prior_statements_for(&event.speaker_name, topic);
        let qualifying = priors.iter().filter(|prior| {
            prior.credibility_signal.opposes(event.credibility_signal)
                || comparer.conflicts(prior, event)
        });

        let Some(counterpart) = most_recent(qualifying) else {
            continue;
        };

        found.push(Contradiction {
            contradiction_id: String::new(),
            topic: topic.clone(),
            witness: event.speaker_name.clone(),
            detected_at: event.timestamp.clone(),
            statement_a: StatementRef::from_event(event),
            statement_b: StatementRef {
                text: counterpart.text.clone(),
                phase: counterpart.phase,
                timestamp: counterpart.timestamp.clone(),
                credibility_signal: counterpart.credibility_signal,
                exhibit_refs: counterpart.exhibit_refs.clone(),
            },
            impeachment_value: impeachment_value(counterpart, event),
            exploited: false,
        });
    }

    found
}

/// Phase distance drives the tier: a span across direct and cross is the
/// classic impeachment setup and ranks high, any other cross-phase span
/// ranks moderate, a single-phase conflict ranks low. Opposite-polarity
/// spans backed by an exhibit on either side upgrade to critical.
pub fn impeachment_value(prior: &PriorStatement, event: &TestimonyEvent) -> ImpeachmentValue {
    let base = match (
        prior.phase.examination_ordinal(),
        event.phase.examination_ordinal(),
    ) {
        (Some(a), Some(b)) if a != b => {
            if spans_direct_and_cross(prior.phase, event.phase) {
                ImpeachmentValue::High
            } else {
                ImpeachmentValue::Moderate
            }
        }
        _ => ImpeachmentValue::Low,
    };

    let exhibit_backed = !prior.exhibit_refs.is_empty() || !event.exhibit_refs.is_empty();
    if base == ImpeachmentValue::High
        && exhibit_backed
        && prior.credibility_signal.opposes(event.credibility_signal)
    {
        ImpeachmentValue::Critical
    } else {
        base
    }
}

fn spans_direct_and_cross(a: TrialPhase, b: TrialPhase) -> bool {
    matches!(
        (a, b),
        (TrialPhase::Direct, TrialPhase::Cross) | (TrialPhase::Cross, TrialPhase::Direct)
    )
}

/// Most recent statement by parsed timestamp; stream order decides when
/// either timestamp fails to parse.
fn most_recent<'a>(
    candidates: impl Iterator<Item = &'a PriorStatement>,
) -> Option<&'a PriorStatement> {
    candidates.reduce(|best, candidate| {
        if is_more_recent(candidate, best) {
            candidate
        } else {
            best
        }
    })
}

fn is_more_recent(candidate: &PriorStatement, best: &PriorStatement) -> bool {
    let parsed_candidate = DateTime::parse_from_rfc3339(&candidate.timestamp).ok();
    let parsed_best = DateTime::parse_from_rfc3339(&best.timestamp).ok();
    match (parsed_candidate, parsed_best) {
        (Some(a), Some(b)) if a != b => a > b,
        _ => candidate.stream_index > best.stream_index,
    }
}
