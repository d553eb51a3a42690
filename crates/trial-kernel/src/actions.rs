use std::collections::BTreeSet;

use contracts::{
    ActionPriority, ActionType, Contradiction, CredibilitySignal, ImpeachmentValue, SessionConfig,
    TestimonyEvent, TrialAction, TrialState,
};

use crate::credibility::CredibilityUpdate;
use crate::momentum::MomentumUpdate;

/// Everything the prioritizer observes about the event just processed.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub event: &'a TestimonyEvent,
    pub fresh_contradictions: &'a [Contradiction],
    pub momentum: &'a MomentumUpdate,
    pub credibility: &'a CredibilityUpdate,
}

/// Map the transition's observations to tactical actions. Every emitted
/// action is appended to `pending_actions` and returned; resolution is an
/// external operation, nothing is dropped here.
pub fn prioritize(
    state: &mut TrialState,
    config: &SessionConfig,
    ctx: ActionContext<'_>,
) -> Vec<TrialAction> {
    let mut emitted = Vec::new();

    for contradiction in ctx.fresh_contradictions {
        emitted.push(impeachment_action(state, contradiction));
    }

    if ctx.event.credibility_signal == CredibilitySignal::Harmful
        && ctx.event.exhibit_refs.is_empty()
    {
        if let Some(basis) = ctx.event.objection_flags.first() {
            let confidence = scaled_confidence(0.6, 0.1, ctx.event.objection_flags.len() - 1, 0.9);
            emitted.push(append(
                state,
                ActionPriority::P1,
                ActionType::Objection,
                basis.as_str().to_string(),
                format!("Objection, {}.", basis.as_str()),
                format!(
                    "Harmful testimony from {} matches the {} phrasing category and has no exhibit support.",
                    ctx.event.speaker_name,
                    basis.as_str()
                ),
                BTreeSet::new(),
                "An overruled objection may underline the testimony for the jury.".to_string(),
                confidence,
            ));
        }
    }

    if ctx.event.credibility_signal == CredibilitySignal::Helpful {
        let unsurfaced: BTreeSet<String> = ctx
            .event
            .exhibit_refs
            .iter()
            .filter(|exhibit| !state.surfaced_exhibits.contains(*exhibit))
            .cloned()
            .collect();
        if let Some(first) = unsurfaced.iter().next().cloned() {
            state.surfaced_exhibits.extend(unsurfaced.iter().cloned());
            emitted.push(append(
                state,
                ActionPriority::P1,
                ActionType::Exhibit,
                first.clone(),
                format!("Publish {first} and walk the witness through it now."),
                "Helpful testimony anchors to an exhibit the jury has not seen yet.".to_string(),
                unsurfaced,
                "Surfacing the exhibit gives opposing counsel time to reframe it.".to_string(),
                0.75,
            ));
        }
    }

    if ctx.event.credibility_signal == CredibilitySignal::Helpful
        && ctx.fresh_contradictions.is_empty()
        && ctx.momentum.requested_delta > 0
        && ctx.credibility.score_after > config.credibility_baseline
    {
        let margin = ctx.credibility.score_after - config.credibility_baseline;
        let topic = ctx
            .event
            .topic_tags
            .iter()
            .next()
            .cloned()
            .unwrap_or_else(|| "this account".to_string());
        emitted.push(append(
            state,
            ActionPriority::P2,
            ActionType::Reframe,
            ctx.event.speaker_name.clone(),
            format!(
                "In closing, return to {}'s account of {}.",
                ctx.event.speaker_name, topic
            ),
            "Uncontested helpful testimony; lock the narrative in before closing.".to_string(),
            ctx.event.exhibit_refs.clone(),
            "Low; the point is deferred until closing argument.".to_string(),
            scaled_confidence(0.5, 0.01, margin as usize, 0.85),
        ));
    }

    emitted.extend(update_adverse_streaks(state, config, ctx.event));

    if ctx.event.prejudice_risk {
        emitted.push(append(
            state,
            ActionPriority::P1,
            ActionType::SidebarRequest,
            ctx.event.speaker_name.clone(),
            "Request a sidebar before this line of questioning continues.".to_string(),
            "Intake flagged prejudice risk on this testimony.".to_string(),
            BTreeSet::new(),
            "Frequent sidebar requests can erode judicial patience.".to_string(),
            0.65,
        ));
    }

    emitted
}

fn impeachment_action(state: &mut TrialState, contradiction: &Contradiction) -> TrialAction {
    let rank = contradiction.impeachment_value.rank();
    let priority = if contradiction.impeachment_value >= ImpeachmentValue::High {
        ActionPriority::P0
    } else {
        ActionPriority::P1
    };
    let mut evidence_refs = contradiction.statement_a.exhibit_refs.clone();
    evidence_refs.extend(contradiction.statement_b.exhibit_refs.iter().cloned());

    append(
        state,
        priority,
        ActionType::Impeachment,
        contradiction.witness.clone(),
        format!(
            "Confront {} with the {} statement on {}: \"{}\"",
            contradiction.witness,
            contradiction.statement_b.phase.as_str(),
            contradiction.topic,
            excerpt(&contradiction.statement_b.text)
        ),
        format!(
            "The {} statement on {} conflicts with earlier {} testimony ({} impeachment value).",
            contradiction.statement_a.phase.as_str(),
            contradiction.topic,
            contradiction.statement_b.phase.as_str(),
            contradiction.impeachment_value.as_str()
        ),
        evidence_refs,
        "The witness may try to reconcile the statements; commit them to the earlier version first."
            .to_string(),
        scaled_confidence(0.55, 0.15, rank as usize, 1.0),
    )
}

/// Track consecutive harmful events per topic; a streak reaching the
/// configured threshold suggests conceding the point. Any non-harmful
/// event on the topic resets its streak.
fn update_adverse_streaks(
    state: &mut TrialState,
    config: &SessionConfig,
    event: &TestimonyEvent,
) -> Vec<TrialAction> {
    let mut emitted = Vec::new();

    if event.credibility_signal != CredibilitySignal::Harmful {
        for topic in &event.topic_tags {
            state.adverse_topic_streaks.remove(topic);
        }
        return emitted;
    }

    let threshold = config.concession_streak_threshold.max(1);
    for topic in &event.topic_tags {
        let streak = state
            .adverse_topic_streaks
            .entry(topic.clone())
            .or_insert(0);
        *streak += 1;
        if *streak < threshold {
            continue;
        }
        let run = *streak;
        state.adverse_topic_streaks.remove(topic);
        emitted.push(append(
            state,
            ActionPriority::P2,
            ActionType::Concession,
            topic.clone(),
            format!("Consider conceding the {topic} point and pivoting to stronger ground."),
            format!("{run} consecutive harmful events on {topic} with no rebuttal."),
            BTreeSet::new(),
            "A concession can be read as weakness if the topic resurfaces.".to_string(),
            scaled_confidence(0.5, 0.1, (run - threshold) as usize, 0.8),
        ));
    }

    emitted
}

fn append(
    state: &mut TrialState,
    priority: ActionPriority,
    action_type: ActionType,
    target: String,
    suggested_language: String,
    rationale: String,
    evidence_refs: BTreeSet<String>,
    risk_tradeoff: String,
    confidence: f32,
) -> TrialAction {
    let action = TrialAction {
        action_id: format!("action_{:04}", state.next_action_seq),
        priority,
        action_type,
        target,
        suggested_language,
        rationale,
        evidence_refs,
        risk_tradeoff,
        confidence,
    };
    state.next_action_seq += 1;
    state.pending_actions.push(action.clone());
    action
}

fn scaled_confidence(base: f32, step: f32, count: usize, cap: f32) -> f32 {
    (base + step * count as f32).min(cap)
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 80;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(MAX).collect();
        format!("{truncated}…")
    }
}
