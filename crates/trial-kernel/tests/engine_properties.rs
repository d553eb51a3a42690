use std::collections::BTreeSet;

use contracts::{
    CredibilitySignal, SessionConfig, SpeakerRole, TestimonyEvent, TrialPhase, TrialState,
};
use proptest::prelude::*;
use trial_kernel::{read_transcript, TrialEngine};

const SPEAKERS: [&str; 3] = ["witness_a", "witness_b", "witness_c"];
const TOPICS: [&str; 4] = ["contract", "alibi", "damages", "timeline"];
const PHASES: [TrialPhase; 7] = [
    TrialPhase::Direct,
    TrialPhase::Cross,
    TrialPhase::Redirect,
    TrialPhase::Recross,
    TrialPhase::Opening,
    TrialPhase::Closing,
    TrialPhase::Sidebar,
];
const SIGNALS: [CredibilitySignal; 3] = [
    CredibilitySignal::Neutral,
    CredibilitySignal::Helpful,
    CredibilitySignal::Harmful,
];

fn event_from_parts(index: usize, speaker: usize, topic: usize, phase: usize, signal: usize) -> TestimonyEvent {
    TestimonyEvent {
        timestamp: format!("2026-03-02T{:02}:{:02}:00Z", 9 + index / 60, index % 60),
        speaker_role: SpeakerRole::Witness,
        speaker_name: SPEAKERS[speaker % SPEAKERS.len()].to_string(),
        phase: PHASES[phase % PHASES.len()],
        text: format!("statement {index}"),
        exhibit_refs: BTreeSet::new(),
        topic_tags: [TOPICS[topic % TOPICS.len()].to_string()].into_iter().collect(),
        credibility_signal: SIGNALS[signal % SIGNALS.len()],
        objection_flags: Vec::new(),
        prejudice_risk: false,
    }
}

fn event_sequence() -> impl Strategy<Value = Vec<TestimonyEvent>> {
    prop::collection::vec((0_usize..3, 0_usize..4, 0_usize..7, 0_usize..3), 0..40).prop_map(
        |parts| {
            parts
                .into_iter()
                .enumerate()
                .map(|(index, (speaker, topic, phase, signal))| {
                    event_from_parts(index, speaker, topic, phase, signal)
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn property_momentum_stays_bounded_at_every_step(events in event_sequence()) {
        let mut engine = TrialEngine::new(SessionConfig::default());
        for event in &events {
            engine.process(event);
            let score = engine.state().momentum_score;
            prop_assert!((0..=100).contains(&score), "score {} out of bounds", score);
        }
    }

    #[test]
    fn property_cursor_counts_accepted_events_exactly(events in event_sequence()) {
        let mut engine = TrialEngine::new(SessionConfig::default());
        let outcome = engine.process_batch(&events);
        prop_assert_eq!(outcome.processed, events.len() as u64);
        prop_assert_eq!(engine.events_processed(), events.len() as u64);
        prop_assert_eq!(engine.state().warning_count, 0);
    }

    #[test]
    fn property_transition_is_deterministic(events in event_sequence()) {
        let mut first = TrialEngine::new(SessionConfig::default());
        let mut second = TrialEngine::new(SessionConfig::default());
        first.process_batch(&events);
        second.process_batch(&events);
        prop_assert_eq!(first.state(), second.state());
    }

    #[test]
    fn property_resume_at_any_cut_matches_continuous_run(
        events in event_sequence(),
        cut in 0_usize..40,
    ) {
        let cut = cut.min(events.len());
        let config = SessionConfig::default();

        let mut continuous = TrialEngine::new(config.clone());
        continuous.process_batch(&events);

        let mut prefix = TrialEngine::new(config.clone());
        prefix.process_batch(&events[..cut]);
        let encoded = serde_json::to_string(prefix.state()).expect("serialize");
        let decoded: TrialState = serde_json::from_str(&encoded).expect("deserialize");

        let mut resumed = TrialEngine::resume(config, decoded);
        let cursor = resumed.events_processed() as usize;
        prop_assert_eq!(cursor, cut);
        resumed.process_batch(&events[cursor..]);

        prop_assert_eq!(resumed.state(), continuous.state());
    }

    #[test]
    fn property_state_round_trips_through_json(events in event_sequence()) {
        let mut engine = TrialEngine::new(SessionConfig::default());
        engine.process_batch(&events);

        let encoded = serde_json::to_string(engine.state()).expect("serialize");
        let decoded: TrialState = serde_json::from_str(&encoded).expect("deserialize");
        prop_assert_eq!(engine.state(), &decoded);
    }
}

#[test]
fn transcript_with_malformed_line_feeds_engine_without_interruption() {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time should be monotonic")
        .as_nanos();
    let path = std::env::temp_dir().join(format!("second_chair_props_{nanos}.jsonl"));

    let valid = |minute: u32, signal: &str| {
        format!(
            concat!(
                "{{\"timestamp\":\"2026-03-02T10:{:02}:00Z\",\"speaker_role\":\"witness\",",
                "\"speaker_name\":\"dana.w\",\"phase\":\"direct\",",
                "\"text\":\"line {}\",\"topic_tags\":[\"contract\"],",
                "\"credibility_signal\":\"{}\"}}"
            ),
            minute, minute, signal
        )
    };
    std::fs::write(
        &path,
        format!("{}\n{{broken\n{}\n", valid(1, "helpful"), valid(2, "neutral")),
    )
    .expect("write transcript");

    let batch = read_transcript(&path).expect("read transcript");
    assert_eq!(batch.events.len(), 2);
    assert_eq!(batch.warnings.len(), 1);

    let mut engine = TrialEngine::new(SessionConfig::default());
    engine.set_stream_warning_count(batch.warnings.len() as u64);
    let outcome = engine.process_batch(&batch.events);

    assert_eq!(outcome.processed, 2);
    assert_eq!(engine.events_processed(), 2);
    assert_eq!(engine.state().warning_count, 1);

    let _ = std::fs::remove_file(&path);
}
