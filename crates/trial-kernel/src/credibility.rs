use contracts::{CredibilitySignal, SessionConfig, TrialState};

pub const CREDIBILITY_MIN: i64 = 0;
pub const CREDIBILITY_MAX: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredibilityUpdate {
    pub score_before: i64,
    pub score_after: i64,
}

/// Update the speaker's credibility entry by the same polarity rule the
/// momentum engine uses: helpful raises, harmful lowers, and each fresh
/// contradiction lowers again. First mention seeds the configured baseline.
pub fn apply(
    state: &mut TrialState,
    config: &SessionConfig,
    speaker_name: &str,
    signal: CredibilitySignal,
    fresh_contradiction_count: usize,
) -> CredibilityUpdate {
    let entry = state
        .witness_credibility
        .entry(speaker_name.to_string())
        .or_insert(config.credibility_baseline);
    let score_before = *entry;

    let mut delta = match signal {
        CredibilitySignal::Helpful => config.credibility_gain,
        CredibilitySignal::Harmful => -config.credibility_loss,
        CredibilitySignal::Neutral => 0,
    };
    delta -= config.credibility_loss * fresh_contradiction_count as i64;

    *entry = (score_before + delta).clamp(CREDIBILITY_MIN, CREDIBILITY_MAX);

    CredibilityUpdate {
        score_before,
        score_after: *entry,
    }
}
