use contracts::{CredibilitySignal, ImpeachmentValue, MomentumTrend, SessionConfig, TrialState};

pub const MOMENTUM_MIN: i64 = 0;
pub const MOMENTUM_MAX: i64 = 100;

/// Outcome of one momentum step, before/after values included so the
/// orchestrator can describe the change and gate key-admission capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MomentumUpdate {
    pub requested_delta: i64,
    /// Delta actually realized after clamping into [0, 100].
    pub applied_delta: i64,
    pub score_before: i64,
    pub score_after: i64,
    pub trend: MomentumTrend,
}

/// Apply one event's worth of momentum policy to the state.
///
/// `contradicted` marks an event the detector just flagged against the
/// speaker's own history; `gain_tiers` lists the impeachment tiers of the
/// fresh contradictions still eligible to feed the score (the orchestrator
/// withholds tiers suppressed by the exploited-contradiction policy).
/// Deltas come from config; clamping, the trailing window, and the trend
/// rule are structural and hold for any configured values.
pub fn apply(
    state: &mut TrialState,
    config: &SessionConfig,
    signal: CredibilitySignal,
    contradicted: bool,
    gain_tiers: &[ImpeachmentValue],
) -> MomentumUpdate {
    let mut requested_delta = match signal {
        CredibilitySignal::Helpful if !contradicted => config.helpful_gain,
        CredibilitySignal::Helpful => 0,
        CredibilitySignal::Harmful if contradicted => -config.contradicted_harmful_loss,
        CredibilitySignal::Harmful => -config.harmful_loss,
        CredibilitySignal::Neutral => 0,
    };

    for tier in gain_tiers {
        requested_delta += config.contradiction_gain(*tier);
    }

    let score_before = state.momentum_score;
    let score_after = (score_before + requested_delta).clamp(MOMENTUM_MIN, MOMENTUM_MAX);
    let applied_delta = score_after - score_before;

    state.momentum_score = score_after;
    push_window(state, config, applied_delta);
    state.momentum_trend = trend_of(&state.momentum_window);

    MomentumUpdate {
        requested_delta,
        applied_delta,
        score_before,
        score_after,
        trend: state.momentum_trend,
    }
}

fn push_window(state: &mut TrialState, config: &SessionConfig, delta: i64) {
    state.momentum_window.push(delta);
    let window = config.trend_window.max(1);
    if state.momentum_window.len() > window {
        let overflow = state.momentum_window.len() - window;
        state.momentum_window.drain(..overflow);
    }
}

/// Sign of the net change over the trailing window.
pub fn trend_of(window: &[i64]) -> MomentumTrend {
    let net: i64 = window.iter().sum();
    if net > 0 {
        MomentumTrend::Improving
    } else if net < 0 {
        MomentumTrend::Declining
    } else {
        MomentumTrend::Stable
    }
}
