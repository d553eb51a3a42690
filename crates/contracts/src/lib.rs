//! v1 cross-boundary contracts for the trial kernel, API facade, persistence, and CLI.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION_V1: &str = "1.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    Witness,
    Attorney,
    Judge,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    Direct,
    Cross,
    Redirect,
    Recross,
    Opening,
    Closing,
    Sidebar,
}

impl TrialPhase {
    /// Ordinal within the examination sequence; non-examination phases have none.
    pub fn examination_ordinal(self) -> Option<u8> {
        match self {
            Self::Direct => Some(0),
            Self::Cross => Some(1),
            Self::Redirect => Some(2),
            Self::Recross => Some(3),
            Self::Opening | Self::Closing | Self::Sidebar => None,
        }
    }

    pub fn is_examination(self) -> bool {
        self.examination_ordinal().is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Cross => "cross",
            Self::Redirect => "redirect",
            Self::Recross => "recross",
            Self::Opening => "opening",
            Self::Closing => "closing",
            Self::Sidebar => "sidebar",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CredibilitySignal {
    Neutral,
    Helpful,
    Harmful,
}

impl CredibilitySignal {
    pub fn is_polar(self) -> bool {
        !matches!(self, Self::Neutral)
    }

    /// Opposing polarity relative to the case posture.
    pub fn opposes(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Helpful, Self::Harmful) | (Self::Harmful, Self::Helpful)
        )
    }
}

/// Objection-trigger phrasing category supplied by the upstream intake
/// classifier. The engine consumes these; it never derives them from text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectionBasis {
    Hearsay,
    Speculation,
    Leading,
    Relevance,
    Compound,
    Argumentative,
    Narrative,
}

impl ObjectionBasis {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hearsay => "hearsay",
            Self::Speculation => "speculation",
            Self::Leading => "leading",
            Self::Relevance => "relevance",
            Self::Compound => "compound",
            Self::Argumentative => "argumentative",
            Self::Narrative => "narrative",
        }
    }
}

/// One structured transcript record, one per stream line. Unknown extra
/// fields on the wire are ignored; the mandatory fields below must parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestimonyEvent {
    pub timestamp: String,
    pub speaker_role: SpeakerRole,
    pub speaker_name: String,
    pub phase: TrialPhase,
    pub text: String,
    #[serde(default)]
    pub exhibit_refs: BTreeSet<String>,
    #[serde(default)]
    pub topic_tags: BTreeSet<String>,
    pub credibility_signal: CredibilitySignal,
    #[serde(default)]
    pub objection_flags: Vec<ObjectionBasis>,
    #[serde(default)]
    pub prejudice_risk: bool,
}

/// One side of a contradiction, with its phase label retained.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatementRef {
    pub text: String,
    pub phase: TrialPhase,
    pub timestamp: String,
    pub credibility_signal: CredibilitySignal,
    #[serde(default)]
    pub exhibit_refs: BTreeSet<String>,
}

impl StatementRef {
    pub fn from_event(event: &TestimonyEvent) -> Self {
        Self {
            text: event.text.clone(),
            phase: event.phase,
            timestamp: event.timestamp.clone(),
            credibility_signal: event.credibility_signal,
            exhibit_refs: event.exhibit_refs.clone(),
        }
    }
}

/// Retained per (speaker, topic). Superseded entries are kept so later
/// re-contradiction checks run against the full history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriorStatement {
    pub speaker_name: String,
    pub topic: String,
    pub text: String,
    pub phase: TrialPhase,
    pub timestamp: String,
    pub credibility_signal: CredibilitySignal,
    #[serde(default)]
    pub exhibit_refs: BTreeSet<String>,
    /// Position in the processed stream, used as the recency fallback when
    /// timestamps do not order the pair.
    #[serde(with = "serde_u64_string")]
    pub stream_index: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ImpeachmentValue {
    Low,
    Moderate,
    High,
    Critical,
}

impl ImpeachmentValue {
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Moderate => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A detected conflict between two statements by the same witness on the
/// same topic. Identity fields are immutable after creation; only
/// `exploited` may change, via an explicit external call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contradiction {
    pub contradiction_id: String,
    pub topic: String,
    pub witness: String,
    pub detected_at: String,
    /// The newer statement (the incoming event at detection time).
    pub statement_a: StatementRef,
    /// The older statement it conflicts with.
    pub statement_b: StatementRef,
    pub impeachment_value: ImpeachmentValue,
    #[serde(default)]
    pub exploited: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionPriority {
    P0,
    P1,
    P2,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Impeachment,
    Objection,
    Exhibit,
    Reframe,
    Concession,
    SidebarRequest,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Impeachment => "impeachment",
            Self::Objection => "objection",
            Self::Exhibit => "exhibit",
            Self::Reframe => "reframe",
            Self::Concession => "concession",
            Self::SidebarRequest => "sidebar_request",
        }
    }
}

/// Advisory tactical suggestion. Never legal advice; never silently
/// dropped once appended to `pending_actions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialAction {
    pub action_id: String,
    pub priority: ActionPriority,
    pub action_type: ActionType,
    /// Witness name, objection basis, or exhibit id depending on type.
    pub target: String,
    pub suggested_language: String,
    pub rationale: String,
    #[serde(default)]
    pub evidence_refs: BTreeSet<String>,
    pub risk_tradeoff: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MomentumTrend {
    Improving,
    Stable,
    Declining,
}

impl MomentumTrend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }
}

/// Event reference flagged as a high-confidence helpful/harmful admission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyAdmission {
    #[serde(with = "serde_u64_string")]
    pub stream_index: u64,
    pub speaker_name: String,
    pub topic_tags: BTreeSet<String>,
    pub credibility_signal: CredibilitySignal,
    pub momentum_delta: i64,
    pub timestamp: String,
    pub excerpt: String,
}

/// The persisted aggregate. Created once per session, mutated exclusively
/// by the trial engine's per-event transition, replaced atomically on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialState {
    pub schema_version: String,
    pub session_id: String,
    /// Resume cursor: count of valid events already incorporated.
    #[serde(with = "serde_u64_string")]
    pub events_processed: u64,
    /// Malformed or invalid records skipped so far. Never advances the cursor.
    #[serde(default)]
    pub warning_count: u64,
    pub momentum_score: i64,
    pub momentum_trend: MomentumTrend,
    /// Trailing per-event momentum deltas, capped at the configured window.
    #[serde(default)]
    pub momentum_window: Vec<i64>,
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
    #[serde(default)]
    pub pending_actions: Vec<TrialAction>,
    #[serde(default)]
    pub witness_credibility: BTreeMap<String, i64>,
    #[serde(default)]
    pub key_admissions: Vec<KeyAdmission>,
    /// speaker -> topic -> statements, in arrival order. Entries are
    /// appended, never overwritten.
    #[serde(default)]
    pub prior_statements: BTreeMap<String, BTreeMap<String, Vec<PriorStatement>>>,
    /// Exhibits already suggested once; an exhibit action fires only for
    /// references not in this set.
    #[serde(default)]
    pub surfaced_exhibits: BTreeSet<String>,
    /// Consecutive harmful-signal count per topic, for concession detection.
    #[serde(default)]
    pub adverse_topic_streaks: BTreeMap<String, u32>,
    #[serde(default)]
    pub next_contradiction_seq: u64,
    #[serde(default)]
    pub next_action_seq: u64,
}

impl TrialState {
    pub fn fresh(config: &SessionConfig) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            session_id: config.session_id.clone(),
            events_processed: 0,
            warning_count: 0,
            momentum_score: config.momentum_baseline,
            momentum_trend: MomentumTrend::Stable,
            momentum_window: Vec::new(),
            contradictions: Vec::new(),
            pending_actions: Vec::new(),
            witness_credibility: BTreeMap::new(),
            key_admissions: Vec::new(),
            prior_statements: BTreeMap::new(),
            surfaced_exhibits: BTreeSet::new(),
            adverse_topic_streaks: BTreeMap::new(),
            next_contradiction_seq: 0,
            next_action_seq: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            session_id: self.session_id.clone(),
            events_processed: self.events_processed,
            warning_count: self.warning_count,
            momentum_score: self.momentum_score,
            momentum_trend: self.momentum_trend,
            contradiction_count: self.contradictions.len(),
            pending_action_count: self.pending_actions.len(),
            key_admission_count: self.key_admissions.len(),
        }
    }

    pub fn prior_statements_for(&self, speaker: &str, topic: &str) -> &[PriorStatement] {
        self.prior_statements
            .get(speaker)
            .and_then(|topics| topics.get(topic))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionStatus {
    pub schema_version: String,
    pub session_id: String,
    #[serde(with = "serde_u64_string")]
    pub events_processed: u64,
    pub warning_count: u64,
    pub momentum_score: i64,
    pub momentum_trend: MomentumTrend,
    pub contradiction_count: usize,
    pub pending_action_count: usize,
    pub key_admission_count: usize,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session_id={} processed={} warnings={} momentum={} trend={} contradictions={} pending_actions={}",
            self.session_id,
            self.events_processed,
            self.warning_count,
            self.momentum_score,
            self.momentum_trend.as_str(),
            self.contradiction_count,
            self.pending_action_count
        )
    }
}

/// Every numeric delta below is policy, not structure: the engine clamps,
/// windows, and bounds identically for any values chosen here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub schema_version: String,
    pub session_id: String,
    #[serde(default)]
    pub case_name: String,
    #[serde(default = "default_momentum_baseline")]
    pub momentum_baseline: i64,
    #[serde(default = "default_helpful_gain")]
    pub helpful_gain: i64,
    #[serde(default = "default_harmful_loss")]
    pub harmful_loss: i64,
    /// Applied instead of `harmful_loss` when the harmful statement is
    /// itself contradicted by the witness's own prior helpful statement.
    #[serde(default = "default_contradicted_harmful_loss")]
    pub contradicted_harmful_loss: i64,
    #[serde(default = "default_contradiction_gain_low")]
    pub contradiction_gain_low: i64,
    #[serde(default = "default_contradiction_gain_moderate")]
    pub contradiction_gain_moderate: i64,
    #[serde(default = "default_contradiction_gain_high")]
    pub contradiction_gain_high: i64,
    #[serde(default = "default_contradiction_gain_critical")]
    pub contradiction_gain_critical: i64,
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    /// |net momentum delta| at or above this marks a key admission.
    #[serde(default = "default_significant_admission_threshold")]
    pub significant_admission_threshold: i64,
    #[serde(default = "default_credibility_baseline")]
    pub credibility_baseline: i64,
    #[serde(default = "default_credibility_gain")]
    pub credibility_gain: i64,
    #[serde(default = "default_credibility_loss")]
    pub credibility_loss: i64,
    /// Consecutive harmful events on one topic before a concession is suggested.
    #[serde(default = "default_concession_streak_threshold")]
    pub concession_streak_threshold: u32,
    /// When set, contradictions marked exploited stop contributing the
    /// per-event contradiction gain.
    #[serde(default = "default_true")]
    pub exploited_contradictions_discounted: bool,
    /// Archive snapshot cadence, in processed events.
    #[serde(default = "default_snapshot_every_events")]
    pub snapshot_every_events: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    pub notes: Option<String>,
}

impl SessionConfig {
    pub fn contradiction_gain(&self, value: ImpeachmentValue) -> i64 {
        match value {
            ImpeachmentValue::Low => self.contradiction_gain_low,
            ImpeachmentValue::Moderate => self.contradiction_gain_moderate,
            ImpeachmentValue::High => self.contradiction_gain_high,
            ImpeachmentValue::Critical => self.contradiction_gain_critical,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            session_id: "session_local_001".to_string(),
            case_name: String::new(),
            momentum_baseline: default_momentum_baseline(),
            helpful_gain: default_helpful_gain(),
            harmful_loss: default_harmful_loss(),
            contradicted_harmful_loss: default_contradicted_harmful_loss(),
            contradiction_gain_low: default_contradiction_gain_low(),
            contradiction_gain_moderate: default_contradiction_gain_moderate(),
            contradiction_gain_high: default_contradiction_gain_high(),
            contradiction_gain_critical: default_contradiction_gain_critical(),
            trend_window: default_trend_window(),
            significant_admission_threshold: default_significant_admission_threshold(),
            credibility_baseline: default_credibility_baseline(),
            credibility_gain: default_credibility_gain(),
            credibility_loss: default_credibility_loss(),
            concession_streak_threshold: default_concession_streak_threshold(),
            exploited_contradictions_discounted: default_true(),
            snapshot_every_events: default_snapshot_every_events(),
            poll_interval_ms: default_poll_interval_ms(),
            notes: None,
        }
    }
}

fn default_momentum_baseline() -> i64 {
    50
}

fn default_helpful_gain() -> i64 {
    3
}

fn default_harmful_loss() -> i64 {
    5
}

fn default_contradicted_harmful_loss() -> i64 {
    2
}

fn default_contradiction_gain_low() -> i64 {
    2
}

fn default_contradiction_gain_moderate() -> i64 {
    4
}

fn default_contradiction_gain_high() -> i64 {
    6
}

fn default_contradiction_gain_critical() -> i64 {
    8
}

fn default_trend_window() -> usize {
    5
}

fn default_significant_admission_threshold() -> i64 {
    4
}

fn default_credibility_baseline() -> i64 {
    50
}

fn default_credibility_gain() -> i64 {
    4
}

fn default_credibility_loss() -> i64 {
    6
}

fn default_concession_streak_threshold() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_snapshot_every_events() -> u64 {
    25
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SessionNotFound,
    InvalidQuery,
    InvalidCommand,
    StateConflict,
    ContractVersionUnsupported,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

pub mod serde_u64_string {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u64>().map_err(D::Error::custom)
    }
}
