//! Complexity scoring for units of work.
//!
//! A unit of work is described by a [`WorkEstimate`]. Eight independent
//! signals are derived from it, each with a fixed weight; the score is the
//! sum of matched weights (0-18) and maps onto a [`Tier`]. The tier decides
//! whether decomposition into child records is skipped, offered, required
//! or mandatory.
//!
//! # Example
//!
//! ```
//! use workbook::models::complexity::{score_estimate, Tier, WorkEstimate};
//!
//! let estimate = WorkEstimate {
//!     effort_days: Some(5.0),
//!     subsystems: 4,
//!     components: 5,
//!     deliverables: 6,
//!     ..Default::default()
//! };
//! let score = score_estimate(&estimate);
//!
//! assert_eq!(score.score, 12);
//! assert_eq!(score.tier, Tier::VeryComplex);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use super::body;
use crate::{Error, Result};

/// Whole-word phrases that suggest the requirements are not settled.
static UNCERTAINTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(maybe|might|possibly|probably|perhaps|could\s+be|unclear|tbd|to\s+be\s+determined|investigat(?:e|es|ing)|figure\s+out)\b",
    )
    .expect("Invalid uncertainty regex")
});

/// Thresholds for the scoring signals.
pub mod thresholds {
    /// Effort above this many working days counts as multi-day.
    pub const MULTI_DAY_EFFORT_DAYS: f64 = 2.0;

    /// Minimum subsystems affected to trigger the subsystem signal.
    pub const MIN_SUBSYSTEMS: usize = 3;

    /// Minimum distinct components touched.
    pub const MIN_COMPONENTS: usize = 3;

    /// Minimum distinct deliverable outcomes.
    pub const MIN_DELIVERABLES: usize = 4;

    /// Minimum downstream items blocked ("multiple").
    pub const MIN_DOWNSTREAM_BLOCKED: usize = 2;

    /// Acceptance criteria above this count trigger the criteria signal.
    pub const MAX_ACCEPTANCE_CRITERIA: usize = 10;

    /// Size points above this trigger the size signal.
    pub const MAX_SIZE_POINTS: u32 = 8;

    /// Recommended child count range for a decomposition.
    pub const MIN_CHILDREN: usize = 3;
    pub const MAX_CHILDREN: usize = 8;

    /// Hours in a working day, for effort strings like "16h".
    pub const HOURS_PER_DAY: f64 = 8.0;

    /// Working days in a week, for effort strings like "2w".
    pub const DAYS_PER_WEEK: f64 = 5.0;
}

/// One of the eight weighted complexity signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    EffortExceeded,
    ManySubsystems,
    ManyComponents,
    UncertainRequirements,
    ManyDeliverables,
    BlocksDownstream,
    ManyAcceptanceCriteria,
    OversizedEstimate,
}

impl Signal {
    /// Fixed weight of the signal.
    pub fn weight(&self) -> u8 {
        match self {
            Signal::EffortExceeded => 4,
            Signal::ManySubsystems => 3,
            Signal::ManyComponents => 3,
            Signal::UncertainRequirements => 2,
            Signal::ManyDeliverables => 2,
            Signal::BlocksDownstream => 2,
            Signal::ManyAcceptanceCriteria => 1,
            Signal::OversizedEstimate => 1,
        }
    }

    pub fn all() -> &'static [Signal] {
        &[
            Signal::EffortExceeded,
            Signal::ManySubsystems,
            Signal::ManyComponents,
            Signal::UncertainRequirements,
            Signal::ManyDeliverables,
            Signal::BlocksDownstream,
            Signal::ManyAcceptanceCriteria,
            Signal::OversizedEstimate,
        ]
    }

    /// Human-readable description.
    pub fn describe(&self) -> &'static str {
        match self {
            Signal::EffortExceeded => "estimated effort exceeds a multi-day threshold",
            Signal::ManySubsystems => "affects 3 or more subsystems",
            Signal::ManyComponents => "touches 3 or more distinct components",
            Signal::UncertainRequirements => "requirements are substantially uncertain",
            Signal::ManyDeliverables => "has 4 or more distinct deliverable outcomes",
            Signal::BlocksDownstream => "blocks multiple downstream items",
            Signal::ManyAcceptanceCriteria => "has more than 10 acceptance criteria",
            Signal::OversizedEstimate => "size estimate exceeds the size-point threshold",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Measured inputs for scoring a unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkEstimate {
    /// Estimated effort in working days
    pub effort_days: Option<f64>,
    pub subsystems: usize,
    pub components: usize,
    pub requirements_uncertain: bool,
    pub deliverables: usize,
    /// Number of records that depend on this one
    pub downstream_blocked: usize,
    pub acceptance_criteria: usize,
    pub size_points: Option<u32>,
}

impl WorkEstimate {
    /// Signals matched by this estimate, in weight order.
    pub fn signals(&self) -> Vec<Signal> {
        use thresholds::*;

        let mut signals = Vec::new();
        if self.effort_days.is_some_and(|d| d > MULTI_DAY_EFFORT_DAYS) {
            signals.push(Signal::EffortExceeded);
        }
        if self.subsystems >= MIN_SUBSYSTEMS {
            signals.push(Signal::ManySubsystems);
        }
        if self.components >= MIN_COMPONENTS {
            signals.push(Signal::ManyComponents);
        }
        if self.requirements_uncertain {
            signals.push(Signal::UncertainRequirements);
        }
        if self.deliverables >= MIN_DELIVERABLES {
            signals.push(Signal::ManyDeliverables);
        }
        if self.downstream_blocked >= MIN_DOWNSTREAM_BLOCKED {
            signals.push(Signal::BlocksDownstream);
        }
        if self.acceptance_criteria > MAX_ACCEPTANCE_CRITERIA {
            signals.push(Signal::ManyAcceptanceCriteria);
        }
        if self.size_points.is_some_and(|p| p > MAX_SIZE_POINTS) {
            signals.push(Signal::OversizedEstimate);
        }
        signals
    }
}

/// Classification of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

/// What the tier implies for decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionPolicy {
    /// No decomposition
    NotNeeded,
    /// Ask the caller; proceed only on acceptance
    AskCaller,
    /// Required; the caller may decline once with an explicit override
    Required,
    /// Mandatory; no override
    Mandatory,
}

impl Tier {
    /// Classify a score: 0-3 Simple, 4-6 Moderate, 7-10 Complex, 11+ VeryComplex.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=3 => Tier::Simple,
            4..=6 => Tier::Moderate,
            7..=10 => Tier::Complex,
            _ => Tier::VeryComplex,
        }
    }

    pub fn policy(&self) -> DecompositionPolicy {
        match self {
            Tier::Simple => DecompositionPolicy::NotNeeded,
            Tier::Moderate => DecompositionPolicy::AskCaller,
            Tier::Complex => DecompositionPolicy::Required,
            Tier::VeryComplex => DecompositionPolicy::Mandatory,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Simple => "simple",
            Tier::Moderate => "moderate",
            Tier::Complex => "complex",
            Tier::VeryComplex => "very_complex",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The caller's answer to a decomposition prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerDecision {
    Accept,
    Decline,
    /// Decline with explicit override (only honoured for `Complex`)
    Override,
}

impl std::str::FromStr for CallerDecision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "accept" | "yes" => Ok(CallerDecision::Accept),
            "decline" | "no" => Ok(CallerDecision::Decline),
            "override" => Ok(CallerDecision::Override),
            _ => Err(Error::InvalidInput(format!("Invalid decision: {}", s))),
        }
    }
}

/// Outcome of applying a caller decision to a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Decompose,
    Skip,
}

/// Result of complexity scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComplexityScore {
    /// Sum of matched weights (0-18).
    pub score: u8,

    pub tier: Tier,

    /// Signals that matched.
    pub signals: Vec<Signal>,

    /// Human-readable reasons for the assessment.
    pub reasons: Vec<String>,
}

impl ComplexityScore {
    /// Create a new empty score.
    pub fn new() -> Self {
        Self {
            score: 0,
            tier: Tier::Simple,
            signals: Vec::new(),
            reasons: Vec::new(),
        }
    }

    /// Add a matched signal. Adding the same signal twice has no effect.
    pub fn add(&mut self, signal: Signal) {
        if self.signals.contains(&signal) {
            return;
        }
        self.score = self.score.saturating_add(signal.weight());
        self.tier = Tier::from_score(self.score);
        self.signals.push(signal);
        self.reasons
            .push(format!("{} (+{})", signal.describe(), signal.weight()));
    }

    /// Apply a caller decision according to the tier's policy.
    pub fn resolve(&self, decision: CallerDecision) -> Result<Verdict> {
        match (self.tier.policy(), decision) {
            (DecompositionPolicy::NotNeeded, _) => Ok(Verdict::Skip),
            (DecompositionPolicy::AskCaller, CallerDecision::Accept) => Ok(Verdict::Decompose),
            (DecompositionPolicy::AskCaller, _) => Ok(Verdict::Skip),
            (DecompositionPolicy::Required, CallerDecision::Override) => Ok(Verdict::Skip),
            (DecompositionPolicy::Required, CallerDecision::Accept) => Ok(Verdict::Decompose),
            (DecompositionPolicy::Required, CallerDecision::Decline) => {
                Err(Error::Validation(format!(
                    "score {} is complex: decomposition is required unless explicitly overridden",
                    self.score
                )))
            }
            (DecompositionPolicy::Mandatory, CallerDecision::Accept) => Ok(Verdict::Decompose),
            (DecompositionPolicy::Mandatory, _) => Err(Error::Validation(format!(
                "score {} is very complex: decomposition is mandatory and cannot be overridden",
                self.score
            ))),
        }
    }

    /// Returns a summary suitable for display to the user.
    pub fn summary(&self) -> String {
        if self.reasons.is_empty() {
            format!("Score {} ({}): work appears well-scoped.", self.score, self.tier)
        } else {
            format!(
                "Score {} ({}): {}",
                self.score,
                self.tier,
                self.reasons.join("; ")
            )
        }
    }

    /// The question to put to the caller, if the tier calls for one.
    ///
    /// Returns `None` for `Simple` work.
    pub fn prompt(&self) -> Option<String> {
        let mut prompt = String::new();
        match self.tier.policy() {
            DecompositionPolicy::NotNeeded => return None,
            DecompositionPolicy::AskCaller => {
                prompt.push_str("This looks moderately complex. Split it into sub-tasks?\n\n");
            }
            DecompositionPolicy::Required => {
                prompt.push_str("This is complex and should be split into sub-tasks.\n\n");
            }
            DecompositionPolicy::Mandatory => {
                prompt.push_str("This is very complex and must be split into sub-tasks.\n\n");
            }
        }

        prompt.push_str("Signals:\n");
        for reason in &self.reasons {
            prompt.push_str(&format!("- {}\n", reason));
        }

        prompt.push_str("\nOptions:\n");
        prompt.push_str("1. accept - create 3-8 sub-tasks under this record\n");
        match self.tier.policy() {
            DecompositionPolicy::AskCaller => {
                prompt.push_str("2. decline - keep it as a single task\n");
            }
            DecompositionPolicy::Required => {
                prompt.push_str("2. override - keep it as a single task anyway (explicit)\n");
            }
            _ => {}
        }
        Some(prompt)
    }
}

impl Default for ComplexityScore {
    fn default() -> Self {
        Self::new()
    }
}

/// Score a fixed signal set. Pure and deterministic.
pub fn score_signals(signals: &[Signal]) -> ComplexityScore {
    let mut score = ComplexityScore::new();
    let mut sorted = signals.to_vec();
    sorted.sort();
    for signal in sorted {
        score.add(signal);
    }
    score
}

/// Score a work estimate.
pub fn score_estimate(estimate: &WorkEstimate) -> ComplexityScore {
    score_signals(&estimate.signals())
}

/// Parse an effort string into working days.
///
/// Accepts `3d`, `2w`, `16h`, `1.5d` or a bare number of days.
pub fn parse_effort_days(effort: &str) -> Option<f64> {
    let effort = effort.trim().to_lowercase();
    let (number, unit) = match effort.char_indices().find(|(_, c)| c.is_alphabetic()) {
        Some((idx, _)) => (effort[..idx].trim(), effort[idx..].trim()),
        None => (effort.as_str(), "d"),
    };
    let value: f64 = number.parse().ok()?;
    let days = match unit {
        "d" | "day" | "days" => value,
        "w" | "wk" | "week" | "weeks" => value * thresholds::DAYS_PER_WEEK,
        "h" | "hr" | "hrs" | "hour" | "hours" => value / thresholds::HOURS_PER_DAY,
        _ => return None,
    };
    (days >= 0.0).then_some(days)
}

/// Check text for uncertainty markers suggesting unclear requirements.
pub fn has_uncertainty_markers(text: &str) -> bool {
    UNCERTAINTY.is_match(text)
}

/// Uncertainty markers in a record body, outside its Notes and Failure sections.
pub fn body_has_uncertainty_markers(text: &str) -> bool {
    has_uncertainty_markers(&body::without_sections(text, &[body::NOTES, body::FAILURE]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_of(signals: &[Signal]) -> u8 {
        score_signals(signals).score
    }

    #[test]
    fn test_weights_sum_to_eighteen() {
        assert_eq!(score_of(Signal::all()), 18);
        assert_eq!(score_signals(Signal::all()).tier, Tier::VeryComplex);
    }

    #[test]
    fn test_empty_is_simple() {
        let score = score_signals(&[]);
        assert_eq!(score.score, 0);
        assert_eq!(score.tier, Tier::Simple);
        assert!(score.prompt().is_none());
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(Tier::from_score(0), Tier::Simple);
        assert_eq!(Tier::from_score(3), Tier::Simple);
        assert_eq!(Tier::from_score(4), Tier::Moderate);
        assert_eq!(Tier::from_score(6), Tier::Moderate);
        assert_eq!(Tier::from_score(7), Tier::Complex);
        assert_eq!(Tier::from_score(10), Tier::Complex);
        assert_eq!(Tier::from_score(11), Tier::VeryComplex);
        assert_eq!(Tier::from_score(18), Tier::VeryComplex);
    }

    #[test]
    fn test_boundaries_through_signals() {
        // 3: subsystems
        let s = score_signals(&[Signal::ManySubsystems]);
        assert_eq!((s.score, s.tier), (3, Tier::Simple));
        // 4: effort
        let s = score_signals(&[Signal::EffortExceeded]);
        assert_eq!((s.score, s.tier), (4, Tier::Moderate));
        // 6: subsystems + components
        let s = score_signals(&[Signal::ManySubsystems, Signal::ManyComponents]);
        assert_eq!((s.score, s.tier), (6, Tier::Moderate));
        // 7: effort + subsystems
        let s = score_signals(&[Signal::EffortExceeded, Signal::ManySubsystems]);
        assert_eq!((s.score, s.tier), (7, Tier::Complex));
        // 10: effort + subsystems + components
        let s = score_signals(&[
            Signal::EffortExceeded,
            Signal::ManySubsystems,
            Signal::ManyComponents,
        ]);
        assert_eq!((s.score, s.tier), (10, Tier::Complex));
        // 11: + criteria
        let s = score_signals(&[
            Signal::EffortExceeded,
            Signal::ManySubsystems,
            Signal::ManyComponents,
            Signal::ManyAcceptanceCriteria,
        ]);
        assert_eq!((s.score, s.tier), (11, Tier::VeryComplex));
    }

    #[test]
    fn test_scoring_is_deterministic_and_order_independent() {
        let a = score_signals(&[Signal::BlocksDownstream, Signal::EffortExceeded]);
        let b = score_signals(&[Signal::EffortExceeded, Signal::BlocksDownstream]);
        assert_eq!(a, b);
        assert_eq!(a, score_signals(&[Signal::EffortExceeded, Signal::BlocksDownstream]));
    }

    #[test]
    fn test_duplicate_signals_count_once() {
        assert_eq!(score_of(&[Signal::EffortExceeded, Signal::EffortExceeded]), 4);
    }

    #[test]
    fn test_estimate_thresholds() {
        let at_threshold = WorkEstimate {
            effort_days: Some(2.0),
            subsystems: 2,
            components: 2,
            deliverables: 3,
            downstream_blocked: 1,
            acceptance_criteria: 10,
            size_points: Some(8),
            requirements_uncertain: false,
        };
        assert!(at_threshold.signals().is_empty());

        let over = WorkEstimate {
            effort_days: Some(2.5),
            subsystems: 3,
            components: 3,
            deliverables: 4,
            downstream_blocked: 2,
            acceptance_criteria: 11,
            size_points: Some(9),
            requirements_uncertain: true,
        };
        assert_eq!(over.signals().len(), 8);
    }

    #[test]
    fn test_very_complex_scenario() {
        let estimate = WorkEstimate {
            effort_days: Some(4.0),
            subsystems: 4,
            components: 5,
            deliverables: 6,
            ..Default::default()
        };
        let score = score_estimate(&estimate);
        assert_eq!(score.score, 12);
        assert_eq!(score.tier, Tier::VeryComplex);
        assert_eq!(score.tier.policy(), DecompositionPolicy::Mandatory);
        assert_eq!(score.resolve(CallerDecision::Accept).unwrap(), Verdict::Decompose);
        assert!(score.resolve(CallerDecision::Override).is_err());
        assert!(score.resolve(CallerDecision::Decline).is_err());
    }

    #[test]
    fn test_resolve_moderate() {
        let score = score_signals(&[Signal::EffortExceeded]);
        assert_eq!(score.resolve(CallerDecision::Accept).unwrap(), Verdict::Decompose);
        assert_eq!(score.resolve(CallerDecision::Decline).unwrap(), Verdict::Skip);
    }

    #[test]
    fn test_resolve_complex_needs_explicit_override() {
        let score = score_signals(&[Signal::EffortExceeded, Signal::ManySubsystems]);
        assert_eq!(score.tier, Tier::Complex);
        assert_eq!(score.resolve(CallerDecision::Accept).unwrap(), Verdict::Decompose);
        assert_eq!(score.resolve(CallerDecision::Override).unwrap(), Verdict::Skip);
        assert!(matches!(
            score.resolve(CallerDecision::Decline),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_resolve_simple_never_decomposes() {
        let score = score_signals(&[Signal::OversizedEstimate]);
        assert_eq!(score.resolve(CallerDecision::Accept).unwrap(), Verdict::Skip);
    }

    #[test]
    fn test_prompt_options_follow_policy() {
        let moderate = score_signals(&[Signal::EffortExceeded]).prompt().unwrap();
        assert!(moderate.contains("decline"));
        assert!(!moderate.contains("override"));

        let complex = score_signals(&[Signal::EffortExceeded, Signal::ManySubsystems])
            .prompt()
            .unwrap();
        assert!(complex.contains("override"));

        let very = score_signals(Signal::all()).prompt().unwrap();
        assert!(very.contains("must be split"));
        assert!(!very.contains("override"));
        assert!(!very.contains("decline"));
    }

    #[test]
    fn test_summary() {
        assert!(score_signals(&[]).summary().contains("well-scoped"));
        let summary = score_signals(&[Signal::BlocksDownstream]).summary();
        assert!(summary.contains("Score 2 (simple)"));
        assert!(summary.contains("downstream"));
    }

    #[test]
    fn test_parse_effort_days() {
        assert_eq!(parse_effort_days("3d"), Some(3.0));
        assert_eq!(parse_effort_days("2w"), Some(10.0));
        assert_eq!(parse_effort_days("16h"), Some(2.0));
        assert_eq!(parse_effort_days("1.5 days"), Some(1.5));
        assert_eq!(parse_effort_days("4"), Some(4.0));
        assert_eq!(parse_effort_days("soon"), None);
        assert_eq!(parse_effort_days("3 fortnights"), None);
    }

    #[test]
    fn test_uncertainty_markers() {
        assert!(has_uncertainty_markers("Maybe add caching"));
        assert!(has_uncertainty_markers("scope TBD"));
        assert!(!has_uncertainty_markers("Fix typo in README"));
        assert!(has_uncertainty_markers("this could\nbe slow"));
        assert!(has_uncertainty_markers("Investigating the leak"));
    }

    #[test]
    fn test_uncertainty_markers_match_whole_words() {
        assert!(!has_uncertainty_markers("Add a mighty progress bar"));
        assert!(!has_uncertainty_markers("Drop the tbdx column"));
        assert!(!has_uncertainty_markers("Render the maybeline"));
        assert!(has_uncertainty_markers("It might (or not) work"));
    }

    #[test]
    fn test_body_uncertainty_skips_notes_and_failure() {
        let text = "## Objective\n\nShip the exporter.\n\n## Failure\n\nMaybe the disk was full.\n\n## Notes\n\nProbably fine now.\n";
        assert!(!body_has_uncertainty_markers(text));
        assert!(has_uncertainty_markers(text));

        let asked = "## Objective\n\nPerhaps split the exporter.\n\n## Notes\n\nDone.\n";
        assert!(body_has_uncertainty_markers(asked));
    }
}
