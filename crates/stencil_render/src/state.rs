//! Render states and the trace of a render.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// State of one document (or of the render as a whole).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    #[default]
    Pending,
    Resolving,
    Parsing,
    Evaluating,
    Substituting,
    /// Waiting at the fan-in for the consistency check.
    Checking,
    Done,
    Failed,
}

impl RenderState {
    /// Check if transition to the given state is valid.
    ///
    /// States only move forward; any non-terminal state may fail.
    pub fn can_transition_to(&self, next: &RenderState) -> bool {
        use RenderState::*;
        matches!(
            (self, next),
            (Pending, Resolving)
                | (Resolving, Parsing)
                | (Parsing, Evaluating)
                | (Evaluating, Substituting)
                | (Substituting, Checking)
                | (Checking, Done)
        ) || (!self.is_terminal() && *next == Failed)
    }

    /// Get the next state on the success path.
    pub fn next(&self) -> Option<RenderState> {
        use RenderState::*;
        match self {
            Pending => Some(Resolving),
            Resolving => Some(Parsing),
            Parsing => Some(Evaluating),
            Evaluating => Some(Substituting),
            Substituting => Some(Checking),
            Checking => Some(Done),
            Done | Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderState::Done | RenderState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderState::Pending => "pending",
            RenderState::Resolving => "resolving",
            RenderState::Parsing => "parsing",
            RenderState::Evaluating => "evaluating",
            RenderState::Substituting => "substituting",
            RenderState::Checking => "checking",
            RenderState::Done => "done",
            RenderState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// `None` for render-level transitions.
    pub document: Option<String>,
    pub from: RenderState,
    pub to: RenderState,
    pub at: DateTime<Utc>,
}

/// Progress of one document through the render states.
#[derive(Debug, Clone)]
pub struct DocumentProgress {
    document: Option<String>,
    state: RenderState,
    transitions: Vec<Transition>,
}

impl DocumentProgress {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: Some(document.into()),
            state: RenderState::Pending,
            transitions: Vec::new(),
        }
    }

    /// Progress of the render as a whole.
    pub fn render_level() -> Self {
        Self {
            document: None,
            state: RenderState::Pending,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Move to `next`, ignoring (and logging) backward moves.
    pub fn advance(&mut self, next: RenderState) -> bool {
        let name = self.document.as_deref().unwrap_or("<render>");
        if !self.state.can_transition_to(&next) {
            warn!("Ignoring invalid transition {} -> {} for {}", self.state, next, name);
            return false;
        }
        debug!("{}: {} -> {}", name, self.state, next);
        self.transitions.push(Transition {
            document: self.document.clone(),
            from: self.state,
            to: next,
            at: Utc::now(),
        });
        self.state = next;
        true
    }

    /// Step forward through every intermediate state up to `target`.
    pub fn advance_to(&mut self, target: RenderState) {
        while self.state != target {
            match self.state.next() {
                Some(next) if next != RenderState::Failed => {
                    self.advance(next);
                }
                _ => break,
            }
        }
    }

    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.advance(RenderState::Failed);
        }
    }

    pub fn into_transitions(self) -> Vec<Transition> {
        self.transitions
    }
}

/// Diagnostic record of one render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTrace {
    pub render_id: Uuid,
    pub set_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub transitions: Vec<Transition>,
}

impl RenderTrace {
    pub fn start(set_id: impl Into<String>) -> Self {
        Self {
            render_id: Uuid::new_v4(),
            set_id: set_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            transitions: Vec::new(),
        }
    }

    pub fn record(&mut self, progress: DocumentProgress) {
        self.transitions.extend(progress.into_transitions());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// States a document went through, starting from `Pending`.
    pub fn states_of(&self, document: &str) -> Vec<RenderState> {
        let mut states = vec![RenderState::Pending];
        states.extend(
            self.transitions
                .iter()
                .filter(|t| t.document.as_deref() == Some(document))
                .map(|t| t.to),
        );
        states
    }

    pub fn final_state(&self, document: &str) -> RenderState {
        self.states_of(document)
            .last()
            .copied()
            .unwrap_or_default()
    }

    /// Final state of the render as a whole.
    pub fn outcome(&self) -> RenderState {
        self.transitions
            .iter()
            .filter(|t| t.document.is_none())
            .map(|t| t.to)
            .last()
            .unwrap_or_default()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut state = RenderState::Pending;
        while let Some(next) = state.next() {
            assert!(state.can_transition_to(&next));
            state = next;
        }
        assert_eq!(state, RenderState::Done);
    }

    #[test]
    fn test_backward_and_terminal_transitions_rejected() {
        assert!(!RenderState::Substituting.can_transition_to(&RenderState::Parsing));
        assert!(!RenderState::Parsing.can_transition_to(&RenderState::Substituting));
        assert!(!RenderState::Done.can_transition_to(&RenderState::Failed));
        assert!(!RenderState::Failed.can_transition_to(&RenderState::Resolving));
        assert!(RenderState::Evaluating.can_transition_to(&RenderState::Failed));
    }

    #[test]
    fn test_progress_records_transitions() {
        let mut progress = DocumentProgress::new("values.yaml");
        assert!(progress.advance(RenderState::Resolving));
        assert!(progress.advance(RenderState::Parsing));
        assert!(!progress.advance(RenderState::Done));
        progress.fail();
        progress.fail();

        let mut trace = RenderTrace::start("mysql");
        trace.record(progress);
        trace.finish();

        assert_eq!(
            trace.states_of("values.yaml"),
            vec![
                RenderState::Pending,
                RenderState::Resolving,
                RenderState::Parsing,
                RenderState::Failed
            ]
        );
        assert_eq!(trace.final_state("values.yaml"), RenderState::Failed);
        assert_eq!(trace.final_state("other"), RenderState::Pending);
        assert!(trace.duration_ms().is_some());
    }

    #[test]
    fn test_advance_to_walks_every_state() {
        let mut progress = DocumentProgress::render_level();
        progress.advance_to(RenderState::Checking);
        assert_eq!(progress.state(), RenderState::Checking);
        assert_eq!(progress.into_transitions().len(), 5);
    }

    #[test]
    fn test_render_level_outcome() {
        let mut render = DocumentProgress::render_level();
        render.advance(RenderState::Resolving);
        render.fail();

        let mut trace = RenderTrace::start("mysql");
        trace.record(render);
        assert_eq!(trace.outcome(), RenderState::Failed);
    }
}
