//! Canonical type definitions for the dispatch domain
//!
//! Tasks, handler descriptors, results and dispatch records are defined here
//! once and re-exported by the orchestration layer, so the registry, scorer,
//! fallback policy and router all speak the same vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::RouterError;

/// Domain tag a task targets and a handler can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Planner,
    Director,
    Animation,
    Film,
    Game,
    Render,
}

impl Domain {
    /// All domains in pipeline order
    pub const ALL: [Domain; 6] = [
        Domain::Planner,
        Domain::Director,
        Domain::Animation,
        Domain::Film,
        Domain::Game,
        Domain::Render,
    ];

    /// Domains that produce creative output (the Director picks among these)
    pub const EXECUTION: [Domain; 3] = [Domain::Animation, Domain::Film, Domain::Game];

    /// Lowercase identifier used in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Director => "director",
            Self::Animation => "animation",
            Self::Film => "film",
            Self::Game => "game",
            Self::Render => "render",
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Planner => "Planner",
            Self::Director => "Director",
            Self::Animation => "Animation",
            Self::Film => "Film",
            Self::Game => "Game",
            Self::Render => "Render",
        }
    }

    pub fn is_execution(&self) -> bool {
        Self::EXECUTION.contains(self)
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Domain {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "planner" => Ok(Self::Planner),
            "director" => Ok(Self::Director),
            "animation" => Ok(Self::Animation),
            "film" | "cinematic" => Ok(Self::Film),
            "game" => Ok(Self::Game),
            "render" => Ok(Self::Render),
            other => Err(RouterError::UnknownDomain(other.to_string())),
        }
    }
}

/// Output of an earlier stage carried forward as task context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorOutput {
    pub handler_id: String,
    pub domain: Domain,
    pub content: Value,
}

/// Optional structured context attached to a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskContext {
    /// Outputs produced by earlier stages, oldest first
    pub prior_outputs: Vec<PriorOutput>,
    /// Free-form continuity state (characters, props, review verdicts...)
    pub continuity: Map<String, Value>,
}

/// A unit of work routed to a handler
///
/// Handlers only ever see `&Task`; once dispatched it is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<TaskContext>,
}

impl Task {
    /// Create a task with a fresh identifier
    pub fn new(description: impl Into<String>, domain: Domain) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("task_{}", &id[..8]),
            description: description.into(),
            domain,
            context: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Derive a task for another domain that shares this task's id and description
    pub fn for_domain(&self, domain: Domain) -> Self {
        Self {
            domain,
            ..self.clone()
        }
    }
}

/// Input/output contract a handler promises to honor
///
/// Both schemas are JSON Schema documents. Only the output schema's
/// `required` list is interpreted by the router (by the completeness heuristic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationContract {
    pub input_schema: Value,
    pub output_schema: Value,
}

impl Default for InvocationContract {
    fn default() -> Self {
        Self {
            input_schema: serde_json::json!({ "type": "object" }),
            output_schema: serde_json::json!({ "type": "object" }),
        }
    }
}

impl InvocationContract {
    /// Contract whose output must carry the given top-level fields
    pub fn requiring<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let required: Vec<Value> = fields
            .into_iter()
            .map(|f| Value::String(f.into()))
            .collect();
        Self {
            input_schema: serde_json::json!({ "type": "object" }),
            output_schema: serde_json::json!({ "type": "object", "required": required }),
        }
    }

    /// Top-level field names listed under the output schema's `required` key
    pub fn required_output_fields(&self) -> Vec<&str> {
        self.output_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Static description of a registered handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerDescriptor {
    pub id: String,
    pub domains: Vec<Domain>,
    #[serde(default)]
    pub contract: InvocationContract,
    #[serde(default)]
    pub description: String,
}

impl HandlerDescriptor {
    pub fn new(id: impl Into<String>, domains: impl IntoIterator<Item = Domain>) -> Self {
        Self {
            id: id.into(),
            domains: domains.into_iter().collect(),
            contract: InvocationContract::default(),
            description: String::new(),
        }
    }

    pub fn with_contract(mut self, contract: InvocationContract) -> Self {
        self.contract = contract;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn serves(&self, domain: Domain) -> bool {
        self.domains.contains(&domain)
    }
}

/// What a handler hands back on success
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    pub content: Value,
    /// Raw confidence in the handler's own units, if it reports one
    pub confidence: Option<f64>,
}

impl HandlerOutput {
    pub fn scored(content: Value, confidence: f64) -> Self {
        Self {
            content,
            confidence: Some(confidence),
        }
    }

    pub fn unscored(content: Value) -> Self {
        Self {
            content,
            confidence: None,
        }
    }
}

/// Raw confidence signal attached to a result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ConfidenceSignal {
    Raw(f64),
    Unscored,
}

/// How an invocation ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationStatus {
    Completed,
    Failed { error: String },
    TimedOut { after_ms: u64 },
    Cancelled,
}

impl InvocationStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Output of one handler invocation, tagged with its producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResult {
    pub handler_id: String,
    #[serde(flatten)]
    pub status: InvocationStatus,
    pub content: Value,
    pub signal: ConfidenceSignal,
}

impl HandlerResult {
    pub fn completed(handler_id: impl Into<String>, output: HandlerOutput) -> Self {
        Self {
            handler_id: handler_id.into(),
            status: InvocationStatus::Completed,
            content: output.content,
            signal: output
                .confidence
                .map_or(ConfidenceSignal::Unscored, ConfidenceSignal::Raw),
        }
    }

    /// Result standing in for an invocation that did not complete
    pub fn failed(handler_id: impl Into<String>, status: InvocationStatus) -> Self {
        Self {
            handler_id: handler_id.into(),
            status,
            content: Value::Null,
            signal: ConfidenceSignal::Unscored,
        }
    }
}

/// Scoring decision for a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Retry,
    Reject,
}

/// A result with its normalized confidence and decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub result: HandlerResult,
    pub confidence: f64,
    pub decision: Decision,
}

/// One (descriptor, result, scored result) entry of a dispatch record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub descriptor: HandlerDescriptor,
    pub scored: ScoredResult,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl Attempt {
    pub fn handler_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn result(&self) -> &HandlerResult {
        &self.scored.result
    }
}

/// Router state for a single task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchState {
    Pending,
    Invoking,
    Scoring,
    Retrying,
    Accepted,
    Exhausted,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Exhausted)
    }
}

/// Final outcome of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOutcome {
    Accept,
    Reject,
}

/// Why a dispatch ended without an accepted result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// Every resolved candidate has been tried
    CandidatesExhausted,
    /// The per-task attempt budget was reached
    BudgetReached,
    /// The caller cancelled the task
    Cancelled,
}

/// Audit trail of every attempt made for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub task_id: String,
    pub domain: Domain,
    pub attempts: Vec<Attempt>,
    pub outcome: DispatchOutcome,
    pub state: DispatchState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhausted_by: Option<ExhaustionReason>,
    pub transitions: Vec<DispatchState>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl DispatchRecord {
    /// Open a record for a task that has just been received
    pub fn open(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            domain: task.domain,
            attempts: Vec::new(),
            outcome: DispatchOutcome::Reject,
            state: DispatchState::Pending,
            exhausted_by: None,
            transitions: vec![DispatchState::Pending],
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to `state`, recording the transition
    pub fn transition(&mut self, state: DispatchState) {
        tracing::debug!("Task {}: {:?} -> {:?}", self.task_id, self.state, state);
        self.state = state;
        self.transitions.push(state);
    }

    pub fn push_attempt(&mut self, attempt: Attempt) {
        self.attempts.push(attempt);
    }

    /// Close the record as accepted
    pub fn accept(&mut self) {
        self.outcome = DispatchOutcome::Accept;
        self.exhausted_by = None;
        self.transition(DispatchState::Accepted);
        self.finished_at = Some(Utc::now());
    }

    /// Close the record as exhausted; the last attempt's decision becomes `reject`
    pub fn exhaust(&mut self, reason: ExhaustionReason) {
        if let Some(last) = self.attempts.last_mut() {
            last.scored.decision = Decision::Reject;
        }
        self.outcome = DispatchOutcome::Reject;
        self.exhausted_by = Some(reason);
        self.transition(DispatchState::Exhausted);
        self.finished_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_accepted(&self) -> bool {
        self.outcome == DispatchOutcome::Accept
    }

    pub fn is_cancelled(&self) -> bool {
        self.exhausted_by == Some(ExhaustionReason::Cancelled)
    }

    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// The accepted result, if any
    pub fn accepted(&self) -> Option<&ScoredResult> {
        if !self.is_accepted() {
            return None;
        }
        self.attempts.last().map(|a| &a.scored)
    }

    pub fn has_attempted(&self, handler_id: &str) -> bool {
        self.attempts.iter().any(|a| a.handler_id() == handler_id)
    }

    /// Handler ids in the order they were attempted
    pub fn attempted_ids(&self) -> Vec<&str> {
        self.attempts.iter().map(Attempt::handler_id).collect()
    }

    /// Confidence of each attempt in order
    pub fn confidences(&self) -> Vec<f64> {
        self.attempts.iter().map(|a| a.scored.confidence).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_domain_parse_and_display() {
        assert_eq!("Animation".parse::<Domain>().unwrap(), Domain::Animation);
        assert_eq!(" cinematic ".parse::<Domain>().unwrap(), Domain::Film);
        assert_eq!(Domain::Render.to_string(), "render");
        assert!(matches!(
            "sound".parse::<Domain>(),
            Err(RouterError::UnknownDomain(_))
        ));
    }

    #[test]
    fn test_execution_domains() {
        assert!(Domain::Game.is_execution());
        assert!(!Domain::Director.is_execution());
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = Task::new("a", Domain::Film);
        let b = Task::new("a", Domain::Film);
        assert!(a.id.starts_with("task_"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_required_output_fields() {
        let contract = InvocationContract::requiring(["shots", "camera"]);
        assert_eq!(contract.required_output_fields(), vec!["shots", "camera"]);
        assert!(InvocationContract::default()
            .required_output_fields()
            .is_empty());
    }

    #[test]
    fn test_completed_result_keeps_signal() {
        let r = HandlerResult::completed("film", HandlerOutput::scored(json!({}), 0.7));
        assert_eq!(r.signal, ConfidenceSignal::Raw(0.7));
        let r = HandlerResult::completed("film", HandlerOutput::unscored(json!({})));
        assert_eq!(r.signal, ConfidenceSignal::Unscored);
    }

    #[test]
    fn test_record_serializes_lowercase_states() {
        let task = Task::new("shot list", Domain::Film).with_id("t1");
        let mut record = DispatchRecord::open(&task);
        record.exhaust(ExhaustionReason::Cancelled);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["outcome"], "reject");
        assert_eq!(value["state"], "exhausted");
        assert_eq!(value["exhausted_by"], "cancelled");
        assert_eq!(value["transitions"], json!(["pending", "exhausted"]));
    }
}
