//! Agent Pipeline - stage routing across the creative agents
//!
//! Stages follow Planner -> Director -> execution agent -> Render, with the
//! render review deciding whether the task is done, needs another Director
//! pass, or goes back to planning. The Director picks the execution agent
//! whose intent score is highest, falling back when nobody is confident.

use serde::{Deserialize, Serialize};

use super::agent_router::DispatchRouter;
use crate::agents::IntentScoreFn;
use crate::config::PipelineConfig;
use crate::core::{
    CancelFlag, Domain, DispatchRecord, PriorOutput, RouterError, Task, TaskContext,
};

/// Where a task goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Agent(Domain),
    End,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Agent(domain) => write!(f, "{}", domain),
            Stage::End => f.write_str("end"),
        }
    }
}

/// Verdict of reviewing a rendered result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewVerdict {
    #[default]
    Accept,
    Revise,
    Redesign,
    Unknown,
}

impl std::str::FromStr for ReviewVerdict {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "accept" => Self::Accept,
            "revise" => Self::Revise,
            "redesign" => Self::Redesign,
            _ => Self::Unknown,
        })
    }
}

/// Stage decision with an explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub next: Stage,
    pub reason: String,
}

impl RoutingDecision {
    fn new(next: Stage, reason: impl Into<String>) -> Self {
        Self {
            next,
            reason: reason.into(),
        }
    }
}

/// Intent score of one execution agent
#[derive(Debug, Clone, PartialEq)]
pub struct IntentScore {
    pub domain: Domain,
    pub confidence: f64,
    pub reason: String,
}

pub struct StageRouter {
    scorers: Vec<(Domain, IntentScoreFn)>,
    confidence_threshold: f64,
    fallback_stage: Domain,
}

impl StageRouter {
    pub fn new(confidence_threshold: f64, fallback_stage: Domain) -> Self {
        Self {
            scorers: Vec::new(),
            confidence_threshold,
            fallback_stage,
        }
    }

    /// Register the intent scorer the Director consults for `domain`
    pub fn register_scorer(&mut self, domain: Domain, scorer: IntentScoreFn) {
        self.scorers.push((domain, scorer));
    }

    /// Decide the stage after `current`
    pub fn route(
        &self,
        current: Option<Domain>,
        task: &Task,
        review: Option<ReviewVerdict>,
    ) -> RoutingDecision {
        match current {
            None => RoutingDecision::new(Stage::Agent(Domain::Planner), "New task entry → Planner"),
            Some(Domain::Planner) => RoutingDecision::new(
                Stage::Agent(Domain::Director),
                "Planner output ready → Director decision",
            ),
            Some(Domain::Director) => self.route_from_director(task),
            Some(Domain::Animation | Domain::Film | Domain::Game) => RoutingDecision::new(
                Stage::Agent(Domain::Render),
                "Execution output requires rendering",
            ),
            Some(Domain::Render) => route_from_render(review.unwrap_or_default()),
        }
    }

    /// Intent scores of every execution agent, best first
    ///
    /// The sort is stable, so ties keep registration order. A scorer that
    /// errors counts as zero confidence.
    pub fn score_intents(&self, task: &Task) -> Vec<IntentScore> {
        let mut scores: Vec<IntentScore> = self
            .scorers
            .iter()
            .filter(|(domain, _)| domain.is_execution())
            .map(|(domain, scorer)| match scorer(task) {
                Ok((confidence, reason)) => IntentScore {
                    domain: *domain,
                    confidence,
                    reason,
                },
                Err(e) => IntentScore {
                    domain: *domain,
                    confidence: 0.0,
                    reason: format!("Scoring error: {}", e),
                },
            })
            .collect();
        scores.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        scores
    }

    fn route_from_director(&self, task: &Task) -> RoutingDecision {
        let scores = self.score_intents(task);
        let Some(best) = scores.first() else {
            return RoutingDecision::new(
                Stage::Agent(self.fallback_stage),
                "No agents registered → fallback",
            );
        };

        if best.confidence < self.confidence_threshold {
            return RoutingDecision::new(
                Stage::Agent(self.fallback_stage),
                format!(
                    "Confidence {:.2} below threshold {:.2}. Fallback to '{}'. Original reason: {}",
                    best.confidence, self.confidence_threshold, self.fallback_stage, best.reason
                ),
            );
        }

        RoutingDecision::new(
            Stage::Agent(best.domain),
            format!("Director selected {} | {}", best.domain, best.reason),
        )
    }
}

fn route_from_render(review: ReviewVerdict) -> RoutingDecision {
    match review {
        ReviewVerdict::Accept => {
            RoutingDecision::new(Stage::End, "Render accepted → pipeline complete")
        }
        ReviewVerdict::Revise => RoutingDecision::new(
            Stage::Agent(Domain::Director),
            "Render revision requested → Director",
        ),
        ReviewVerdict::Redesign => RoutingDecision::new(
            Stage::Agent(Domain::Planner),
            "Major redesign required → Planner",
        ),
        ReviewVerdict::Unknown => RoutingDecision::new(Stage::End, "Unknown review result → end"),
    }
}

/// One visited stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub decision: RoutingDecision,
    pub record: DispatchRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewVerdict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Render was accepted (or the review ended the run)
    Completed,
    /// A non-render stage produced no acceptable result
    StageRejected(Domain),
    /// `max_stages` stages were visited without finishing
    StageBudgetReached,
    /// The caller cancelled the run during a stage dispatch
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub task_id: String,
    pub steps: Vec<PipelineStep>,
    pub status: PipelineStatus,
    pub final_decision: Option<RoutingDecision>,
    pub context: TaskContext,
}

impl PipelineRun {
    /// Stages visited, in order
    pub fn stages(&self) -> Vec<Domain> {
        self.steps.iter().map(|s| s.record.domain).collect()
    }
}

/// Drives a task through the stages, dispatching each one
pub struct AgentPipeline<'r> {
    router: &'r DispatchRouter,
    stages: StageRouter,
    max_stages: usize,
}

impl<'r> AgentPipeline<'r> {
    pub fn new(router: &'r DispatchRouter, stages: StageRouter, config: &PipelineConfig) -> Self {
        Self {
            router,
            stages,
            max_stages: config.max_stages.max(1),
        }
    }

    /// Run `task` until the pipeline ends
    ///
    /// `review` is called with each accepted Render record. A rejected Render
    /// dispatch is reviewed as `revise` without calling it.
    pub async fn run<R>(&self, task: &Task, review: R) -> Result<PipelineRun, RouterError>
    where
        R: FnMut(&DispatchRecord) -> ReviewVerdict,
    {
        self.run_with_cancel(task, &CancelFlag::new(), review).await
    }

    /// Run `task`, stopping after the stage in flight once `cancel` fires
    pub async fn run_with_cancel<R>(
        &self,
        task: &Task,
        cancel: &CancelFlag,
        mut review: R,
    ) -> Result<PipelineRun, RouterError>
    where
        R: FnMut(&DispatchRecord) -> ReviewVerdict,
    {
        let mut context = task.context.clone().unwrap_or_default();
        let mut steps: Vec<PipelineStep> = Vec::new();
        let mut current: Option<Domain> = None;
        let mut verdict: Option<ReviewVerdict> = None;

        loop {
            let decision = self.stages.route(current, task, verdict.take());
            tracing::debug!(
                "Task {}: {} → {} ({})",
                task.id,
                current.map_or("start".to_string(), |d| d.to_string()),
                decision.next,
                decision.reason
            );

            let domain = match decision.next {
                Stage::End => {
                    return Ok(PipelineRun {
                        task_id: task.id.clone(),
                        steps,
                        status: PipelineStatus::Completed,
                        final_decision: Some(decision),
                        context,
                    });
                }
                Stage::Agent(domain) => domain,
            };

            if steps.len() >= self.max_stages {
                tracing::warn!(
                    "Task {} reached the stage budget ({}) before finishing",
                    task.id,
                    self.max_stages
                );
                return Ok(PipelineRun {
                    task_id: task.id.clone(),
                    steps,
                    status: PipelineStatus::StageBudgetReached,
                    final_decision: Some(decision),
                    context,
                });
            }

            let stage_task = task.for_domain(domain).with_context(context.clone());
            let record = self.router.dispatch_with_cancel(&stage_task, cancel).await?;
            if record.is_cancelled() {
                tracing::warn!("Task {} cancelled during the {} stage", task.id, domain);
                steps.push(PipelineStep {
                    decision,
                    record,
                    review: None,
                });
                return Ok(PipelineRun {
                    task_id: task.id.clone(),
                    steps,
                    status: PipelineStatus::Cancelled,
                    final_decision: None,
                    context,
                });
            }

            if let Some(accepted) = record.accepted() {
                context.prior_outputs.push(PriorOutput {
                    handler_id: accepted.result.handler_id.clone(),
                    domain,
                    content: accepted.result.content.clone(),
                });
            }

            let step_review = if domain == Domain::Render {
                let v = if record.is_accepted() {
                    review(&record)
                } else {
                    ReviewVerdict::Revise
                };
                context
                    .continuity
                    .insert("review_result".to_string(), serde_json::json!(v));
                Some(v)
            } else {
                None
            };

            let rejected = !record.is_accepted() && domain != Domain::Render;
            steps.push(PipelineStep {
                decision,
                record,
                review: step_review,
            });

            if rejected {
                return Ok(PipelineRun {
                    task_id: task.id.clone(),
                    steps,
                    status: PipelineStatus::StageRejected(domain),
                    final_decision: None,
                    context,
                });
            }

            current = Some(domain);
            verdict = step_review;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::KeywordHandler;
    use std::sync::Arc;

    fn stage_router(threshold: f64) -> StageRouter {
        let mut router = StageRouter::new(threshold, Domain::Planner);
        for domain in Domain::EXECUTION {
            if let Some(handler) = KeywordHandler::for_domain(domain) {
                router.register_scorer(domain, handler.intent_fn());
            }
        }
        router
    }

    #[test]
    fn test_fixed_transitions() {
        let router = stage_router(0.6);
        let task = Task::new("anything", Domain::Planner);
        assert_eq!(
            router.route(None, &task, None).next,
            Stage::Agent(Domain::Planner)
        );
        assert_eq!(
            router.route(Some(Domain::Planner), &task, None).next,
            Stage::Agent(Domain::Director)
        );
        for domain in Domain::EXECUTION {
            assert_eq!(
                router.route(Some(domain), &task, None).next,
                Stage::Agent(Domain::Render)
            );
        }
    }

    #[test]
    fn test_render_review_routing() {
        let router = stage_router(0.6);
        let task = Task::new("anything", Domain::Render);
        let next = |v| router.route(Some(Domain::Render), &task, Some(v)).next;
        assert_eq!(next(ReviewVerdict::Accept), Stage::End);
        assert_eq!(next(ReviewVerdict::Revise), Stage::Agent(Domain::Director));
        assert_eq!(next(ReviewVerdict::Redesign), Stage::Agent(Domain::Planner));
        assert_eq!(next(ReviewVerdict::Unknown), Stage::End);
        assert_eq!(router.route(Some(Domain::Render), &task, None).next, Stage::End);
    }

    #[test]
    fn test_director_picks_most_confident_agent() {
        let router = stage_router(0.3);
        let task = Task::new(
            "Storyboard a cinematic camera shot of the scene",
            Domain::Director,
        );
        let decision = router.route(Some(Domain::Director), &task, None);
        assert_eq!(decision.next, Stage::Agent(Domain::Film));
        assert!(decision.reason.starts_with("Director selected film"));
    }

    #[test]
    fn test_director_falls_back_on_low_confidence() {
        let router = stage_router(0.65);
        let task = Task::new("Create a cinematic sword fight animation", Domain::Director);
        let decision = router.route(Some(Domain::Director), &task, None);
        assert_eq!(decision.next, Stage::Agent(Domain::Planner));
        assert!(decision.reason.contains("below threshold 0.65"));
    }

    #[test]
    fn test_director_without_scorers_falls_back() {
        let router = StageRouter::new(0.6, Domain::Director);
        let task = Task::new("x", Domain::Director);
        let decision = router.route(Some(Domain::Director), &task, None);
        assert_eq!(decision.next, Stage::Agent(Domain::Director));
        assert_eq!(decision.reason, "No agents registered → fallback");
    }

    #[test]
    fn test_scoring_error_counts_as_zero() {
        let mut router = StageRouter::new(0.1, Domain::Planner);
        router.register_scorer(
            Domain::Game,
            Arc::new(|_: &Task| Err::<(f64, String), _>(anyhow::anyhow!("scorer offline"))),
        );
        router.register_scorer(Domain::Film, KeywordHandler::film().intent_fn());
        let scores = router.score_intents(&Task::new("film scene", Domain::Director));
        assert_eq!(scores[0].domain, Domain::Film);
        assert_eq!(scores[1].confidence, 0.0);
        assert!(scores[1].reason.contains("scorer offline"));
    }

    #[test]
    fn test_non_execution_scorers_are_ignored() {
        let mut router = StageRouter::new(0.0, Domain::Planner);
        router.register_scorer(
            Domain::Render,
            Arc::new(|_: &Task| Ok::<_, anyhow::Error>((1.0, "render".to_string()))),
        );
        assert!(router
            .score_intents(&Task::new("x", Domain::Director))
            .is_empty());
    }

    #[test]
    fn test_review_verdict_parse() {
        assert_eq!("Revise".parse::<ReviewVerdict>().unwrap(), ReviewVerdict::Revise);
        assert_eq!("later".parse::<ReviewVerdict>().unwrap(), ReviewVerdict::Unknown);
    }
}
