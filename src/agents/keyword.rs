//! Keyword-scoring stand-ins for the execution agents
//!
//! Confidence is the share of a domain's keywords found in the lowercase task
//! description. Good enough to exercise routing offline; real deployments
//! register model-backed handlers instead.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::core::{AgentHandler, Domain, HandlerOutput, Task};

const ANIMATION_KEYWORDS: &[&str] = &[
    "animation",
    "animated",
    "character",
    "motion",
    "pose",
    "rig",
    "keyframe",
    "movement",
];

const FILM_KEYWORDS: &[&str] = &[
    "film",
    "cinematic",
    "camera",
    "shot",
    "lighting",
    "scene",
    "storyboard",
    "montage",
];

const GAME_KEYWORDS: &[&str] = &[
    "game",
    "npc",
    "quest",
    "combat",
    "level",
    "interaction",
    "player",
    "skill",
];

/// Scores a task description for one domain
pub type IntentScoreFn = Arc<dyn Fn(&Task) -> Result<(f64, String)> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct KeywordHandler {
    /// `None` for the generalist, which serves every execution domain
    domain: Option<Domain>,
    keywords: Vec<&'static str>,
    reason: &'static str,
}

impl KeywordHandler {
    pub fn animation() -> Self {
        Self {
            domain: Some(Domain::Animation),
            keywords: ANIMATION_KEYWORDS.to_vec(),
            reason: "Animation-related intent detected",
        }
    }

    pub fn film() -> Self {
        Self {
            domain: Some(Domain::Film),
            keywords: FILM_KEYWORDS.to_vec(),
            reason: "Cinematic / film language detected",
        }
    }

    pub fn game() -> Self {
        Self {
            domain: Some(Domain::Game),
            keywords: GAME_KEYWORDS.to_vec(),
            reason: "Game mechanics and interaction detected",
        }
    }

    /// Handler for an execution domain
    pub fn for_domain(domain: Domain) -> Option<Self> {
        match domain {
            Domain::Animation => Some(Self::animation()),
            Domain::Film => Some(Self::film()),
            Domain::Game => Some(Self::game()),
            _ => None,
        }
    }

    /// Handler matching the keywords of every execution domain
    pub fn generalist() -> Self {
        Self {
            domain: None,
            keywords: [ANIMATION_KEYWORDS, FILM_KEYWORDS, GAME_KEYWORDS].concat(),
            reason: "General creative intent detected",
        }
    }

    /// Execution domain this handler specializes in
    pub fn domain(&self) -> Option<Domain> {
        self.domain
    }

    /// Keywords found in `text`, in list order
    pub fn matches(&self, text: &str) -> Vec<&'static str> {
        let text = text.to_lowercase();
        self.keywords
            .iter()
            .copied()
            .filter(|k| text.contains(k))
            .collect()
    }

    /// Fraction of keywords present in `text`
    pub fn score(&self, text: &str) -> f64 {
        if self.keywords.is_empty() {
            return 0.0;
        }
        self.matches(text).len() as f64 / self.keywords.len() as f64
    }

    pub fn reason(&self) -> &'static str {
        self.reason
    }

    /// This handler's scoring as a stage-router intent function
    pub fn intent_fn(&self) -> IntentScoreFn {
        let handler = self.clone();
        Arc::new(move |task: &Task| {
            Ok::<_, anyhow::Error>((handler.score(&task.description), handler.reason.to_string()))
        })
    }
}

#[async_trait]
impl AgentHandler for KeywordHandler {
    async fn invoke(&self, task: &Task) -> Result<HandlerOutput> {
        let matched = self.matches(&task.description);
        let confidence = matched.len() as f64 / self.keywords.len().max(1) as f64;
        Ok(HandlerOutput::scored(
            json!({
                "domain": task.domain,
                "summary": self.reason,
                "matched": matched,
            }),
            confidence,
        ))
    }
}
