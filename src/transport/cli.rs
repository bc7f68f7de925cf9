//! CLI transport for direct terminal interaction

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};

use crate::agents::{builtin_registry, builtin_stage_router};
use crate::audit::AuditLog;
use crate::config::Config;
use crate::core::{CancelFlag, DispatchRecord, Domain, InvocationStatus, Task};
use crate::orchestration::{
    AgentPipeline, DispatchRouter, PipelineRun, PipelineStatus, ReviewVerdict, Stage,
};

/// Options of `innovator dispatch`
#[derive(Debug, Clone)]
pub struct DispatchArgs {
    pub prompt: String,
    pub domain: Option<Domain>,
    pub threshold: Option<f64>,
    pub timeout_ms: Option<u64>,
    pub json: bool,
}

/// Options of `innovator pipeline`
#[derive(Debug, Clone)]
pub struct PipelineArgs {
    pub prompt: String,
    pub review: ReviewVerdict,
    pub threshold: Option<f64>,
    pub json: bool,
}

/// Load the configuration from `path`, or from the default location
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => {
            let config = Config::load()?;
            config.validate()?;
            Ok(config)
        }
    }
}

/// Router over the built-in handlers, with auditing when enabled
pub fn build_router(config: &Config) -> Result<DispatchRouter> {
    let registry = builtin_registry().context("Failed to register built-in handlers")?;
    let mut router = DispatchRouter::new(Arc::new(registry), config);
    if config.audit.enabled {
        let audit = AuditLog::new(&config.audit)?;
        tracing::debug!("Auditing dispatches to {}", audit.path().display());
        router = router.with_audit(Arc::new(audit));
    }
    Ok(router)
}

/// Apply a command-line threshold override
fn apply_threshold(config: &mut Config, threshold: Option<f64>) -> Result<()> {
    if let Some(threshold) = threshold {
        config.router.accept_threshold = threshold;
        config.validate()?;
    }
    Ok(())
}

/// Cancel flag fired by Ctrl+C, shared by every dispatch of one command
fn interrupt_flag() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling dispatch");
            flag.cancel();
        }
    });
    cancel
}

/// Dispatch one task and print its record
pub async fn run_dispatch(config_path: Option<&Path>, args: DispatchArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_threshold(&mut config, args.threshold)?;
    if let Some(timeout_ms) = args.timeout_ms {
        config.router.invocation_timeout_ms = timeout_ms;
        config.validate()?;
    }

    let domain = match args.domain {
        Some(domain) => domain,
        None => infer_domain(&config, &args.prompt),
    };
    let task = Task::new(args.prompt, domain);
    let router = build_router(&config)?;
    let record = router
        .dispatch_with_cancel(&task, &interrupt_flag())
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record, router.accept_threshold());
    }
    Ok(())
}

/// Execution domain the Director would pick for `prompt`
fn infer_domain(config: &Config, prompt: &str) -> Domain {
    let stages = builtin_stage_router(&config.pipeline);
    let task = Task::new(prompt, Domain::Director);
    let decision = stages.route(Some(Domain::Director), &task, None);
    tracing::debug!("Inferred domain: {}", decision.reason);
    match decision.next {
        Stage::Agent(domain) => domain,
        Stage::End => config.pipeline.fallback_stage,
    }
}

/// Run a task through the pipeline and print every stage
pub async fn run_pipeline(config_path: Option<&Path>, args: PipelineArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_threshold(&mut config, args.threshold)?;

    let router = build_router(&config)?;
    let pipeline = AgentPipeline::new(
        &router,
        builtin_stage_router(&config.pipeline),
        &config.pipeline,
    );
    let task = Task::new(args.prompt, Domain::Planner);
    let review = args.review;
    let run = pipeline
        .run_with_cancel(&task, &interrupt_flag(), |_| review)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_pipeline(&run);
    }
    Ok(())
}

/// List the built-in handlers
pub fn run_agents() -> Result<()> {
    let registry = builtin_registry()?;

    println!("{}", "=== Registered Handlers ===".bold().cyan());
    println!();

    #[derive(Tabled)]
    struct HandlerRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Domains")]
        domains: String,
        #[tabled(rename = "Required Output")]
        required: String,
        #[tabled(rename = "Description")]
        description: String,
    }

    let rows: Vec<HandlerRow> = registry
        .descriptors()
        .map(|d| HandlerRow {
            id: d.id.clone(),
            domains: d
                .domains
                .iter()
                .map(Domain::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            required: match d.contract.required_output_fields() {
                fields if fields.is_empty() => "-".to_string(),
                fields => fields.join(", "),
            },
            description: d.description.chars().take(48).collect(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);

    Ok(())
}

/// Print the effective configuration, or just its path
pub fn run_config(config_path: Option<&Path>, show_path: bool) -> Result<()> {
    if show_path {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Config::config_path()?,
        };
        println!("{}", path.display());
        return Ok(());
    }

    let config = load_config(config_path)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[derive(Tabled)]
struct AttemptRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Handler")]
    handler: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Decision")]
    decision: String,
    #[tabled(rename = "Time")]
    elapsed: String,
}

fn attempt_rows(record: &DispatchRecord) -> Vec<AttemptRow> {
    record
        .attempts
        .iter()
        .enumerate()
        .map(|(i, a)| AttemptRow {
            index: i + 1,
            handler: a.handler_id().to_string(),
            status: match &a.result().status {
                InvocationStatus::Completed => "completed".green().to_string(),
                InvocationStatus::Failed { error } => format!("failed: {}", error).red().to_string(),
                InvocationStatus::TimedOut { after_ms } => {
                    format!("timed out ({}ms)", after_ms).yellow().to_string()
                }
                InvocationStatus::Cancelled => "cancelled".yellow().to_string(),
            },
            confidence: format!("{:.2}", a.scored.confidence),
            decision: format!("{:?}", a.scored.decision).to_lowercase(),
            elapsed: format_duration(Duration::from_millis(a.elapsed_ms)),
        })
        .collect()
}

fn format_duration(d: Duration) -> String {
    if d.as_secs() > 0 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

fn outcome_label(record: &DispatchRecord) -> String {
    if record.is_accepted() {
        "✓ accept".green().bold().to_string()
    } else {
        "✗ reject".red().bold().to_string()
    }
}

fn print_record(record: &DispatchRecord, threshold: f64) {
    println!(
        "{}",
        format!("=== Dispatch {} ({}) ===", record.task_id, record.domain)
            .bold()
            .cyan()
    );
    println!();

    let mut table = Table::new(attempt_rows(record));
    table.with(Style::rounded());
    println!("{}", table);
    println!();

    println!("{}:   {}", "Outcome".bold(), outcome_label(record));
    println!("{}: {:.2}", "Threshold".bold(), threshold);
    if let Some(reason) = record.exhausted_by {
        println!("{}:    {:?}", "Reason".bold(), reason);
    }
    if let Some(accepted) = record.accepted() {
        println!();
        println!(
            "{}",
            serde_json::to_string_pretty(&accepted.result.content).unwrap_or_default()
        );
    }
}

fn print_pipeline(run: &PipelineRun) {
    println!(
        "{}",
        format!("=== Pipeline {} ===", run.task_id).bold().cyan()
    );
    println!();

    for (i, step) in run.steps.iter().enumerate() {
        let review = step
            .review
            .map(|v| format!(" [review: {:?}]", v).to_lowercase())
            .unwrap_or_default();
        println!(
            "{}. {} {}{}",
            i + 1,
            step.record.domain.label().bold(),
            outcome_label(&step.record),
            review
        );
        println!("   {}", step.decision.reason.dimmed());
    }
    println!();

    let status = match run.status {
        PipelineStatus::Completed => "completed".green().bold().to_string(),
        PipelineStatus::StageRejected(domain) => {
            format!("rejected at {}", domain).red().bold().to_string()
        }
        PipelineStatus::StageBudgetReached => "stage budget reached".yellow().bold().to_string(),
        PipelineStatus::Cancelled => "cancelled".yellow().bold().to_string(),
    };
    println!("{}: {}", "Status".bold(), status);
    if let Some(decision) = &run.final_decision {
        println!("{}:  {}", "Final".bold(), decision.reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_domain_picks_confident_agent() {
        let config = Config::default();
        assert_eq!(
            infer_domain(&config, "NPC quest with combat for the player"),
            Domain::Game
        );
        assert_eq!(infer_domain(&config, "something vague"), Domain::Planner);
    }

    #[test]
    fn test_apply_threshold_validates() {
        let mut config = Config::default();
        apply_threshold(&mut config, Some(0.3)).unwrap();
        assert_eq!(config.router.accept_threshold, 0.3);
        assert!(apply_threshold(&mut config, Some(2.0)).is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
    }
}
