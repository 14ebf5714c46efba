//! Human ports for interactive and unattended sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use console::style;
use dialoguer::{Input, Select, theme::ColorfulTheme};
use tracing::info;

use crate::errors::CollaboratorError;
use crate::graph::EscalationReason;
use crate::ports::{Decision, EscalationDecision, EscalationRequest, HumanPort, Question};

const OTHER_ANSWER: &str = "Other (type an answer)";

/// Prompts on the terminal with dialoguer.
///
/// Prompts block, so each one runs on the blocking thread pool.
#[derive(Debug, Default)]
pub struct TerminalHuman;

impl TerminalHuman {
    pub fn new() -> Self {
        Self
    }
}

fn prompt_error(operation: &str, e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::unavailable(operation, format!("prompt failed: {e}"))
}

fn ask_blocking(
    questions: &[Question],
    decisions: &[Decision],
    understanding: &str,
) -> Result<HashMap<String, String>, CollaboratorError> {
    let theme = ColorfulTheme::default();

    if !understanding.is_empty() {
        println!();
        println!("{}", style("Understanding").bold().cyan());
        println!("  {understanding}");
    }
    if !decisions.is_empty() {
        println!();
        println!("{}", style("Decisions already made").bold().cyan());
        for d in decisions {
            println!("  {} {}: {}", style("•").dim(), style(&d.topic).bold(), d.decision);
        }
    }
    println!();

    let mut answers = HashMap::new();
    for q in questions {
        if !q.why.is_empty() {
            println!("  {}", style(&q.why).dim());
        }

        let answer = if q.options.is_empty() {
            Input::<String>::with_theme(&theme)
                .with_prompt(&q.question)
                .allow_empty(true)
                .interact_text()
                .map_err(|e| prompt_error("ask", e))?
        } else {
            let mut items: Vec<&str> = q.options.iter().map(String::as_str).collect();
            items.push(OTHER_ANSWER);
            let selection = Select::with_theme(&theme)
                .with_prompt(&q.question)
                .items(&items)
                .default(0)
                .interact()
                .map_err(|e| prompt_error("ask", e))?;

            if selection < q.options.len() {
                q.options[selection].clone()
            } else {
                Input::<String>::with_theme(&theme)
                    .with_prompt("Your answer")
                    .allow_empty(true)
                    .interact_text()
                    .map_err(|e| prompt_error("ask", e))?
            }
        };
        answers.insert(q.id.clone(), answer);
    }
    Ok(answers)
}

fn resolve_blocking(request: &EscalationRequest) -> Result<EscalationDecision, CollaboratorError> {
    let theme = ColorfulTheme::default();

    println!();
    println!(
        "{} {} ({})",
        style("Escalation:").bold().yellow(),
        style(&request.task_title).bold(),
        request.task_id
    );
    println!("  Reason:  {}", request.reason);
    println!("  Retries: {}", request.retry_count);
    println!("  Tokens:  {}", request.tokens_spent);
    if !request.recent_errors.is_empty() {
        println!("  Recent errors:");
        for e in &request.recent_errors {
            println!("    {} {}", style("✗").red(), e);
        }
    }
    println!();

    let choices = escalation_choices(&request.reason);
    if !choices.contains(&Choice::RetryWithHint) {
        println!(
            "  {}",
            style("The token budget is spent, so a retry would escalate again at once.").dim()
        );
        println!();
    }
    let labels: Vec<&str> = choices.iter().map(|c| c.label()).collect();
    let selection = Select::with_theme(&theme)
        .with_prompt("How should this task proceed?")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(|e| prompt_error("resolve_escalation", e))?;

    match choices[selection] {
        Choice::RetryWithHint => {
            let hint: String = Input::with_theme(&theme)
                .with_prompt("Hint for the next attempt")
                .interact_text()
                .map_err(|e| prompt_error("resolve_escalation", e))?;
            Ok(EscalationDecision::RetryWithHint(hint))
        }
        Choice::Skip => Ok(EscalationDecision::Skip),
        Choice::Abort => Ok(EscalationDecision::Abort),
        Choice::Defer => Err(CollaboratorError::unavailable(
            "resolve_escalation",
            "decision deferred",
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    RetryWithHint,
    Skip,
    Abort,
    Defer,
}

impl Choice {
    fn label(self) -> &'static str {
        match self {
            Self::RetryWithHint => "Retry with a hint",
            Self::Skip => "Skip this task",
            Self::Abort => "Abort the run",
            Self::Defer => "Decide later (park the run)",
        }
    }
}

/// Menu for an escalation, default first. A task over its token budget
/// re-escalates on its next step, so retrying is not offered.
fn escalation_choices(reason: &EscalationReason) -> Vec<Choice> {
    match reason {
        EscalationReason::BudgetExceeded => vec![Choice::Skip, Choice::Abort, Choice::Defer],
        _ => vec![
            Choice::RetryWithHint,
            Choice::Skip,
            Choice::Abort,
            Choice::Defer,
        ],
    }
}

#[async_trait]
impl HumanPort for TerminalHuman {
    async fn ask(
        &self,
        questions: &[Question],
        decisions: &[Decision],
        understanding: &str,
    ) -> Result<HashMap<String, String>, CollaboratorError> {
        let questions = questions.to_vec();
        let decisions = decisions.to_vec();
        let understanding = understanding.to_string();
        tokio::task::spawn_blocking(move || ask_blocking(&questions, &decisions, &understanding))
            .await
            .map_err(|e| prompt_error("ask", e))?
    }

    async fn resolve_escalation(
        &self,
        request: &EscalationRequest,
    ) -> Result<EscalationDecision, CollaboratorError> {
        let request = request.clone();
        tokio::task::spawn_blocking(move || resolve_blocking(&request))
            .await
            .map_err(|e| prompt_error("resolve_escalation", e))?
    }
}

/// Never blocks on a human.
///
/// Spec questions get empty answers and escalations are deferred, which
/// parks the run until someone resumes it interactively.
#[derive(Debug, Default)]
pub struct DeferringHuman;

impl DeferringHuman {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HumanPort for DeferringHuman {
    async fn ask(
        &self,
        questions: &[Question],
        _decisions: &[Decision],
        _understanding: &str,
    ) -> Result<HashMap<String, String>, CollaboratorError> {
        info!(count = questions.len(), "Answering spec questions with defaults");
        Ok(questions
            .iter()
            .map(|q| (q.id.clone(), String::new()))
            .collect())
    }

    async fn resolve_escalation(
        &self,
        request: &EscalationRequest,
    ) -> Result<EscalationDecision, CollaboratorError> {
        info!(task = %request.task_id, reason = %request.reason, "Deferring escalation");
        Err(CollaboratorError::unavailable(
            "resolve_escalation",
            "running non-interactively",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{TaskRecord, TaskSpec};

    #[test]
    fn test_budget_escalation_does_not_offer_retry() {
        let choices = escalation_choices(&EscalationReason::BudgetExceeded);
        assert!(!choices.contains(&Choice::RetryWithHint));
        assert_eq!(choices[0], Choice::Skip);

        let choices = escalation_choices(&EscalationReason::RetriesExhausted);
        assert_eq!(choices[0], Choice::RetryWithHint);
        assert_eq!(choices.len(), 4);
    }

    #[tokio::test]
    async fn test_deferring_human_answers_with_empty_strings() {
        let human = DeferringHuman::new();
        let questions = vec![Question {
            id: "q1".to_string(),
            question: "Which database?".to_string(),
            why: String::new(),
            options: vec!["sqlite".to_string()],
        }];
        let answers = human.ask(&questions, &[], "").await.unwrap();
        assert_eq!(answers.get("q1").map(String::as_str), Some(""));
    }

    #[tokio::test]
    async fn test_deferring_human_never_resolves() {
        let human = DeferringHuman::new();
        let task = TaskRecord::new(TaskSpec::new("t1", "Build", "", vec![]), 0);
        let request = EscalationRequest::for_task(&task, EscalationReason::NeedsHuman);
        let err = human.resolve_escalation(&request).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable { .. }));
    }
}
