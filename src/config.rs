//! Layered configuration for Foundry.
//!
//! Settings are read from `<output_dir>/foundry.toml`, then environment
//! variables, then CLI flags, each layer overriding the previous one.
//!
//! # Configuration File Format
//!
//! ```toml
//! [gates]
//! min_confidence = 0.6
//! max_entropy = 0.7
//! max_reflection_iterations = 2
//! max_debate_rounds = 3
//! escalation_token_budget = 200000
//!
//! [run]
//! retry_failed_on_resume = true
//! max_resume_retries = 1
//! retry_count_policy = "reset"
//! skip_skill_learning = false
//!
//! [agent]
//! command = "claude"
//! args = ["--print", "--output-format", "json"]
//! timeout_secs = 900
//!
//! [verify]
//! command = "cargo test"
//! error_patterns = ["error\\[E\\d+\\]", "panicked at"]
//! timeout_secs = 900
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::gate::GateThresholds;
use crate::pipeline::RunOptions;
use crate::store::ResumePolicy;

/// Config file name inside the output directory
pub const CONFIG_FILE: &str = "foundry.toml";

/// Default output directory, relative to the project directory
pub const DEFAULT_OUTPUT_DIR: &str = ".foundry";

/// What happens to `retry_count` when a human answers "retry with hint".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryCountPolicy {
    /// Start the reflection budget over
    #[default]
    Reset,
    /// Keep counting from where the task was
    Preserve,
}

impl std::fmt::Display for RetryCountPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryCountPolicy::Reset => write!(f, "reset"),
            RetryCountPolicy::Preserve => write!(f, "preserve"),
        }
    }
}

impl std::str::FromStr for RetryCountPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reset" => Ok(RetryCountPolicy::Reset),
            "preserve" => Ok(RetryCountPolicy::Preserve),
            _ => anyhow::bail!(
                "Invalid retry count policy '{}'. Valid values: reset, preserve",
                s
            ),
        }
    }
}

/// Run-level behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSection {
    /// Give failed tasks another pass when a run is resumed
    #[serde(default = "default_true")]
    pub retry_failed_on_resume: bool,
    /// How many times resume may retry the same task
    #[serde(default = "default_max_resume_retries")]
    pub max_resume_retries: u32,
    #[serde(default)]
    pub retry_count_policy: RetryCountPolicy,
    #[serde(default)]
    pub skip_skill_learning: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_resume_retries() -> u32 {
    1
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            retry_failed_on_resume: true,
            max_resume_retries: default_max_resume_retries(),
            retry_count_policy: RetryCountPolicy::default(),
            skip_skill_learning: false,
        }
    }
}

/// The agent command used for reasoning and execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSection {
    /// Program to run (default: "claude")
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_agent_args() -> Vec<String> {
    vec![
        "--print".to_string(),
        "--output-format".to_string(),
        "json".to_string(),
    ]
}

fn default_timeout_secs() -> u64 {
    900
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            command: None,
            args: default_agent_args(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// The command that checks the project after each execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifySection {
    /// Shell command run in the project directory; exit status 0 passes
    #[serde(default)]
    pub command: Option<String>,
    /// Regexes whose matching output lines are reported as detected errors
    #[serde(default = "default_error_patterns")]
    pub error_patterns: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_error_patterns() -> Vec<String> {
    vec![
        r"error(\[E\d+\])?:".to_string(),
        r"panicked at".to_string(),
        r"FAILED".to_string(),
        r"Traceback \(most recent call last\)".to_string(),
    ]
}

impl Default for VerifySection {
    fn default() -> Self {
        Self {
            command: None,
            error_patterns: default_error_patterns(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Contents of `foundry.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoundryToml {
    #[serde(default)]
    pub gates: GateThresholds,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub verify: VerifySection,
}

impl FoundryToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse foundry.toml")
    }

    /// Load from `<output_dir>/foundry.toml`, or defaults if it does not exist.
    pub fn load_or_default(output_dir: &Path) -> Result<Self> {
        let config_path = output_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize foundry.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Agent program: file, then `FOUNDRY_AGENT_CMD`, then "claude".
    pub fn agent_command_with(&self, env: impl Fn(&str) -> Option<String>) -> String {
        self.agent
            .command
            .clone()
            .or_else(|| env("FOUNDRY_AGENT_CMD"))
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Verification command: file, then `FOUNDRY_VERIFY_CMD`.
    pub fn verify_command_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.verify
            .command
            .clone()
            .or_else(|| env("FOUNDRY_VERIFY_CMD"))
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let gates = &self.gates;

        if !(0.0..=1.0).contains(&gates.min_confidence) {
            warnings.push(format!(
                "gates.min_confidence {} is outside [0, 1]",
                gates.min_confidence
            ));
        }
        if !(0.0..=1.0).contains(&gates.max_entropy) {
            warnings.push(format!(
                "gates.max_entropy {} is outside [0, 1]",
                gates.max_entropy
            ));
        }
        if gates.escalation_token_budget == 0 {
            warnings.push(
                "gates.escalation_token_budget is 0: every task will escalate immediately"
                    .to_string(),
            );
        }
        if gates.max_debate_rounds == 0 {
            warnings.push(
                "gates.max_debate_rounds is 0: plans failing the gate execute without debate"
                    .to_string(),
            );
        }

        for pattern in &self.verify.error_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                warnings.push(format!("Invalid verify.error_patterns entry '{pattern}': {e}"));
            }
        }

        if self.agent.timeout_secs == 0 || self.verify.timeout_secs == 0 {
            warnings.push("A timeout of 0 seconds disables the command entirely".to_string());
        }

        warnings
    }
}

/// Unified configuration: file, then environment, then CLI.
#[derive(Debug, Clone)]
pub struct FoundryConfig {
    /// Directory the agent and verification command run in
    pub project_dir: PathBuf,
    /// Where runs, the skill bank and logs are kept
    pub output_dir: PathBuf,
    /// Parsed foundry.toml configuration
    pub toml: FoundryToml,
    /// CLI override: verbose mode
    pub verbose: bool,
    /// CLI override: never prompt
    pub yes: bool,
    /// CLI override: stop after the task graph
    pub plan_only: bool,
    /// CLI override: disable skill extraction
    pub no_skill_learning: bool,
}

impl FoundryConfig {
    pub fn new(project_dir: PathBuf, output_dir: Option<PathBuf>) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let output_dir = output_dir.unwrap_or_else(|| project_dir.join(DEFAULT_OUTPUT_DIR));
        let toml = FoundryToml::load_or_default(&output_dir)?;

        Ok(Self {
            project_dir,
            output_dir,
            toml,
            verbose: false,
            yes: false,
            plan_only: false,
            no_skill_learning: false,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.output_dir.join(CONFIG_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }

    pub fn agent_command(&self) -> String {
        self.toml.agent_command_with(|key| std::env::var(key).ok())
    }

    pub fn verify_command(&self) -> Option<String> {
        self.toml.verify_command_with(|key| std::env::var(key).ok())
    }

    /// Options for the coordinator, with CLI flags applied.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            thresholds: self.toml.gates.clone(),
            plan_only: self.plan_only,
            skip_skill_learning: self.no_skill_learning || self.toml.run.skip_skill_learning,
            retry_count_policy: self.toml.run.retry_count_policy,
            resume: ResumePolicy {
                retry_failed: self.toml.run.retry_failed_on_resume,
                max_resume_retries: self.toml.run.max_resume_retries,
            },
        }
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let toml = FoundryToml::parse("").unwrap();
        assert_eq!(toml, FoundryToml::default());
        assert_eq!(toml.gates.min_confidence, 0.6);
        assert!(toml.run.retry_failed_on_resume);
        assert_eq!(toml.run.retry_count_policy, RetryCountPolicy::Reset);
        assert_eq!(toml.agent.args, vec!["--print", "--output-format", "json"]);
    }

    #[test]
    fn test_parse_sections() {
        let content = r#"
[gates]
min_confidence = 0.8
escalation_token_budget = 5000

[run]
retry_count_policy = "preserve"
skip_skill_learning = true

[agent]
command = "my-agent"

[verify]
command = "make test"
"#;
        let toml = FoundryToml::parse(content).unwrap();
        assert_eq!(toml.gates.min_confidence, 0.8);
        assert_eq!(toml.gates.max_entropy, 0.7);
        assert_eq!(toml.gates.escalation_token_budget, 5000);
        assert_eq!(toml.run.retry_count_policy, RetryCountPolicy::Preserve);
        assert!(toml.run.skip_skill_learning);
        assert_eq!(toml.agent_command_with(no_env), "my-agent");
        assert_eq!(toml.verify_command_with(no_env).as_deref(), Some("make test"));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = FoundryToml::parse("[gates\nmin_confidence = ").unwrap_err();
        assert!(err.to_string().contains("foundry.toml"));
    }

    #[test]
    fn test_agent_command_priority() {
        let env = |key: &str| (key == "FOUNDRY_AGENT_CMD").then(|| "env-agent".to_string());

        let toml = FoundryToml::default();
        assert_eq!(toml.agent_command_with(no_env), "claude");
        assert_eq!(toml.agent_command_with(env), "env-agent");

        let toml = FoundryToml::parse("[agent]\ncommand = \"file-agent\"").unwrap();
        assert_eq!(toml.agent_command_with(env), "file-agent");
    }

    #[test]
    fn test_verify_command_from_env() {
        let env = |key: &str| (key == "FOUNDRY_VERIFY_CMD").then(|| "pytest".to_string());
        let toml = FoundryToml::default();
        assert_eq!(toml.verify_command_with(no_env), None);
        assert_eq!(toml.verify_command_with(env).as_deref(), Some("pytest"));
    }

    #[test]
    fn test_retry_count_policy_from_str() {
        assert_eq!("Reset".parse::<RetryCountPolicy>().unwrap(), RetryCountPolicy::Reset);
        assert_eq!(
            "preserve".parse::<RetryCountPolicy>().unwrap(),
            RetryCountPolicy::Preserve
        );
        assert!("sometimes".parse::<RetryCountPolicy>().is_err());
    }

    #[test]
    fn test_validate_defaults_clean() {
        assert!(FoundryToml::default().validate().is_empty());
    }

    #[test]
    fn test_validate_warnings() {
        let content = r#"
[gates]
min_confidence = 1.5
escalation_token_budget = 0

[verify]
error_patterns = ["("]
"#;
        let warnings = FoundryToml::parse(content).unwrap().validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("min_confidence")));
        assert!(warnings.iter().any(|w| w.contains("escalation_token_budget")));
        assert!(warnings.iter().any(|w| w.contains("error_patterns")));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = FoundryToml::default();
        toml.gates.max_debate_rounds = 5;
        toml.save(&path).unwrap();

        assert_eq!(FoundryToml::load_or_default(dir.path()).unwrap(), toml);
    }

    #[test]
    fn test_config_cli_overrides_apply_to_run_options() {
        let dir = TempDir::new().unwrap();
        let mut config = FoundryConfig::new(dir.path().to_path_buf(), None).unwrap();
        assert!(config.output_dir.ends_with(DEFAULT_OUTPUT_DIR));

        let options = config.run_options();
        assert!(!options.plan_only);
        assert!(!options.skip_skill_learning);
        assert!(options.resume.retry_failed);

        config.plan_only = true;
        config.no_skill_learning = true;
        let options = config.run_options();
        assert!(options.plan_only);
        assert!(options.skip_skill_learning);
    }
}
