//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Nebula operator console
#[derive(Parser)]
#[command(
    name = "nc",
    about = "Operator console for Nebula execution plans",
    version,
    after_help = "Logs are written to: ~/.local/share/nebula-console/logs/console.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Bearer token, overrides the configured environment variable
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// List execution plans
    Plans,

    /// Show a plan's flow as an outline
    Show {
        plan_id: String,
    },

    /// Validate a local plan document (JSON or YAML), no engine needed
    Validate {
        file: PathBuf,
    },

    /// Start the whole plan
    Execute {
        plan_id: String,
    },

    /// Submit one step with operator inputs
    Step {
        plan_id: String,

        step_id: String,

        /// Scope path of a nested step, e.g. `loop1:body/cond1:then`
        #[arg(long)]
        path: Option<String>,

        /// Instruction; defaults to the step's declared one
        #[arg(short, long)]
        instruction: Option<String>,

        /// Configuration as a JSON object
        #[arg(long = "config-json", value_name = "JSON")]
        configuration: Option<String>,

        #[arg(long)]
        api_url: Option<String>,

        #[arg(long)]
        api_key: Option<String>,

        #[arg(long)]
        client_id: Option<String>,

        #[arg(long)]
        client_secret: Option<String>,
    },

    /// Show a plan's execution status
    Status {
        plan_id: String,

        /// Keep polling until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// List the agents taking part in a plan's execution
    Agents {
        plan_id: String,
    },

    /// Stop a running execution
    Stop {
        plan_id: String,
    },

    /// Approve (or reject) a gated step
    Approve {
        plan_id: String,

        step_id: String,

        /// Reject instead of approving
        #[arg(long)]
        reject: bool,

        #[arg(long)]
        feedback: Option<String>,
    },

    /// Turn a natural-language prompt into a plan
    Prompt {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Show active executions and dashboard stats
    Monitor {
        /// Keep polling until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Stream realtime status updates
    Watch {
        /// Only updates for this plan
        #[arg(long)]
        plan_id: Option<String>,
    },

    /// Launch the interactive console
    Tui,
}

/// Output format for listing commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["nc"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_parse_plans() {
        let cli = Cli::parse_from(["nc", "plans"]);
        assert!(matches!(cli.command, Some(Command::Plans)));
    }

    #[test]
    fn test_cli_parse_validate() {
        let cli = Cli::parse_from(["nc", "validate", "plan.yml"]);
        match cli.command {
            Some(Command::Validate { file }) => assert_eq!(file, PathBuf::from("plan.yml")),
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_cli_parse_step() {
        let cli = Cli::parse_from([
            "nc",
            "step",
            "P1",
            "S2",
            "--path",
            "L:body",
            "-i",
            "summarise",
            "--config-json",
            r#"{"limit": 5}"#,
            "--api-key",
            "k",
        ]);
        if let Some(Command::Step {
            plan_id,
            step_id,
            path,
            instruction,
            configuration,
            api_key,
            client_secret,
            ..
        }) = cli.command
        {
            assert_eq!(plan_id, "P1");
            assert_eq!(step_id, "S2");
            assert_eq!(path.as_deref(), Some("L:body"));
            assert_eq!(instruction.as_deref(), Some("summarise"));
            assert_eq!(configuration.as_deref(), Some(r#"{"limit": 5}"#));
            assert_eq!(api_key.as_deref(), Some("k"));
            assert!(client_secret.is_none());
        } else {
            panic!("Expected Step command");
        }
    }

    #[test]
    fn test_cli_parse_approve_reject() {
        let cli = Cli::parse_from(["nc", "approve", "P1", "S1", "--reject", "--feedback", "wrong target"]);
        assert!(matches!(
            cli.command,
            Some(Command::Approve { reject: true, feedback: Some(_), .. })
        ));
    }

    #[test]
    fn test_cli_parse_prompt_words() {
        let cli = Cli::parse_from(["nc", "prompt", "sync", "the", "crm"]);
        match cli.command {
            Some(Command::Prompt { text }) => assert_eq!(text.join(" "), "sync the crm"),
            _ => panic!("Expected Prompt command"),
        }
    }

    #[test]
    fn test_cli_parse_watch() {
        let cli = Cli::parse_from(["nc", "watch", "--plan-id", "P1"]);
        assert!(matches!(cli.command, Some(Command::Watch { plan_id: Some(_) })));
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from(["nc", "-c", "/path/to/config.yml", "--format", "json", "status", "P1", "--watch"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Some(Command::Status { watch: true, .. })));
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("table".parse::<OutputFormat>().is_err());
    }
}
