use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "autoergen", version, about = "Turn database descriptions into ER diagrams and SQL")]
pub struct Cli {
    /// Data directory (settings, users, projects, logs)
    #[arg(long, global = true, env = "AUTOERGEN_HOME")]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a diagram (and SQL) from a description
    Generate(GenerateArgs),
    /// Render DOT source to an image with Graphviz
    Render(RenderArgs),
    /// Print placeholder SQL for an ER specification JSON file
    Schema(SchemaArgs),
    /// Create an account (and its default project)
    Signup(Credentials),
    /// Check credentials and list the account's projects
    Login(Credentials),
    /// List or create projects
    Projects(ProjectsArgs),
    /// Show the generation log of a project
    Logs(LogsArgs),
    /// Show or change settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Pipeline {
    /// Model returns entities/relationships as JSON; DOT and SQL are derived locally
    Structured,
    /// Model writes DOT directly
    Markup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Dot,
    Sql,
    Json,
    Svg,
    Png,
    Pdf,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Database description; `-` reads standard input
    pub description: String,

    #[arg(long, value_enum, default_value_t = Pipeline::Structured)]
    pub pipeline: Pipeline,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Dot)]
    pub format: OutputFormat,

    /// Write to a file instead of standard output
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    // Optional: log this generation under the account's project.
    #[command(flatten)]
    pub account: OptionalCredentials,

    /// Project to log into (default: the account's first project)
    #[arg(long, requires = "email")]
    pub project: Option<u64>,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// DOT file; `-` reads standard input
    pub input: PathBuf,

    #[arg(short, long, default_value = "svg")]
    pub format: String,

    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// ER specification JSON file; `-` reads standard input
    pub input: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct Credentials {
    #[arg(long)]
    pub email: String,

    #[arg(long, env = "AUTOERGEN_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Clone, Args)]
pub struct OptionalCredentials {
    #[arg(long, requires = "password")]
    pub email: Option<String>,

    #[arg(long, env = "AUTOERGEN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProjectsArgs {
    #[command(flatten)]
    pub credentials: Credentials,

    /// Create a project with this name
    #[arg(long)]
    pub create: Option<String>,

    #[arg(long, default_value = "", requires = "create")]
    pub description: String,
}

#[derive(Debug, Args)]
pub struct LogsArgs {
    #[command(flatten)]
    pub credentials: Credentials,

    /// Project id (default: the account's first project)
    #[arg(long)]
    pub project: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print settings with the API key masked
    Show,
    /// Update settings; only given fields change
    Set(ConfigSetArgs),
}

#[derive(Debug, Args)]
pub struct ConfigSetArgs {
    /// openai, anthropic, google, ollama, groq, mistral or deepseek
    #[arg(long)]
    pub provider: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub api_key: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    /// 0 disables the prompt cache
    #[arg(long)]
    pub cache_ttl_secs: Option<u64>,

    #[arg(long, value_enum)]
    pub layout: Option<LayoutArg>,

    #[arg(long)]
    pub fill_color: Option<String>,

    /// Path to the Graphviz `dot` binary
    #[arg(long)]
    pub graphviz: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// Left to right
    Lr,
    /// Top to bottom
    Tb,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_defaults() {
        let cli = Cli::try_parse_from(["autoergen", "generate", "Customers place Orders"]).unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.pipeline, Pipeline::Structured);
        assert_eq!(args.format, OutputFormat::Dot);
        assert!(args.account.email.is_none());
    }

    #[test]
    fn test_config_set_parses() {
        let cli = Cli::try_parse_from([
            "autoergen", "config", "set", "--temperature", "0.1", "--layout", "tb",
        ])
        .unwrap();
        let Command::Config(ConfigCommand::Set(args)) = cli.command else {
            panic!("expected config set");
        };
        assert_eq!(args.temperature, Some(0.1));
        assert_eq!(args.layout, Some(LayoutArg::Tb));
    }
}
