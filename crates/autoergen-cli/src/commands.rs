use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use autoergen_core::{schema, GraphvizEngine, ImageFormat, Layout, Project, Settings, Store, User};
use autoergen_suggest::{parse, Architect};

use crate::cli::{
    Cli, Command, ConfigCommand, ConfigSetArgs, Credentials, GenerateArgs, LayoutArg, LogsArgs,
    OutputFormat, Pipeline, ProjectsArgs, RenderArgs, SchemaArgs,
};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let home = cli.home.unwrap_or_else(autoergen_core::data_dir);
    match cli.command {
        Command::Generate(args) => generate(&home, args).await,
        Command::Render(args) => render(&home, args),
        Command::Schema(args) => schema_cmd(args),
        Command::Signup(credentials) => signup(&home, &credentials),
        Command::Login(credentials) => login(&home, &credentials),
        Command::Projects(args) => projects(&home, args),
        Command::Logs(args) => logs(&home, args),
        Command::Config(ConfigCommand::Show) => config_show(&home),
        Command::Config(ConfigCommand::Set(args)) => config_set(&home, args),
    }
}

// --- generate ---

async fn generate(home: &Path, args: GenerateArgs) -> anyhow::Result<()> {
    let settings = Settings::load(home)?;
    let description = if args.description == "-" {
        read_stdin()?
    } else {
        args.description.clone()
    };
    if description.trim().is_empty() {
        bail!("please enter a description");
    }
    if args.pipeline == Pipeline::Markup && matches!(args.format, OutputFormat::Sql | OutputFormat::Json) {
        bail!("the markup pipeline only produces DOT or images; use --pipeline structured for SQL/JSON");
    }

    let mut architect = Architect::from_settings(&settings)?;
    if let (Some(email), Some(password)) = (&args.account.email, &args.account.password) {
        let store = Arc::new(Store::open(home)?);
        let user = authenticate(&store, email, password)?;
        let project = resolve_project(&store, &user, args.project)?;
        tracing::info!(project_id = project.id, "logging generation");
        architect = architect.with_journal(store, project.id);
    }

    let dot = match args.pipeline {
        Pipeline::Markup => architect.draft_markup(&description).await?.dot,
        Pipeline::Structured => {
            let draft = architect.draft_er(&description).await?;
            if let Some(err) = &draft.parse_error {
                tracing::warn!(error = %err, raw = %draft.raw, "model output was not a valid ER specification");
            }
            if draft.spec.entities().is_empty() {
                bail!("could not extract any entities; try a more descriptive text");
            }
            match args.format {
                OutputFormat::Sql => return write_output(args.output.as_deref(), draft.sql().as_bytes()),
                OutputFormat::Json => {
                    let body = serde_json::json!({
                        "entities": draft.spec.entities(),
                        "relationships": draft.spec.relationships(),
                        "dot": draft.dot(architect.style()),
                        "sql": draft.sql(),
                    });
                    let text = serde_json::to_string_pretty(&body)?;
                    return write_output(args.output.as_deref(), text.as_bytes());
                }
                _ => draft.dot(architect.style()),
            }
        }
    };

    match image_format(args.format) {
        Some(format) => {
            let bytes = render_dot(&settings, &dot, format)?;
            write_output(args.output.as_deref(), &bytes)
        }
        None => write_output(args.output.as_deref(), dot.as_bytes()),
    }
}

fn image_format(format: OutputFormat) -> Option<ImageFormat> {
    match format {
        OutputFormat::Svg => Some(ImageFormat::Svg),
        OutputFormat::Png => Some(ImageFormat::Png),
        OutputFormat::Pdf => Some(ImageFormat::Pdf),
        OutputFormat::Dot | OutputFormat::Sql | OutputFormat::Json => None,
    }
}

fn render_dot(settings: &Settings, dot: &str, format: ImageFormat) -> anyhow::Result<Vec<u8>> {
    let engine = GraphvizEngine::locate(settings.graphviz_path.as_deref())?;
    engine
        .render(dot, format)
        .context("Graphviz rendering error")
}

// --- render / schema ---

fn render(home: &Path, args: RenderArgs) -> anyhow::Result<()> {
    let settings = Settings::load(home)?;
    let format: ImageFormat = args.format.parse().map_err(|e: String| anyhow!(e))?;
    let dot = read_input(&args.input)?;
    let bytes = render_dot(&settings, &dot, format)?;
    write_output(args.output.as_deref(), &bytes)
}

fn schema_cmd(args: SchemaArgs) -> anyhow::Result<()> {
    let raw = read_input(&args.input)?;
    let spec = parse::parse_er_spec(&raw)?;
    let mut sql = schema::synthesize(&spec);
    sql.push('\n');
    write_output(None, sql.as_bytes())
}

// --- accounts ---

fn authenticate(store: &Store, email: &str, password: &str) -> anyhow::Result<User> {
    store
        .authenticate(email, password)?
        .ok_or_else(|| anyhow!("invalid credentials"))
}

fn resolve_project(store: &Store, user: &User, requested: Option<u64>) -> anyhow::Result<Project> {
    let mut projects = store.projects_for(user.id)?;
    match requested {
        Some(id) => {
            let idx = projects
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| anyhow!("project {id} does not belong to {}", user.email))?;
            Ok(projects.swap_remove(idx))
        }
        None => projects
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("{} has no projects", user.email)),
    }
}

fn signup(home: &Path, credentials: &Credentials) -> anyhow::Result<()> {
    let store = Store::open(home)?;
    let user = store.create_user(&credentials.email, &credentials.password)?;
    println!("Account created for {}. Please log in.", user.email);
    Ok(())
}

fn login(home: &Path, credentials: &Credentials) -> anyhow::Result<()> {
    let store = Store::open(home)?;
    let user = authenticate(&store, &credentials.email, &credentials.password)?;
    println!("Logged in as {} (user {})", user.email, user.id);
    print_projects(&store.projects_for(user.id)?);
    Ok(())
}

fn projects(home: &Path, args: ProjectsArgs) -> anyhow::Result<()> {
    let store = Store::open(home)?;
    let user = authenticate(&store, &args.credentials.email, &args.credentials.password)?;
    if let Some(name) = &args.create {
        let project = store.create_project(user.id, name, &args.description)?;
        println!("Created project {} ({})", project.id, project.name);
    }
    print_projects(&store.projects_for(user.id)?);
    Ok(())
}

fn print_projects(projects: &[Project]) {
    for p in projects {
        println!("{}\t{}\t{}", p.id, p.name, p.description);
    }
}

fn logs(home: &Path, args: LogsArgs) -> anyhow::Result<()> {
    let store = Store::open(home)?;
    let user = authenticate(&store, &args.credentials.email, &args.credentials.password)?;
    let project = resolve_project(&store, &user, args.project)?;
    let entries = store.logs_for(project.id)?;
    if entries.is_empty() {
        println!("No generations logged for {}.", project.name);
    }
    for entry in entries {
        println!(
            "{}\t{:.2}s\t{}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.execution_time,
            entry.user_prompt.replace('\n', " ")
        );
    }
    Ok(())
}

// --- config ---

fn config_show(home: &Path) -> anyhow::Result<()> {
    let settings = Settings::load(home)?;
    println!("{}", serde_json::to_string_pretty(&settings.masked())?);
    Ok(())
}

fn config_set(home: &Path, args: ConfigSetArgs) -> anyhow::Result<()> {
    let settings = update_settings(home, args)?;
    println!("{}", serde_json::to_string_pretty(&settings.masked())?);
    Ok(())
}

fn update_settings(home: &Path, args: ConfigSetArgs) -> anyhow::Result<Settings> {
    let mut settings = Settings::read(home)?;
    if let Some(provider) = args.provider {
        settings.provider = provider;
    }
    if let Some(model) = args.model {
        settings.model = model;
    }
    // Empty key means "keep existing"
    if let Some(key) = args.api_key.filter(|k| !k.is_empty()) {
        settings.api_key = key;
    }
    if let Some(temperature) = args.temperature {
        settings.temperature = temperature;
    }
    if let Some(ttl) = args.cache_ttl_secs {
        settings.cache_ttl_secs = ttl;
    }
    if let Some(layout) = args.layout {
        settings.diagram.layout = match layout {
            LayoutArg::Lr => Layout::LeftToRight,
            LayoutArg::Tb => Layout::TopToBottom,
        };
    }
    if let Some(color) = args.fill_color {
        settings.diagram.fill_color = color;
    }
    if let Some(path) = args.graphviz {
        settings.graphviz_path = Some(path).filter(|p| !p.is_empty());
    }
    settings.validate()?;
    settings.write(home)?;
    Ok(settings)
}

// --- io ---

fn read_stdin() -> anyhow::Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        return read_stdin();
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = bytes.len(), "output written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            if !bytes.ends_with(b"\n") && std::str::from_utf8(bytes).is_ok() {
                stdout.write_all(b"\n")?;
            }
            stdout.flush()?;
        }
    }
    Ok(())
}
