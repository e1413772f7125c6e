use std::{error::Error, fs, path::PathBuf, sync::mpsc, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use testsmith::{
    builder::CommandBuilder,
    config::{default_result_dir, JobPolicy, LlmSettings, PipelineConfig},
    context::{ClassContext, PromptContext, TypeSignature},
    llm::{
        client::LlmClient,
        orchestrator::{run_test_generation, Collaborators, Pipeline, PipelineEvent},
    },
    logger::{init_tracing, JobLog, LogLevel},
    monitor::Deadline,
    persistence::JsonResultStore,
    testgen::{imports::extract_package, language::Language},
    workspace::{JobKey, Workspace},
};

#[derive(Parser)]
#[command(
    name = "testsmith",
    version,
    about = "Generate unit tests for a class with a chat-completion LLM."
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Generate tests for one class
    Generate(GenerateArgs),
    /// Save the LLM token and model
    Configure(ConfigureArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(long, help = "Source file of the class under test")]
    source: PathBuf,

    #[arg(long = "class", help = "Fully-qualified name of the class under test")]
    class_fqn: String,

    #[arg(long, help = "java | kotlin (default: from the file extension)")]
    language: Option<Language>,

    #[arg(long, help = "Source file of a type used by the class under test")]
    related: Vec<PathBuf>,

    #[arg(long, help = "Polymorphic relation as <super>=<sub>")]
    subclass: Vec<String>,

    #[arg(long, help = "Shell command verifying the project builds")]
    build_cmd: Option<String>,

    #[arg(long, default_value = ".", help = "Project root for the build command")]
    project_root: PathBuf,

    #[arg(long, default_value = "", help = "Project classpath recorded with the result")]
    classpath: String,

    #[arg(long, help = "Directory for generated results")]
    out_dir: Option<PathBuf>,

    #[arg(long, help = "Override the configured model")]
    model: Option<String>,

    #[arg(
        long,
        default_value_t = false,
        help = "Cancel a running job for the same class instead of refusing"
    )]
    replace: bool,

    #[arg(long, help = "Cancel the job if it has not finished after this many seconds")]
    max_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct ConfigureArgs {
    #[arg(long, help = "API token for the chat-completion backend")]
    token: String,

    #[arg(long, help = "Model name")]
    model: Option<String>,

    #[arg(long, help = "Chat-completion endpoint URL")]
    base_url: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    match Cli::parse().command {
        CliCommand::Configure(args) => {
            let settings = LlmSettings::configure(args.token, args.model, args.base_url)?;
            println!("Saved settings for model {}", settings.model);
            Ok(())
        }
        CliCommand::Generate(args) => generate(args),
    }
}

/// Runs one job on a worker thread and waits for it.
///
/// `--max-secs` cancels the job through its token. Ctrl-C is not trapped:
/// it ends the process, and since results are only written after the suite
/// is assembled, an interrupted job leaves nothing behind.
fn generate(args: GenerateArgs) -> Result<(), Box<dyn Error>> {
    let language = match args.language {
        Some(lang) => lang,
        None => args
            .source
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
            .ok_or("cannot infer language from the source file; pass --language")?,
    };

    let mut llm = LlmSettings::load()?;
    if let Some(model) = args.model {
        llm.model = model;
    }
    if !llm.is_configured() {
        return Err("LLM token not set. Run `testsmith configure --token <token>` or set TESTSMITH_TOKEN".into());
    }

    let source = fs::read_to_string(&args.source)?;
    let mut context = PromptContext::new(ClassContext::new(&args.class_fqn, source, language));

    for path in &args.related {
        let text = fs::read_to_string(path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let fqn = match extract_package(&text) {
            Some(pkg) => format!("{pkg}.{stem}"),
            None => stem.to_string(),
        };
        let related_lang = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
            .unwrap_or(language);
        context
            .related
            .push(TypeSignature::from_source(fqn, &text, related_lang));
    }

    for relation in &args.subclass {
        let (sup, sub) = relation
            .split_once('=')
            .ok_or_else(|| format!("invalid --subclass `{relation}`, expected <super>=<sub>"))?;
        context.add_subclass(sup.trim(), sub.trim());
    }

    let mut config = PipelineConfig::new(llm);
    config.result_dir = args.out_dir.unwrap_or_else(default_result_dir);
    if args.replace {
        config.job_policy = JobPolicy::Replace;
    }

    let canonical = fs::canonicalize(&args.source)?;
    let modified: DateTime<Utc> = fs::metadata(&canonical)?.modified()?.into();
    let key = JobKey::new(
        format!("file://{}", canonical.display()),
        &args.class_fqn,
        modified.timestamp(),
        args.classpath,
    );

    let store = JsonResultStore::new(&config.result_dir);
    let result_path = store.result_path(&key);
    let collaborators = Collaborators {
        builder: Arc::new(CommandBuilder::new(args.project_root, args.build_cmd)),
        backend: Arc::new(LlmClient::new(config.llm.clone())?),
        store: Arc::new(store),
    };

    let pipeline = Pipeline::new(
        config,
        key,
        context,
        Arc::new(Workspace::new()),
        collaborators,
    );

    let (tx, rx) = mpsc::channel();
    let handle = run_test_generation(pipeline, tx)?;
    let deadline = args
        .max_secs
        .map(|secs| Deadline::start(handle.cancel_token(), Duration::from_secs(secs)));
    let mut job_log = JobLog::new();

    for event in rx.iter() {
        match event {
            PipelineEvent::Log(level, text) => {
                print_log_line(level, &text);
                job_log.log(level, text);
            }
            PipelineEvent::State(_) => {}
            PipelineEvent::Finished { .. }
            | PipelineEvent::Failed(_)
            | PipelineEvent::Cancelled => break,
        }
    }

    let result = handle.join();
    if let Some(deadline) = deadline {
        deadline.disarm();
    }
    let suite = result?;

    println!();
    for case in &suite.test_cases {
        println!("  [{}] {}", case.id, case.name);
    }
    println!("Result written to {}", result_path.display());

    Ok(())
}

fn print_log_line(level: LogLevel, text: &str) {
    let tag = match level {
        LogLevel::Info => "INFO",
        LogLevel::Success => " OK ",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "FAIL",
    };
    println!("[{tag}] {text}");
}
