use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use llmview_core::{
    config::Config,
    detector::ApiKind,
    inspect::Inspector,
    model::{FlowAction, FlowRef},
    providers::{anthropic, openai},
    source::MitmwebClient,
    telemetry::{TracingSink, set_telemetry_sink},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Readable views of captured LLM API traffic", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Openai,
    Anthropic,
}

impl From<ProviderArg> for ApiKind {
    fn from(p: ProviderArg) -> Self {
        match p {
            ProviderArg::Openai => ApiKind::OpenAI,
            ProviderArg::Anthropic => ApiKind::Anthropic,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Request,
    Response,
}

impl From<ActionArg> for FlowAction {
    fn from(a: ActionArg) -> Self {
        match a {
            ActionArg::Request => FlowAction::Request,
            ActionArg::Response => FlowAction::Response,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fold a captured event-stream body into one response
    Aggregate {
        #[arg(long, value_enum)]
        provider: ProviderArg,
        #[arg(short, long, help = "SSE body to read (stdin when omitted)")]
        file: Option<PathBuf>,
    },
    /// List LLM flows on the inspection host
    Flows {
        #[arg(long, help = "Config file (JSON or TOML)")]
        config: Option<PathBuf>,
        #[arg(long, help = "Override host.base_url")]
        host: Option<String>,
    },
    /// Render one side of a captured flow
    Inspect {
        #[arg(required_unless_present = "url")]
        flow_id: Option<String>,
        #[arg(long, value_enum, default_value = "response")]
        action: ActionArg,
        #[arg(long, help = "UI location such as http://host/#/flows/<id>/response")]
        url: Option<String>,
        #[arg(long, help = "Config file (JSON or TOML)")]
        config: Option<PathBuf>,
        #[arg(long, help = "Override host.base_url")]
        host: Option<String>,
    },
}

fn load_config(path: Option<PathBuf>, host: Option<String>) -> anyhow::Result<Config> {
    let mut cfg = match path {
        Some(p) => Config::from_path(&p).with_context(|| format!("loading {}", p.display()))?,
        None => Config::default(),
    };
    if let Some(h) = host {
        cfg.host.base_url = h;
    }
    Ok(cfg)
}

fn read_input(file: Option<PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(p) => std::fs::read_to_string(&p).with_context(|| format!("reading {}", p.display())),
        None => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s).context("reading stdin")?;
            Ok(s)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
    set_telemetry_sink(Arc::new(TracingSink));

    let cli = Cli::parse();

    match cli.command {
        Commands::Aggregate { provider, file } => {
            let text = read_input(file)?;
            let out = match ApiKind::from(provider) {
                ApiKind::OpenAI => serde_json::to_string_pretty(&openai::aggregate(&openai::parse_stream(&text))?)?,
                ApiKind::Anthropic => {
                    serde_json::to_string_pretty(&anthropic::aggregate(&anthropic::parse_stream(&text))?)?
                }
            };
            println!("{out}");
        }
        Commands::Flows { config, host } => {
            let cfg = load_config(config, host)?;
            let inspector = Inspector::new(Arc::new(MitmwebClient::from_config(&cfg)?));
            for (flow, api) in inspector.llm_flows().await? {
                println!(
                    "{}\t{}\t{} {}",
                    flow.id, api, flow.request.method, flow.request.path
                );
            }
        }
        Commands::Inspect {
            flow_id,
            action,
            url,
            config,
            host,
        } => {
            let (id, action) = match (flow_id, url) {
                (Some(id), _) => (id, FlowAction::from(action)),
                (None, Some(u)) => match FlowRef::from_url(&u) {
                    Some(r) => (r.id, r.action),
                    None => bail!("not a flow location: {u}"),
                },
                (None, None) => bail!("a flow id or --url is required"),
            };
            let cfg = load_config(config, host)?;
            let inspector = Inspector::new(Arc::new(MitmwebClient::from_config(&cfg)?));
            match inspector.inspect(&id, action).await? {
                Some(view) => println!("{}", serde_json::to_string_pretty(&view)?),
                None => eprintln!("[flow {id} {action}: not an LLM body, nothing to render]"),
            }
        }
    }

    Ok(())
}
