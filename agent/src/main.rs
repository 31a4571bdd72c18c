mod tools;

use anyhow::Context as _;
use clap::Parser;
use futures::StreamExt;
use kestrel_agui_client::{
    AgUiAgent, AgUiThread, AgentStreamEvent, HttpAgentTransport, TransportConfig,
};
use kestrel_contract::{Message, ToolRegistry};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tools::{AddNumbersTool, GetStockPriceTool, GetWeatherTool};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = "AGUI_ENDPOINT", default_value = "http://127.0.0.1:38080/agui")]
    endpoint: String,

    #[arg(long, env = "AGUI_API_KEY")]
    api_key: Option<String>,

    /// Where the conversation thread is persisted between invocations.
    #[arg(long, env = "AGUI_THREAD_FILE", default_value = "./thread.json")]
    thread_file: PathBuf,

    #[arg(long, env = "AGUI_MAX_TOOL_ROUNDS", default_value_t = 8)]
    max_tool_rounds: usize,

    /// The user message to send.
    prompt: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let thread = load_thread(&args.thread_file)?;

    let mut config = TransportConfig::new(&args.endpoint);
    if let Some(key) = &args.api_key {
        config = config.with_api_key(key);
    }
    let transport = HttpAgentTransport::new(config)?;

    let tools = ToolRegistry::new()
        .with_tool(Arc::new(GetWeatherTool))
        .with_tool(Arc::new(GetStockPriceTool))
        .with_tool(Arc::new(AddNumbersTool));

    let agent = AgUiAgent::new(transport)
        .with_tools(tools)
        .with_max_tool_rounds(args.max_tool_rounds);

    let mut final_thread = None;
    {
        let mut stream = agent.run_stream(thread, vec![Message::user(&args.prompt)]);
        while let Some(event) = stream.next().await {
            match event {
                AgentStreamEvent::Update(update) => {
                    let text = update.text();
                    if !text.is_empty() {
                        print!("{text}");
                        std::io::stdout().flush().ok();
                    }
                }
                AgentStreamEvent::Completed { thread, response } => {
                    println!();
                    for call in &response.unresolved_calls {
                        warn!(tool = %call.name, call_id = %call.id, "call returned unexecuted");
                    }
                    final_thread = Some(thread);
                }
                AgentStreamEvent::Failed(err) => return Err(err.into()),
            }
        }
    }

    if let Some(thread) = final_thread {
        save_thread(&args.thread_file, &thread)?;
    }
    Ok(())
}

fn load_thread(path: &Path) -> anyhow::Result<AgUiThread> {
    if !path.exists() {
        return Ok(AgUiThread::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading thread file {}", path.display()))?;
    let blob = serde_json::from_str(&raw)
        .with_context(|| format!("parsing thread file {}", path.display()))?;
    Ok(AgUiThread::deserialize(&blob)?)
}

fn save_thread(path: &Path, thread: &AgUiThread) -> anyhow::Result<()> {
    let blob = thread.serialize()?;
    std::fs::write(path, serde_json::to_string_pretty(&blob)?)
        .with_context(|| format!("writing thread file {}", path.display()))?;
    Ok(())
}
