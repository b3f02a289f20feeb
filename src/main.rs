use anyhow::{anyhow, Context, Result};
use bat::PrettyPrinter;
use clap::Parser;
use cliclack::spinner;
use console::style;
use serde_json::Value;
use std::env;
use std::panic;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use tooldispatch::capabilities::salary_info;
use tooldispatch::dispatch::{DispatchLoop, Reply};
use tooldispatch::errors::RunFailure;
use tooldispatch::providers::configs::openai::{DEFAULT_HOST, DEFAULT_MODEL, DEFAULT_TIMEOUT};
use tooldispatch::providers::configs::OpenAiProviderConfig;
use tooldispatch::providers::openai::OpenAiProvider;
use tooldispatch::registry::ToolRegistry;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// API key (can also be set via OPENROUTER_API_KEY or OPENAI_API_KEY)
    #[arg(short, long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the OpenAI-compatible service
    #[arg(long, env = "OPENROUTER_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Model to use
    #[arg(short, long, env = "OPENROUTER_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature; the service default is used when unset
    #[arg(long, env = "OPENROUTER_TEMPERATURE")]
    temperature: Option<f32>,

    /// Request timeout in seconds
    #[arg(long, env = "OPENROUTER_TIMEOUT", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,

    /// Question to ask
    #[arg(short, long, default_value = "Can you check how much Alice earns?")]
    question: String,

    /// Optional system prompt
    #[arg(short, long, default_value = "")]
    system: String,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    // Handler panics are recovered by the registry; report them through tracing
    // so they don't print over the spinner.
    panic::set_hook(Box::new(|info| tracing::error!("{}", info)));

    let cli = Cli::parse();

    let api_key = cli
        .api_key
        .or_else(|| env::var("OPENAI_API_KEY").ok())
        .context("API key must be provided via --api-key, OPENROUTER_API_KEY or OPENAI_API_KEY")?;

    let mut config = OpenAiProviderConfig::new(api_key, cli.host, cli.model)
        .with_timeout(Duration::from_secs(cli.timeout));
    if let Some(temperature) = cli.temperature {
        config = config.with_temperature(temperature);
    }
    let provider = OpenAiProvider::new(config)?;

    let mut registry = ToolRegistry::new();
    registry.register(salary_info())?;

    println!("{} {}", style("User Question:").bold(), cli.question);

    let spin = spinner();
    spin.start(format!("awaiting reply from {}", provider.model()));
    let result = DispatchLoop::new(&provider, &registry)
        .with_system_prompt(cli.system)
        .run(&cli.question);
    spin.stop("");

    match result {
        Ok(reply) => print_reply(&reply),
        Err(failure) => {
            print_failure(&failure);
            Err(failure.error.into())
        }
    }
}

fn print_reply(reply: &Reply) -> Result<()> {
    let exchanges = reply.tool_exchanges();
    if exchanges.is_empty() {
        println!("\n{}", style("Model didn't call any tools.").dim());
    } else {
        println!("\n{}", style("Model requested tool call(s):").bold());
        for (request, result) in exchanges {
            let arguments = serde_json::from_str::<Value>(&request.arguments)
                .map(|v| v.to_string())
                .unwrap_or(request.arguments);
            println!("  Function: {}", style(&request.name).cyan());
            println!("  Args: {}", arguments);
            if result.is_error {
                println!("  Output: {}", style(&result.output).red());
            } else {
                println!("  Output: {}", result.output);
            }
        }
    }

    println!("\n{}", style("Final Answer:").bold());
    render(&reply.answer)?;
    println!();
    Ok(())
}

fn print_failure(failure: &RunFailure) {
    eprintln!(
        "\n{} during {}: {}",
        style("Run failed").red().bold(),
        failure.error.stage(),
        failure.error.kind()
    );
    eprintln!("{}", style("Transcript so far:").dim());
    for message in &failure.transcript {
        eprintln!("{}\n", message.summary());
    }
}

fn render(content: &str) -> Result<()> {
    PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .language("markdown")
        .print()
        .map_err(|e| anyhow!("failed to render answer: {}", e))?;
    Ok(())
}
