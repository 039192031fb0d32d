//! The `prof-buzz` command: serves the chat endpoint, or chats with it from
//! the terminal.

#[macro_use]
extern crate tracing;

use std::error::Error;
use std::io::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use prof_buzz::core::ChatRelayBuilder;
use prof_buzz::core::chat::ChatState;
use prof_buzz::{ChatClientBuilder, server};
use prof_buzz_openai::{OpenAIConfigBuilder, OpenAIProvider};
use prof_buzz_pinecone::{PineconeConfigBuilder, PineconeIndex};
use tokio::io::{self, AsyncBufReadExt};
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

type BoxError = Box<dyn Error>;

const BAR_CHAR: &str = "▎";

/// Prof Buzz, a professor recommendation assistant.
#[derive(Parser)]
#[command(name = "prof-buzz", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the chat endpoint
    Serve(ServeArgs),
    /// Chat with a running server from the terminal
    Chat(ChatArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "PROF_BUZZ_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
    /// API key of the OpenAI-compatible service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,
    /// Base URL of the OpenAI-compatible service
    #[arg(long, env = "OPENAI_BASE_URL")]
    openai_base_url: Option<String>,
    /// Chat completion model
    #[arg(long, env = "OPENAI_MODEL")]
    chat_model: Option<String>,
    /// Embedding model, must match the one used to fill the index
    #[arg(long, env = "OPENAI_EMBEDDING_MODEL")]
    embedding_model: Option<String>,
    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pinecone_api_key: String,
    /// Name of the index holding the reviews
    #[arg(long, env = "PINECONE_INDEX")]
    pinecone_index: Option<String>,
    /// Data-plane host of the index, looked up by name if not set
    #[arg(long, env = "PINECONE_INDEX_HOST")]
    pinecone_host: Option<String>,
    /// Index namespace, empty for the default namespace
    #[arg(long, env = "PINECONE_NAMESPACE", default_value = "ns1")]
    namespace: String,
    /// Number of reviews retrieved per question
    #[arg(
        long,
        env = "PROF_BUZZ_TOP_K",
        default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    top_k: u32,
    /// File to read the system prompt from, instead of the built-in one
    #[arg(long, env = "PROF_BUZZ_SYSTEM_PROMPT")]
    system_prompt_file: Option<PathBuf>,
}

#[derive(Args)]
struct ChatArgs {
    /// URL of the chat endpoint
    #[arg(
        long,
        env = "PROF_BUZZ_ENDPOINT",
        default_value = "http://127.0.0.1:3000/api/chat"
    )]
    endpoint: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Chat(args) => chat(args).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.to_string().bright_red());
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServeArgs) -> Result<(), BoxError> {
    let system_prompt = args
        .system_prompt_file
        .as_ref()
        .map(std::fs::read_to_string)
        .transpose()?;

    let mut openai = OpenAIConfigBuilder::with_api_key(args.openai_api_key);
    if let Some(base_url) = args.openai_base_url {
        openai = openai.with_base_url(base_url);
    }
    if let Some(model) = args.chat_model {
        openai = openai.with_chat_model(model);
    }
    if let Some(model) = args.embedding_model {
        openai = openai.with_embedding_model(model);
    }
    let openai = OpenAIProvider::new(openai.build());

    let mut pinecone = PineconeConfigBuilder::with_api_key(args.pinecone_api_key);
    if let Some(name) = args.pinecone_index {
        pinecone = pinecone.with_index_name(name);
    }
    if let Some(host) = args.pinecone_host {
        pinecone = pinecone.with_host(host);
    }
    let pinecone = PineconeIndex::new(pinecone.build());

    let namespace = Some(args.namespace).filter(|ns| !ns.is_empty());
    let mut relay =
        ChatRelayBuilder::with_providers(openai.clone(), pinecone, openai)
            .with_top_k(args.top_k)
            .with_namespace(namespace);
    if let Some(prompt) = system_prompt {
        relay = relay.with_system_prompt(prompt);
    }

    let listener = TcpListener::bind(args.bind).await?;
    server::serve(listener, relay.build(), shutdown_signal()).await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn chat(args: ChatArgs) -> Result<(), BoxError> {
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let client = ChatClientBuilder::with_endpoint(args.endpoint)
        .on_update(move |state: &ChatState| {
            update_tx.send(state.clone()).ok();
        })
        .build();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")?
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    if let Some(greeting) = client.state().last() {
        println!(
            "{}🤖 {}",
            BAR_CHAR.bright_cyan(),
            greeting.content.bright_white()
        );
    }

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim().to_owned();
        if line.is_empty() {
            continue;
        }

        let mut send = tokio::spawn({
            let client = client.clone();
            async move { client.send_message(&line).await }
        });

        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message("🤔 Thinking...");
        let mut answer = AnswerPrinter {
            printed: 0,
            progress_bar: Some(progress_bar),
        };

        let result = loop {
            answer.tick();
            select! {
                state = update_rx.recv() => {
                    if let Some(state) = state {
                        answer.show(&state);
                    }
                }
                result = &mut send => break result,
                _ = sleep(Duration::from_millis(100)) => {}
            }
        };
        // Updates sent right before the task ended may still be queued.
        while let Ok(state) = update_rx.try_recv() {
            answer.show(&state);
        }
        answer.finish();

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                println!("{}⚠️  {}", BAR_CHAR.bright_red(), err.to_string().red());
            }
            Err(err) => error!("chat task failed: {err}"),
        }
    }
    Ok(())
}

/// Prints the growing answer of one turn.
struct AnswerPrinter {
    printed: usize,
    progress_bar: Option<ProgressBar>,
}

impl AnswerPrinter {
    fn tick(&self) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.inc(1);
        }
    }

    fn show(&mut self, state: &ChatState) {
        let Some(answer) = state.last() else {
            return;
        };
        let Some(delta) = answer.content.get(self.printed..) else {
            return;
        };
        if delta.is_empty() {
            return;
        }
        // Finish the progress bar before printing anything else.
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
            print!("{}🤖 ", BAR_CHAR.bright_cyan());
        }
        print!("{}", delta.bright_white());
        std::io::stdout().flush().ok();
        self.printed = answer.content.len();
    }

    fn finish(mut self) {
        match self.progress_bar.take() {
            Some(progress_bar) => progress_bar.finish_and_clear(),
            None => println!(),
        }
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
