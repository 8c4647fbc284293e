//! Interactive transport: the terminal variant of the stream adapter.
//!
//! One stdin line = one user turn. Text deltas go to stdout unframed;
//! tool activity is echoed through tracing. On `Done` the assembled
//! message folds into the conversation; on failure history is untouched
//! so the same prompt can be retried.

use std::io::Write as _;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::agent::{run_turn, Conversation, Fragment};
use crate::config::GatewayConfig;
use crate::inference::types::{ChatMessage, Role};
use crate::inference::InferenceClient;
use crate::provider::{FunctionRegistry, ProviderSession, ToolSession};

/// Run the REPL until EOF or an empty line.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let model = Arc::new(InferenceClient::new(config.model_settings())?);

    // Short probe session just to show the caller what's callable.
    let probe = ProviderSession::open(&config.provider).await?;
    println!("Available tools:");
    for tool in probe.descriptors() {
        println!("  {}: {}", tool.name, tool.description);
    }
    println!();
    Box::new(probe).close().await?;

    let mut conversation = match &config.system_prompt {
        Some(prompt) => {
            Conversation::from_messages(vec![ChatMessage::text(Role::System, prompt)])
        }
        None => Conversation::new(),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("Prompt: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let message = line.trim().to_string();
        if message.is_empty() || message == "exit" {
            break;
        }

        let session = match ProviderSession::open(&config.provider).await {
            Ok(session) => session,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        let registry = match FunctionRegistry::register(Box::new(session)) {
            Ok(registry) => registry,
            Err(failure) => {
                let _ = failure.session.close().await;
                eprintln!("error: {}", failure.error);
                continue;
            }
        };

        let mut transcript = conversation.to_transcript();
        transcript.push(ChatMessage::text(Role::User, &message));

        let mut fragments = run_turn(
            model.clone(),
            registry,
            transcript,
            config.turn_limits(),
        );

        while let Some(fragment) = fragments.next().await {
            match fragment {
                Fragment::Text { delta } => {
                    print!("{delta}");
                    std::io::stdout().flush()?;
                }
                Fragment::ToolCallRequested {
                    tool, arguments, ..
                } => {
                    tracing::info!(%tool, %arguments, "invoking tool");
                }
                Fragment::ToolResult {
                    is_error, output, ..
                } => {
                    tracing::info!(is_error, chars = output.len(), "tool result");
                }
                Fragment::Done { message: assembled } => {
                    println!();
                    conversation.push_user(&message);
                    conversation.push_assistant(&assembled);
                }
                Fragment::Error { kind, message } => {
                    println!();
                    eprintln!("[{kind}] {message}");
                }
            }
        }
        println!();
    }

    Ok(())
}
