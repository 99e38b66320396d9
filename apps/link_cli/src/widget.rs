//! Terminal stand-in for the external linking widget.

use std::sync::Arc;

use async_trait::async_trait;
use client_core::{LinkWidget, WidgetError, WidgetMetadata, WidgetOutcome};
use shared::domain::LinkToken;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin},
    sync::Mutex,
};

/// Line-oriented stdin shared by the command loop and the widget prompt.
#[derive(Clone)]
pub struct Console {
    lines: Arc<Mutex<Lines<BufReader<Stdin>>>>,
}

impl Console {
    pub fn stdin() -> Self {
        Self {
            lines: Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines())),
        }
    }

    /// Prints `label` and reads one line. `None` on end of input.
    pub async fn prompt(&self, label: &str) -> std::io::Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(label.as_bytes()).await?;
        stdout.flush().await?;
        let line = self.lines.lock().await.next_line().await?;
        Ok(line.map(|line| line.trim().to_string()))
    }
}

/// Asks for the public token the widget would have produced.
///
/// A blank answer cancels; `error: <message>` simulates the widget failing.
pub struct PromptWidget {
    console: Console,
}

impl PromptWidget {
    pub fn new(console: Console) -> Self {
        Self { console }
    }
}

#[async_trait]
impl LinkWidget for PromptWidget {
    async fn present(&self, token: &LinkToken) -> WidgetOutcome {
        println!("link widget opened with token {}", token.preview());
        let answer = match self
            .console
            .prompt("public token (blank to cancel): ")
            .await
        {
            Ok(answer) => answer.unwrap_or_default(),
            Err(err) => {
                return WidgetOutcome::Exit {
                    error: Some(WidgetError::new(err.to_string())),
                }
            }
        };
        if answer.is_empty() || answer.starts_with("error:") {
            return outcome_from_answers(&answer, "");
        }
        let institution = self
            .console
            .prompt("institution name (optional): ")
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        outcome_from_answers(&answer, &institution)
    }
}

/// Maps the two prompt answers onto the single widget outcome.
pub fn outcome_from_answers(public_token: &str, institution: &str) -> WidgetOutcome {
    let public_token = public_token.trim();
    if public_token.is_empty() {
        return WidgetOutcome::Exit { error: None };
    }
    if let Some(message) = public_token.strip_prefix("error:") {
        return WidgetOutcome::Exit {
            error: Some(WidgetError::new(message.trim())),
        };
    }
    let institution = institution.trim();
    let metadata = if institution.is_empty() {
        WidgetMetadata::default()
    } else {
        WidgetMetadata::with_institution_name(institution)
    };
    WidgetOutcome::Success {
        public_token: public_token.to_string(),
        metadata,
    }
}
