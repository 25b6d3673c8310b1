//! Answerline CLI: answers from a local model, with web search for questions.
//!
//! A thin front end over the answer pipeline: one-shot questions, an
//! interactive chat, search previews, and model listing.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
