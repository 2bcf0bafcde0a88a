//! Posts each sample question to a running API and checks required citations.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;

use graphrag_common::AskResponse;

#[derive(Parser)]
#[command(about = "Check /ask answers against expected citations")]
struct Args {
    /// Base URL of a running graphrag-api.
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    api: String,

    /// JSON list of `{q, must_include}` objects.
    #[arg(long, default_value = "tests/sample_questions.json")]
    questions: PathBuf,
}

#[derive(Deserialize)]
struct Case {
    q: String,
    #[serde(default)]
    must_include: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let raw = std::fs::read_to_string(&args.questions)
        .with_context(|| format!("reading {}", args.questions.display()))?;
    let cases: Vec<Case> = serde_json::from_str(&raw).context("parsing questions file")?;

    let client = reqwest::Client::new();
    let url = format!("{}/ask", args.api.trim_end_matches('/'));
    let mut passed = 0;

    for case in &cases {
        let response: AskResponse = client
            .post(&url)
            .json(&json!({ "question": case.q }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let missing: Vec<&String> = case
            .must_include
            .iter()
            .filter(|c| !response.citations.contains(c))
            .collect();

        println!("Q: {}", case.q);
        if missing.is_empty() {
            println!("  miss: OK");
            passed += 1;
        } else {
            println!("  miss: {missing:?}");
        }
    }

    println!("\n{passed}/{} passed", cases.len());
    Ok(if passed == cases.len() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
