use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docsift::{
    config,
    documents::{DocumentApi, DocumentService},
    logging,
    qa::QaResponse,
    repository::DocumentMetadata,
};
use serde::Serialize;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "docsift-cli",
    about = "Run PDFs through the Docsift pipeline from the command line"
)]
struct Cli {
    /// Log pipeline progress to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process PDF files (directories are searched recursively) and optionally ask questions.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Question to ask every processed document. Repeatable.
        #[arg(long = "ask")]
        questions: Vec<String>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestReport {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<DocumentMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    answers: Vec<AnswerReport>,
}

#[derive(Serialize)]
struct AnswerReport {
    question: String,
    #[serde(flatten)]
    response: QaResponse,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_cli_tracing(cli.verbose);
    let config = config::init_config().context("Failed to load configuration")?;

    match cli.command {
        Command::Ingest { paths, questions } => {
            let files = collect_pdfs(&paths)?;
            if files.is_empty() {
                bail!("No PDF files found");
            }
            let service =
                DocumentService::from_config(config).context("Failed to start document service")?;

            let mut failures = 0usize;
            for file in files {
                let report = ingest_one(&service, &file, &questions).await;
                if report.error.is_some() {
                    failures += 1;
                }
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            if failures > 0 {
                bail!("{failures} document(s) failed");
            }
        }
    }
    Ok(())
}

async fn ingest_one(service: &DocumentService, file: &Path, questions: &[String]) -> IngestReport {
    let path = file.display().to_string();
    let document = match service.ingest_path(file).await {
        Ok(document) => document,
        Err(error) => {
            return IngestReport {
                path,
                document: None,
                error: Some(error.to_string()),
                answers: Vec::new(),
            };
        }
    };

    let mut answers = Vec::with_capacity(questions.len());
    let mut error = None;
    for question in questions {
        match service.ask(&document.doc_id, question).await {
            Ok(response) => answers.push(AnswerReport {
                question: question.clone(),
                response,
            }),
            Err(err) => {
                error = Some(format!("question {question:?} failed: {err}"));
                break;
            }
        }
    }

    IngestReport {
        path,
        document: Some(document),
        error,
        answers,
    }
}

fn collect_pdfs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            bail!("{} does not exist", path.display());
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            if entry.file_type().is_file() && is_pdf(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
