use std::sync::Arc;

use anyhow::Context;

use mail_triage::config::{AppConfig, EXAMPLE_ENV};
use mail_triage::llm::RigAssistant;
use mail_triage::logging;
use mail_triage::mail::{ImapSmtpGateway, MailGateway};
use mail_triage::sandbox::CodeSandbox;
use mail_triage::workflow::{self, BatchDriver, Engine};

const DIAGRAM_FILE: &str = "workflow_diagram.mmd";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage. A second install
    // (already set by a dependency) is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(errors) => {
            eprintln!("Error: configuration is incomplete");
            for e in &errors {
                eprintln!("  - {e}");
            }
            eprintln!("\nExample environment:\n{EXAMPLE_ENV}");
            std::process::exit(1);
        }
    };

    let (_guard, log_file) = logging::init(&config.log_dir)
        .with_context(|| format!("Failed to set up logging in {}", config.log_dir.display()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_file.display(),
        "Mail agent starting"
    );

    let diagram_path = config.log_dir.join(DIAGRAM_FILE);
    match std::fs::write(&diagram_path, workflow::mermaid()) {
        Ok(()) => tracing::info!(path = %diagram_path.display(), "Workflow diagram written"),
        Err(e) => tracing::error!(path = %diagram_path.display(), error = %e, "Failed to write workflow diagram"),
    }

    let assistant = Arc::new(RigAssistant::new(&config.llm).context("Failed to create LLM client")?);

    let gateway: Arc<dyn MailGateway> = Arc::new(ImapSmtpGateway::new(config.mail.clone()));
    let sandbox = Arc::new(CodeSandbox::new(config.sandbox.clone()));

    let engine = Engine::new(assistant.clone(), assistant, sandbox, Arc::clone(&gateway));
    let driver = BatchDriver::new(engine, gateway, config.batch.clone());

    let report = driver.run().await.context("Mailbox unavailable, nothing processed")?;

    tracing::info!(
        fetched = report.fetched,
        completed = report.completed.len(),
        failed = report.failed.len(),
        "Mail agent finished"
    );
    Ok(())
}
