//! Subcommand implementations for the docdesk binary

use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use docdesk_common::events::DocdeskEvent;
use docdesk_common::{Document, DocumentId};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use docdesk_admin::{
    CollectionSnapshot, ConfirmationPort, ConfirmationRequest, DocumentCollectionView,
    RemovalOutcome,
};

use crate::Command;

/// Asks on the terminal; anything but y/yes declines
pub struct StdinConfirmation;

#[async_trait]
impl ConfirmationPort for StdinConfirmation {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        let prompt = request.prompt();
        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut stdout = std::io::stdout();
            write!(stdout, "{} [y/N] ", prompt)?;
            stdout.flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

pub async fn run(command: Command, view: &DocumentCollectionView) -> Result<()> {
    match command {
        Command::List { watch } => {
            let snapshot = view.load().await?;
            print_documents(&snapshot);
            if watch && view.live_polls() > 0 {
                watch_until_settled(view, None).await;
                println!();
                print_documents(&view.snapshot());
            }
        }

        Command::Companies => {
            let companies = view.companies().await?;
            if companies.is_empty() {
                println!("No companies");
            }
            for company in companies {
                println!("{:>6}  {}", company.id, company.name);
            }
        }

        Command::Show { id } => {
            view.load().await?;
            let document = match view.document(id) {
                Some(document) => document,
                None => view.get_document(id).await?,
            };
            print_document(&document);
            match view.analysis_summary(id) {
                Some(summary) => println!("\n{}", summary),
                None => println!("\nNo analysis"),
            }
        }

        Command::Analyze { id, force, wait } => {
            view.load().await?;
            let record = view.request_analysis(id, force).await?;
            println!("Analysis of document {} is {}", id, record.status);

            if wait && view.is_polling(id) {
                watch_until_settled(view, Some(id)).await;
            }
            if wait {
                if let Some(summary) = view.analysis_summary(id) {
                    println!("\n{}", summary);
                }
            }
        }

        Command::RemoveAnalysis { id, .. } => {
            view.load().await?;
            match view.remove_analysis(id).await? {
                RemovalOutcome::Removed { .. } => println!("Analysis of document {} removed", id),
                RemovalOutcome::RemovedLocally { error, .. } => {
                    println!("Analysis of document {} removed locally", id);
                    eprintln!("Server refused the removal: {}", error);
                }
                RemovalOutcome::RolledBack { error, .. } => {
                    bail!("Server refused to remove the analysis: {}", error)
                }
                RemovalOutcome::Declined => println!("Cancelled"),
                RemovalOutcome::NothingToRemove => println!("Document {} has no analysis", id),
            }
        }

        Command::Delete { id, .. } => {
            view.load().await?;
            if view.delete_document(id).await? {
                println!("Document {} deleted", id);
            } else {
                println!("Cancelled");
            }
        }
    }
    Ok(())
}

/// Print notifications until polling settles (one document, or all) or Ctrl+C
async fn watch_until_settled(view: &DocumentCollectionView, only: Option<DocumentId>) {
    let mut events = view.subscribe();
    let still_polling = |view: &DocumentCollectionView| match only {
        Some(id) => view.is_polling(id),
        None => view.live_polls() > 0,
    };

    while still_polling(view) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    if only.map_or(true, |id| event.document_id() == Some(id)) {
                        print_event(&event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Missed notifications"),
                Err(RecvError::Closed) => break,
            },
            // handles retire just after their last notification
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
    }
}

fn print_event(event: &DocdeskEvent) {
    if event.is_error() {
        eprintln!("! {}", event.message());
    } else {
        println!("* {}", event.message());
    }
}

fn print_documents(snapshot: &CollectionSnapshot) {
    if snapshot.documents.is_empty() {
        println!("No documents");
        return;
    }

    println!("{:>6}  {:<40}  {:<12}  ANALYSIS", "ID", "NAME", "SIGNATURE");
    for (document, status) in snapshot.rows() {
        let id = document
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>6}  {:<40}  {:<12}  {}",
            id,
            truncate(&document.name, 40),
            document.status.as_deref().unwrap_or("-"),
            status
        );
    }
}

fn print_document(document: &Document) {
    let id = document
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("Document {}: {}", id, document.name);
    println!("  Company:  {}", document.company);
    println!("  Status:   {}", document.status.as_deref().unwrap_or("-"));
    println!("  PDF:      {}", document.pdf_url);
    if let Some(created_at) = &document.created_at {
        println!("  Created:  {}", created_at);
    }
    if let Some(deadline) = &document.date_limit_to_sign {
        println!("  Sign by:  {}", deadline);
    }
    for signer in &document.signers {
        println!(
            "  Signer:   {} <{}> {}",
            signer.name,
            signer.email,
            signer.status.as_deref().unwrap_or("")
        );
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
