//! CLI command runners: call a [`Services`] operation, print the result.

use anyhow::{Context, Result};
use std::path::Path;

use docsearch_core::search::SearchStatus;

use crate::services::{SearchQuery, Services};

pub async fn run_upload(services: &Services, path: &Path, name: Option<String>) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Cannot derive a document name from {}", path.display()))?,
    };
    let document = services.upload(&name, &bytes).await?;
    println!("uploaded {} ({} bytes)", document, bytes.len());
    Ok(())
}

pub async fn run_parse(services: &Services, name: &str) -> Result<()> {
    let report = services.parse(name).await?;
    println!(
        "parsed {} with {} ({} chars)",
        report.document,
        report.parser,
        report.content.chars().count()
    );
    Ok(())
}

pub async fn run_ingest(services: &Services, name: &str) -> Result<()> {
    let report = services.ingest(name).await?;
    println!("ingest {}", report.document);
    println!("  terms: {}", report.terms);
    println!("  tokens: {}", report.length);
    println!("  passages: {}", report.passages);
    if report.dense_indexed {
        println!("  vectors: {}", report.vector_ids.len());
    } else if let Some(err) = &report.dense_error {
        println!("  vectors: failed ({})", err);
    } else {
        println!("  vectors: dense retrieval disabled");
    }
    Ok(())
}

pub async fn run_list(services: &Services) -> Result<()> {
    let listing = services.list().await?;
    if listing.uploads.is_empty() && listing.parsed.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    let mut names: Vec<String> = listing
        .uploads
        .iter()
        .chain(listing.parsed.iter())
        .map(|d| d.to_string())
        .collect();
    names.sort();
    names.dedup();

    for name in names {
        let flag = |present: bool, label: &'static str| if present { label } else { "-" };
        println!(
            "{:<40} {:<8} {:<6} {}",
            name,
            flag(listing.uploads.iter().any(|d| d.as_str() == name), "uploaded"),
            flag(listing.parsed.iter().any(|d| d.as_str() == name), "parsed"),
            flag(listing.indexed.contains(&name), "indexed"),
        );
    }
    Ok(())
}

pub async fn run_delete(services: &Services, name: &str) -> Result<()> {
    let report = services.delete(name).await?;
    if !(report.upload || report.parsed || report.keyword_record || report.vectors) {
        println!("{}: nothing to delete", report.document);
        return Ok(());
    }
    println!("deleted {}", report.document);
    println!("  upload: {}", report.upload);
    println!("  parsed: {}", report.parsed);
    println!("  keyword record: {}", report.keyword_record);
    println!("  vectors: {}", report.vectors);
    Ok(())
}

pub async fn run_search(services: &Services, query: SearchQuery) -> Result<()> {
    let debug = query.debug;
    let response = services.search(query).await?;
    let outcome = &response.outcome;

    if outcome.status == SearchStatus::Partial {
        eprintln!("Warning: one retrieval signal was unavailable; results are partial.");
    }
    if outcome.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    if let Some(answer) = &response.answer {
        println!("Answer:");
        println!("{}", answer);
        println!();
    }

    for (i, item) in outcome.results.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, item.score, item.document);
        println!(
            "    signals: keyword={:.2} dense={:.2}",
            item.signals.keyword, item.signals.dense
        );
        println!(
            "    excerpt: \"{}\"",
            item.passage.replace('\n', " ").trim()
        );
        if let Some(explain) = &item.explain {
            println!(
                "    raw: keyword={} dense={} alpha={:.2}",
                fmt_raw(explain.keyword_raw),
                fmt_raw(explain.dense_raw),
                explain.alpha
            );
        }
        println!();
    }

    if debug {
        if let Some(diag) = &outcome.diagnostics {
            println!("{}", serde_json::to_string_pretty(diag)?);
        }
    }
    Ok(())
}

fn fmt_raw(score: Option<f64>) -> String {
    score.map(|s| format!("{:.4}", s)).unwrap_or_else(|| "-".to_string())
}

pub async fn run_summarize(services: &Services, name: &str) -> Result<()> {
    println!("{}", services.summarize(name).await?);
    Ok(())
}

pub async fn run_questions(services: &Services, name: &str, count: Option<usize>) -> Result<()> {
    for (i, q) in services.questions(name, count).await?.iter().enumerate() {
        println!("{}. {}", i + 1, q);
    }
    Ok(())
}

pub async fn run_faq(services: &Services, name: &str, count: Option<usize>) -> Result<()> {
    println!("{}", services.faq(name, count).await?);
    Ok(())
}
