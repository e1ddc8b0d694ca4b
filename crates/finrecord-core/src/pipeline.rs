//! Document-by-document driver: extract, prompt, generate, parse, collect.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, PdfBackend};
use crate::caller::call_model;
use crate::generator::TextGenerator;
use crate::parser::interpret_response;
use crate::prompt::{build_prompt, truncate_chars};
use crate::table::ResultTable;
use crate::{
    Config, CoreError, DocumentRef, FinancialRecord, ProgressEvent, ResultCollection, export,
    validate_documents,
};

pub const EXTRACTION_FAILED_PREFIX: &str = "Text extraction failed";
pub const MODEL_FAILED_PREFIX: &str = "Model invocation failed";
pub const CANCELLED_ERROR: &str = "Processing cancelled";

/// Extract a document's text on the blocking pool.
pub async fn extract_document_text(
    backend: Arc<dyn PdfBackend>,
    path: &Path,
) -> Result<String, BackendError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || backend.extract_text(&path))
        .await
        .unwrap_or_else(|e| Err(BackendError::ExtractionError(format!("task join error: {}", e))))
}

/// Run one document through the pipeline.
///
/// Never fails: every error becomes a fallback record so the caller can move
/// on to the next document.
#[allow(clippy::too_many_arguments)]
pub async fn process_document(
    index: usize,
    total: usize,
    doc: &DocumentRef,
    backend: Arc<dyn PdfBackend>,
    generator: &dyn TextGenerator,
    config: &Config,
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
    cancel: &CancellationToken,
) -> FinancialRecord {
    progress(ProgressEvent::Extracting {
        index,
        total,
        label: doc.label.clone(),
    });

    let text = match extract_document_text(backend, &doc.path).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(label = %doc.label, path = %doc.path.display(), error = %e, "text extraction failed");
            return FinancialRecord::fallback(format!("{}: {}", EXTRACTION_FAILED_PREFIX, e), "");
        }
    };

    let chars = text.chars().count();
    tracing::debug!(label = %doc.label, chars, "extracted text");
    progress(ProgressEvent::Extracted {
        index,
        total,
        label: doc.label.clone(),
        chars,
    });

    let text = match config.max_input_chars {
        Some(limit) => {
            let (kept, truncated) = truncate_chars(&text, limit);
            if truncated {
                tracing::warn!(label = %doc.label, original = chars, kept = limit, "document text truncated");
                progress(ProgressEvent::Truncated {
                    index,
                    label: doc.label.clone(),
                    original_chars: chars,
                    kept_chars: limit,
                });
            }
            kept
        }
        None => text.as_str(),
    };

    let prompt = build_prompt(text);

    progress(ProgressEvent::Generating {
        index,
        total,
        label: doc.label.clone(),
    });

    let caller_config = config.caller_config();
    let on_retry = |attempt: u32, err: &crate::GenerationError| {
        progress(ProgressEvent::Retrying {
            index,
            label: doc.label.clone(),
            attempt,
            error: err.to_string(),
        });
    };

    let generated = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return FinancialRecord::fallback(CANCELLED_ERROR, "");
        }
        result = call_model(generator, &prompt, &caller_config, on_retry) => result,
    };

    match generated {
        Ok(raw) => interpret_response(&raw, config.schema_mode),
        Err(e) => FinancialRecord::fallback(format!("{}: {}", MODEL_FAILED_PREFIX, e), ""),
    }
}

/// Process every document in order and collect one record per label.
pub async fn process_documents(
    documents: &[DocumentRef],
    backend: Arc<dyn PdfBackend>,
    generator: &dyn TextGenerator,
    config: &Config,
    progress: impl Fn(ProgressEvent) + Send + Sync,
    cancel: &CancellationToken,
) -> ResultCollection {
    let total = documents.len();
    let mut results = ResultCollection::new();

    for (index, doc) in documents.iter().enumerate() {
        let record = if cancel.is_cancelled() {
            FinancialRecord::fallback(CANCELLED_ERROR, "")
        } else {
            process_document(
                index,
                total,
                doc,
                Arc::clone(&backend),
                generator,
                config,
                &progress,
                cancel,
            )
            .await
        };

        progress(ProgressEvent::Completed {
            index,
            total,
            label: doc.label.clone(),
            error: record.error().map(str::to_string),
        });
        results.insert(doc.label.clone(), record);
    }

    tracing::info!(
        documents = total,
        failed = results.fallback_count(),
        "processing complete"
    );
    results
}

/// Full run: process all documents, write the output file, build the preview.
///
/// A cancelled run does not write, so an existing output file is left intact.
pub async fn run_pipeline(
    documents: &[DocumentRef],
    backend: Arc<dyn PdfBackend>,
    generator: &dyn TextGenerator,
    config: &Config,
    progress: impl Fn(ProgressEvent) + Send + Sync,
    cancel: &CancellationToken,
) -> Result<(ResultCollection, ResultTable), CoreError> {
    validate_documents(documents)?;
    let results = process_documents(documents, backend, generator, config, progress, cancel).await;
    if cancel.is_cancelled() {
        tracing::warn!(
            path = %config.output_path.display(),
            "run cancelled, output file not written"
        );
    } else {
        export::write_results(&config.output_path, &results)?;
    }
    let table = ResultTable::from_collection(&results);
    Ok((results, table))
}
