//! Timesheet document generation and storage.

use std::time::Duration;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::EngineResult;
use crate::models::document::{NewTimesheetDocument, TimesheetDocument};
use crate::schema::{timesheet_documents, timesheets};

/// Output of the document renderer.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Renders a completed timesheet to PDF/Excel.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render_timesheet_document(&self, timesheet_id: i64)
        -> anyhow::Result<RenderedDocument>;
}

/// Calls the document generation service over HTTP.
pub struct HttpDocumentRenderer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDocumentRenderer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DocumentRenderer for HttpDocumentRenderer {
    async fn render_timesheet_document(
        &self,
        timesheet_id: i64,
    ) -> anyhow::Result<RenderedDocument> {
        let url = format!("{}/timesheets/{timesheet_id}/render", self.base_url);
        let resp = self.client.post(&url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("document service returned {}", resp.status());
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/pdf")
            .to_string();
        let bytes = resp.bytes().await?.to_vec();

        Ok(RenderedDocument {
            content_type,
            bytes,
        })
    }
}

/// Store a rendered document and point the timesheet at it.
pub async fn store_document(
    conn: &mut AsyncPgConnection,
    timesheet_id: i64,
    doc: RenderedDocument,
) -> EngineResult<TimesheetDocument> {
    let new_doc = NewTimesheetDocument {
        timesheet_id,
        content_type: doc.content_type,
        size_bytes: doc.bytes.len() as i64,
        content: doc.bytes,
    };

    let stored = diesel::insert_into(timesheet_documents::table)
        .values(&new_doc)
        .returning(TimesheetDocument::as_returning())
        .get_result(conn)
        .await?;

    diesel::update(timesheets::table.find(timesheet_id))
        .set(timesheets::document_id.eq(stored.id))
        .execute(conn)
        .await?;

    Ok(stored)
}

/// Retire every generated document of a timesheet. Returns how many.
pub async fn deactivate_documents(
    conn: &mut AsyncPgConnection,
    timesheet_id: i64,
) -> EngineResult<usize> {
    let count = diesel::update(
        timesheet_documents::table
            .filter(timesheet_documents::timesheet_id.eq(timesheet_id))
            .filter(timesheet_documents::active.eq(true)),
    )
    .set(timesheet_documents::active.eq(false))
    .execute(conn)
    .await?;
    Ok(count)
}

/// Latest active document for a timesheet.
pub async fn latest_document(
    conn: &mut AsyncPgConnection,
    timesheet_id: i64,
) -> EngineResult<Option<TimesheetDocument>> {
    let doc = timesheet_documents::table
        .filter(timesheet_documents::timesheet_id.eq(timesheet_id))
        .filter(timesheet_documents::active.eq(true))
        .order(timesheet_documents::id.desc())
        .select(TimesheetDocument::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(doc)
}

/// Render and store, logging instead of failing. Returns the document id.
pub async fn generate_best_effort(
    conn: &mut AsyncPgConnection,
    renderer: Option<&dyn DocumentRenderer>,
    timesheet_id: i64,
) -> Option<i64> {
    let Some(renderer) = renderer else {
        tracing::debug!(timesheet_id, "No document renderer configured, skipping");
        return None;
    };

    let rendered = match renderer.render_timesheet_document(timesheet_id).await {
        Ok(doc) => doc,
        Err(e) => {
            crate::metrics::delivery_failed("document");
            tracing::warn!(timesheet_id, "Timesheet document rendering failed: {e}");
            return None;
        }
    };

    match store_document(conn, timesheet_id, rendered).await {
        Ok(doc) => {
            tracing::info!(
                timesheet_id,
                document_id = doc.id,
                size_bytes = doc.size_bytes,
                "Timesheet document generated"
            );
            Some(doc.id)
        }
        Err(e) => {
            crate::metrics::delivery_failed("document");
            tracing::warn!(timesheet_id, "Storing timesheet document failed: {e}");
            None
        }
    }
}
