// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sequential batch runner.
//
// Items are processed one at a time in insertion order; a failing item is
// marked `Failed` with a human-readable error and the batch moves on.
// Re-running a batch skips items that are already `Done`.

use chrono::{DateTime, Utc};
use mediawerk_core::human_errors::{HumanError, humanize_error};
use mediawerk_core::{BatchItemId, EncodedAsset, TransformJob, TransformResult};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::engine::MediaEngine;

/// Lifecycle of one batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: BatchItemId,
    pub asset: EncodedAsset,
    pub status: ItemStatus,
    pub result: Option<TransformResult>,
    pub error: Option<HumanError>,
    /// Time of the last status change.
    pub updated_at: DateTime<Utc>,
}

impl BatchItem {
    fn new(asset: EncodedAsset) -> Self {
        Self {
            id: BatchItemId::new(),
            asset,
            status: ItemStatus::Pending,
            result: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    fn start(&mut self) {
        self.status = ItemStatus::Processing;
        self.updated_at = Utc::now();
    }

    fn finish(&mut self, outcome: mediawerk_core::error::Result<TransformResult>) {
        match outcome {
            Ok(result) => {
                self.status = ItemStatus::Done;
                self.result = Some(result);
                self.error = None;
            }
            Err(err) => {
                warn!(item = %self.id, name = self.asset.name(), %err, "Batch item failed");
                self.status = ItemStatus::Failed;
                self.result = None;
                self.error = Some(humanize_error(&err));
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Reported to the progress callback after each status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub index: usize,
    pub total: usize,
    pub id: BatchItemId,
    pub status: ItemStatus,
}

/// Counts over a batch. `bytes_saved` covers finished compression items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub pending: usize,
    pub bytes_saved: i64,
}

#[derive(Debug, Clone, Default)]
pub struct Batch {
    items: Vec<BatchItem>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_assets(assets: impl IntoIterator<Item = EncodedAsset>) -> Self {
        Self {
            items: assets.into_iter().map(BatchItem::new).collect(),
        }
    }

    pub fn push(&mut self, asset: EncodedAsset) -> BatchItemId {
        let item = BatchItem::new(asset);
        let id = item.id;
        self.items.push(item);
        id
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn get(&self, id: BatchItemId) -> Option<&BatchItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Apply `job` to every item not yet `Done`, strictly in order.
    #[instrument(skip(self, engine, progress), fields(items = self.items.len()))]
    pub fn run(
        &mut self,
        engine: &MediaEngine,
        job: &TransformJob,
        mut progress: impl FnMut(BatchProgress),
    ) -> BatchSummary {
        let total = self.items.len();
        for (index, item) in self.items.iter_mut().enumerate() {
            if item.status == ItemStatus::Done {
                continue;
            }
            item.start();
            progress(BatchProgress { index, total, id: item.id, status: item.status });

            let outcome = engine.apply(job, &item.asset);
            item.finish(outcome);
            progress(BatchProgress { index, total, id: item.id, status: item.status });
        }

        let summary = self.summary();
        info!(done = summary.done, failed = summary.failed, "Batch finished");
        summary
    }

    /// Same as `run`, with each transform on the blocking pool. Only one
    /// transform is in flight at a time.
    #[instrument(skip(self, engine, progress), fields(items = self.items.len()))]
    pub async fn run_async(
        &mut self,
        engine: &MediaEngine,
        job: TransformJob,
        mut progress: impl FnMut(BatchProgress),
    ) -> BatchSummary {
        let total = self.items.len();
        for (index, item) in self.items.iter_mut().enumerate() {
            if item.status == ItemStatus::Done {
                continue;
            }
            item.start();
            progress(BatchProgress { index, total, id: item.id, status: item.status });

            let worker = engine.clone();
            let asset = item.asset.clone();
            let outcome = tokio::task::spawn_blocking(move || worker.apply(&job, &asset))
                .await
                .unwrap_or_else(|err| {
                    Err(mediawerk_core::MediawerkError::Encode(format!(
                        "transform task aborted: {err}"
                    )))
                });
            item.finish(outcome);
            progress(BatchProgress { index, total, id: item.id, status: item.status });
        }

        let summary = self.summary();
        info!(done = summary.done, failed = summary.failed, "Batch finished");
        summary
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.items.len(),
            ..BatchSummary::default()
        };
        for item in &self.items {
            match item.status {
                ItemStatus::Done => summary.done += 1,
                ItemStatus::Failed => summary.failed += 1,
                ItemStatus::Pending | ItemStatus::Processing => summary.pending += 1,
            }
            if let Some(TransformResult::Compressed(report)) = &item.result {
                summary.bytes_saved += report.bytes_saved();
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use mediawerk_core::{AssetFormat, CompressOptions, CompressionTarget};

    use super::*;
    use crate::test_support::{noisy_buffer, raster_asset};

    fn mixed_batch() -> Batch {
        Batch::from_assets([
            raster_asset(&noisy_buffer(40, 30), AssetFormat::Jpg),
            EncodedAsset::new("broken.png", AssetFormat::Png, b"not a png".to_vec()),
            raster_asset(&noisy_buffer(30, 40), AssetFormat::Png),
        ])
    }

    #[test]
    fn failures_are_isolated() {
        let mut batch = mixed_batch();
        let summary = batch.run(&MediaEngine::default(), &TransformJob::Scrub, |_| {});

        assert_eq!(summary.total, 3);
        assert_eq!(summary.done, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 0);

        let statuses: Vec<ItemStatus> = batch.items().iter().map(|i| i.status).collect();
        assert_eq!(statuses, vec![ItemStatus::Done, ItemStatus::Failed, ItemStatus::Done]);
        let error = batch.items()[1].error.as_ref().unwrap();
        assert!(!error.message.is_empty());
        assert!(batch.items()[1].result.is_none());
        assert!(batch.items()[1].updated_at >= batch.items()[0].updated_at);
    }

    #[test]
    fn progress_is_reported_in_order() {
        let mut batch = mixed_batch();
        let mut events = Vec::new();
        batch.run(&MediaEngine::default(), &TransformJob::Scrub, |p| {
            events.push((p.index, p.status))
        });
        assert_eq!(
            events,
            vec![
                (0, ItemStatus::Processing),
                (0, ItemStatus::Done),
                (1, ItemStatus::Processing),
                (1, ItemStatus::Failed),
                (2, ItemStatus::Processing),
                (2, ItemStatus::Done),
            ]
        );
    }

    #[test]
    fn rerun_only_retries_unfinished_items() {
        let mut batch = mixed_batch();
        let engine = MediaEngine::default();
        batch.run(&engine, &TransformJob::Scrub, |_| {});

        let mut touched = Vec::new();
        batch.run(&engine, &TransformJob::Scrub, |p| touched.push(p.index));
        assert_eq!(touched, vec![1, 1]);
    }

    #[test]
    fn compression_savings_are_summed() {
        let mut batch = Batch::new();
        let id = batch.push(raster_asset(&noisy_buffer(64, 64), AssetFormat::Jpg));
        let job = TransformJob::Compress(CompressOptions {
            target: CompressionTarget::Percentage(50),
            ..CompressOptions::default()
        });
        let summary = batch.run(&MediaEngine::default(), &job, |_| {});

        let Some(TransformResult::Compressed(report)) = &batch.get(id).unwrap().result else {
            panic!("expected a compression report");
        };
        assert_eq!(summary.bytes_saved, report.bytes_saved());
    }

    #[test]
    fn summary_of_fresh_batch_is_all_pending() {
        let batch = mixed_batch();
        let summary = batch.summary();
        assert_eq!(summary.pending, 3);
        assert_eq!(summary.bytes_saved, 0);
        assert_eq!(
            serde_json::to_value(summary).unwrap()["pending"],
            serde_json::json!(3)
        );
    }

    #[tokio::test]
    async fn async_run_matches_sync_run() {
        let mut batch = mixed_batch();
        let mut events = 0;
        let summary = batch
            .run_async(&MediaEngine::default(), TransformJob::Scrub, |_| events += 1)
            .await;
        assert_eq!(summary.done, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(events, 6);
        assert_eq!(batch.items()[2].asset.format(), AssetFormat::Png);
    }
}
