use std::future::Future;

use futures::future::join_all;
use tracing::{debug, error};

use crate::guard::guarded;
use crate::types::{BatchReport, Phase, Settlement, UploadItem};

/// Number of batches `len` items split into with batches of `batch_size`.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    len.div_ceil(batch_size)
}

/// 1-based index of the batch starting at `offset`.
///
/// A `batch_size` of zero is treated as one, matching how [`run_batches`]
/// partitions.
pub fn batch_index(offset: usize, batch_size: usize) -> usize {
    offset / batch_size.max(1) + 1
}

/// Everything one pass of [`run_batches`] settled.
#[derive(Debug, Default)]
pub struct PassOutcome {
    pub batches: usize,
    /// Settlements of every item, in batch order.
    pub settlements: Vec<Settlement>,
}

impl PassOutcome {
    pub fn uploaded(&self) -> usize {
        self.settlements.iter().filter(|s| s.is_uploaded()).count()
    }
}

/// Process `items` in contiguous batches of at most `batch_size`.
///
/// All items of a batch run concurrently and the batch is only complete once
/// every one of them has settled; the next batch starts after that.
/// `on_batch_complete` sees each batch's settlements in item order. An error
/// or panic from it is logged and does not stop the remaining batches.
pub async fn run_batches<'a, F, Fut, R>(
    items: &'a [UploadItem],
    batch_size: usize,
    phase: Phase,
    mut per_item: F,
    mut on_batch_complete: R,
) -> PassOutcome
where
    F: FnMut(&'a UploadItem) -> Fut,
    Fut: Future<Output = Settlement>,
    R: FnMut(&BatchReport) -> anyhow::Result<()>,
{
    let batch_size = batch_size.max(1);
    let mut outcome = PassOutcome::default();

    for (n, chunk) in items.chunks(batch_size).enumerate() {
        let index = batch_index(n * batch_size, batch_size);
        let settlements = join_all(chunk.iter().map(&mut per_item)).await;

        let report = BatchReport {
            index,
            phase,
            settlements,
        };
        debug!(
            batch = index,
            ?phase,
            uploaded = report.uploaded(),
            failed = report.failed(),
            "batch settled"
        );

        if let Err(e) = guarded(|| on_batch_complete(&report)) {
            error!(batch = index, ?phase, error = %e, "batch completion handler failed");
        }

        outcome.batches += 1;
        outcome.settlements.extend(report.settlements);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubmitError;
    use crate::types::{ItemFailure, ItemStatus, ItemSuccess};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn make_items(count: usize) -> Vec<UploadItem> {
        (0..count)
            .map(|i| UploadItem::new(format!("item-{}", i), format!("/data/{}.jpg", i)))
            .collect()
    }

    fn uploaded(item: &UploadItem) -> Settlement {
        Settlement::Uploaded(ItemSuccess {
            id: item.id.clone(),
            item: item.clone(),
            response: serde_json::Value::Null,
            duration_ms: 0,
            completed_at: String::new(),
        })
    }

    fn failed(item: &UploadItem) -> Settlement {
        let mut item = item.clone();
        item.status = ItemStatus::Failed;
        Settlement::Failed(ItemFailure {
            id: item.id.clone(),
            item,
            error: SubmitError::Remote {
                status: 500,
                error: "nope".into(),
            },
            round: 0,
            duration_ms: 0,
            will_retry: false,
        })
    }

    #[test]
    fn test_batch_count() {
        assert_eq!(batch_count(0, 10), 0);
        assert_eq!(batch_count(1, 10), 1);
        assert_eq!(batch_count(10, 10), 1);
        assert_eq!(batch_count(25, 10), 3);
        assert_eq!(batch_count(7, 1), 7);
        assert_eq!(batch_count(7, 0), 0);
    }

    #[test]
    fn test_batch_index() {
        assert_eq!(batch_index(0, 10), 1);
        assert_eq!(batch_index(10, 10), 2);
        assert_eq!(batch_index(20, 10), 3);
        assert_eq!(batch_index(6, 3), 3);
        assert_eq!(batch_index(4, 0), 5);
    }

    #[tokio::test]
    async fn test_partitions_in_order() {
        let items = make_items(25);
        let mut reports = Vec::new();

        let outcome = run_batches(
            &items,
            10,
            Phase::Primary,
            |item| async move { uploaded(item) },
            |report| {
                let ids: Vec<String> = report.settlements.iter().map(|s| s.id().to_string()).collect();
                reports.push((report.index, ids));
                Ok(())
            },
        )
        .await;

        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.uploaded(), 25);
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].0, 1);
        assert_eq!(reports[1].0, 2);
        assert_eq!(reports[2].0, 3);
        assert_eq!(reports[0].1.len(), 10);
        assert_eq!(reports[2].1.len(), 5);
        assert_eq!(reports[1].1[0], "item-10");
        assert_eq!(reports[2].1[4], "item-24");
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let items = make_items(4);

        let outcome = run_batches(
            &items,
            4,
            Phase::Primary,
            |item| async move {
                if item.id == "item-1" {
                    failed(item)
                } else {
                    uploaded(item)
                }
            },
            |_| Ok(()),
        )
        .await;

        assert_eq!(outcome.batches, 1);
        assert_eq!(outcome.settlements.len(), 4);
        assert_eq!(outcome.uploaded(), 3);
        assert!(!outcome.settlements[1].is_uploaded());
    }

    #[tokio::test]
    async fn test_report_error_does_not_stop_next_batch() {
        let items = make_items(6);
        let mut phases = Vec::new();

        let outcome = run_batches(
            &items,
            2,
            Phase::Drain,
            |item| async move { uploaded(item) },
            |report| {
                phases.push(report.phase);
                anyhow::bail!("listener went away")
            },
        )
        .await;

        assert_eq!(phases, vec![Phase::Drain; 3]);
        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.uploaded(), 6);
    }

    #[tokio::test]
    async fn test_report_panic_does_not_stop_next_batch() {
        let items = make_items(4);
        let mut indexes = Vec::new();

        let outcome = run_batches(
            &items,
            2,
            Phase::Primary,
            |item| async move { uploaded(item) },
            |report| {
                indexes.push(report.index);
                if report.index == 1 {
                    panic!("listener bug");
                }
                Ok(())
            },
        )
        .await;

        assert_eq!(indexes, vec![1, 2]);
        assert_eq!(outcome.batches, 2);
        assert_eq!(outcome.uploaded(), 4);
        assert_eq!(outcome.settlements[3].id(), "item-3");
    }

    #[tokio::test]
    async fn test_batch_waits_for_all_before_next() {
        let items = make_items(6);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcome = run_batches(
            &items,
            3,
            Phase::Primary,
            |item| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    uploaded(item)
                }
            },
            |report| {
                // Every item of the batch settled before the report.
                assert_eq!(in_flight.load(Ordering::SeqCst), 0);
                assert_eq!(report.settlements.len(), 3);
                Ok(())
            },
        )
        .await;

        assert_eq!(outcome.batches, 2);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let outcome = run_batches(
            &[],
            10,
            Phase::Primary,
            |item| async move { uploaded(item) },
            |_| panic!("no batches expected"),
        )
        .await;
        assert_eq!(outcome.batches, 0);
        assert!(outcome.settlements.is_empty());
    }
}
