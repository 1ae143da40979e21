//! Chunked bulk writes with per-item outcome reporting.
//!
//! [`run_batches`] splits an input collection into fixed-size chunks, sends
//! them one after another and folds the per-item results of every chunk into a
//! single [`BatchResult`]. A chunk that fails as a whole marks each of its
//! items as failed and the run moves on to the next chunk; only cancellation
//! stops it early.

use crate::errors::{ApaasError, ApaasResult};
use crate::types::{ApiResponse, ListPayload, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use tracing::{debug, error, info, warn};

/// Chunk size used when the caller passes zero.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Identifier recorded for items whose id cannot be determined.
pub const UNKNOWN_ID: &str = "unknown";

/// Kind of bulk write, which decides how a missing per-item `success` flag is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    /// Record creation; items without a flag count as created.
    Create,
    /// Record update; items without a flag count as failed.
    Update,
    /// Record deletion; items without a flag count as failed.
    Delete,
}

impl BatchOperation {
    /// Outcome assumed for a returned item that carries no boolean `success` field.
    pub fn default_success(&self) -> bool {
        matches!(self, BatchOperation::Create)
    }

    fn verb(&self) -> &'static str {
        match self {
            BatchOperation::Create => "Creation",
            BatchOperation::Update => "Update",
            BatchOperation::Delete => "Delete",
        }
    }

    /// Message recorded when a chunk fails with an error code but no message.
    pub fn failure_message(&self, code: &str) -> String {
        format!("{} failed with code {}", self.verb(), code)
    }

    /// Message recorded for inputs the server returned no result for.
    pub fn missing_result_message(&self) -> String {
        format!("{} result missing for item", self.verb())
    }

    /// Lower-case name used in log events.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOperation::Create => "create",
            BatchOperation::Update => "update",
            BatchOperation::Delete => "delete",
        }
    }
}

/// Outcome for one item of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationItem {
    /// Record id, or [`UNKNOWN_ID`].
    #[serde(rename = "_id")]
    pub id: String,
    /// Whether the item was written.
    pub success: bool,
    /// Failure reason, empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl OperationItem {
    /// A successful item.
    pub fn succeeded(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: true,
            error: String::new(),
        }
    }

    /// A failed item.
    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            error: error.into(),
        }
    }
}

/// Aggregated result of a bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Number of input items.
    pub total: usize,
    /// Items written, in input order.
    pub success: Vec<OperationItem>,
    /// Items that failed, in input order.
    pub failed: Vec<OperationItem>,
    /// `success.len()`.
    pub success_count: usize,
    /// `failed.len()`.
    pub failed_count: usize,
}

impl BatchResult {
    fn with_total(total: usize) -> Self {
        Self {
            total,
            success: Vec::with_capacity(total),
            ..Self::default()
        }
    }

    fn finish(mut self) -> Self {
        self.success_count = self.success.len();
        self.failed_count = self.failed.len();
        self
    }

    /// Returns true if nothing failed.
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail_chunk<T, I>(&mut self, chunk: &[T], id_of: &I, message: &str)
    where
        I: Fn(&T) -> Option<String>,
    {
        for item in chunk {
            let id = id_of(item).unwrap_or_else(|| UNKNOWN_ID.to_string());
            self.failed.push(OperationItem::failed(id, message));
        }
    }

    /// Records the items of a successful chunk, returning `(succeeded, failed)`.
    fn absorb_items(&mut self, items: Vec<Record>, operation: BatchOperation) -> (usize, usize) {
        let (mut succeeded, mut failed) = (0, 0);
        for item in items {
            let id = item
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_ID)
                .to_string();
            let success = item
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or_else(|| operation.default_success());

            if success {
                succeeded += 1;
                self.success.push(OperationItem::succeeded(id));
            } else {
                failed += 1;
                let reason = item.get("error").and_then(Value::as_str).unwrap_or_default();
                self.failed.push(OperationItem::failed(id, reason));
            }
        }
        (succeeded, failed)
    }
}

/// Splits `items` into chunks and runs `per_chunk` on each, strictly in order.
///
/// * `None` is a validation error; an empty slice returns an all-zero result
///   without calling `per_chunk`.
/// * `chunk_size == 0` means [`DEFAULT_CHUNK_SIZE`].
/// * A chunk whose call fails, whose envelope carries an error code or whose
///   data cannot be decoded marks every item of that chunk as failed, using
///   `id_of` for the id. The run then continues with the next chunk.
/// * Otherwise each returned item is classified by its `success` flag, falling
///   back to [`BatchOperation::default_success`]. Inputs beyond the number of
///   returned items are marked failed, so every input gets exactly one outcome.
/// * [`ApaasError::Cancelled`] aborts the whole run.
pub async fn run_batches<'a, T, I, F, Fut>(
    items: Option<&'a [T]>,
    chunk_size: usize,
    operation: BatchOperation,
    id_of: I,
    mut per_chunk: F,
) -> ApaasResult<BatchResult>
where
    I: Fn(&T) -> Option<String>,
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = ApaasResult<ApiResponse>>,
{
    let items = items.ok_or_else(|| {
        error!(operation = operation.as_str(), "batch input is missing");
        ApaasError::validation("records", "must be provided")
    })?;

    if items.is_empty() {
        debug!(operation = operation.as_str(), "empty batch input, nothing to do");
        return Ok(BatchResult::default());
    }

    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };
    let chunk_count = (items.len() + chunk_size - 1) / chunk_size;
    let mut result = BatchResult::with_total(items.len());

    debug!(
        operation = operation.as_str(),
        total = items.len(),
        chunk_size,
        "splitting batch"
    );

    for (index, chunk) in items.chunks(chunk_size).enumerate() {
        let chunk_no = index + 1;
        debug!(
            operation = operation.as_str(),
            chunk = chunk_no,
            chunks = chunk_count,
            size = chunk.len(),
            "processing chunk"
        );

        let response = match per_chunk(chunk).await {
            Ok(response) => response,
            Err(ApaasError::Cancelled) => return Err(ApaasError::Cancelled),
            Err(err) => {
                error!(operation = operation.as_str(), chunk = chunk_no, error = %err, "chunk failed");
                result.fail_chunk(chunk, &id_of, &err.to_string());
                continue;
            }
        };

        if !response.is_success() {
            error!(
                operation = operation.as_str(),
                chunk = chunk_no,
                code = %response.code,
                msg = %response.msg,
                "chunk rejected"
            );
            let message = if response.msg.is_empty() {
                operation.failure_message(&response.code)
            } else {
                response.msg.clone()
            };
            result.fail_chunk(chunk, &id_of, &message);
            continue;
        }

        let payload = match response.decode_data_or_default::<ListPayload<Record>>() {
            Ok(payload) => payload,
            Err(err) => {
                error!(operation = operation.as_str(), chunk = chunk_no, error = %err, "failed to decode chunk response");
                result.fail_chunk(chunk, &id_of, &err.to_string());
                continue;
            }
        };

        let returned = payload.items.len();
        let (succeeded, mut failed) = result.absorb_items(payload.items, operation);
        if returned < chunk.len() {
            let missing = &chunk[returned..];
            warn!(
                operation = operation.as_str(),
                chunk = chunk_no,
                missing = missing.len(),
                "server returned fewer results than items sent"
            );
            result.fail_chunk(missing, &id_of, &operation.missing_result_message());
            failed += missing.len();
        }
        info!(
            operation = operation.as_str(),
            chunk = chunk_no,
            success = succeeded,
            failed,
            "chunk completed"
        );
    }

    let result = result.finish();
    info!(
        operation = operation.as_str(),
        total = result.total,
        success = result.success_count,
        failed = result.failed_count,
        "batch completed"
    );
    Ok(result)
}

/// Reads the `_id` string of a record.
pub fn record_id(record: &Record) -> Option<String> {
    record.get("_id").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::Cell;

    fn ok_items(items: Value) -> ApaasResult<ApiResponse> {
        Ok(serde_json::from_value(json!({"code": "0", "msg": "success", "data": {"items": items}})).unwrap())
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id-{}", i)).collect()
    }

    #[tokio::test]
    async fn test_none_input_is_validation_error() {
        let result = run_batches::<String, _, _, _>(
            None,
            10,
            BatchOperation::Create,
            |id| Some(id.clone()),
            |_| async { ok_items(json!([])) },
        )
        .await;

        assert!(matches!(result, Err(ApaasError::Validation(_))));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let calls = Cell::new(0);
        let input: Vec<String> = Vec::new();

        let result = run_batches(
            Some(&input[..]),
            10,
            BatchOperation::Update,
            |id: &String| Some(id.clone()),
            |_| {
                calls.set(calls.get() + 1);
                async { ok_items(json!([])) }
            },
        )
        .await
        .unwrap();

        assert_eq!(result, BatchResult::default());
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_uses_default() {
        let input = ids(250);
        let sizes = std::cell::RefCell::new(Vec::new());

        let result = run_batches(
            Some(&input[..]),
            0,
            BatchOperation::Delete,
            |id: &String| Some(id.clone()),
            |chunk: &[String]| {
                sizes.borrow_mut().push(chunk.len());
                let items: Vec<Value> = chunk
                    .iter()
                    .map(|id| json!({"_id": id, "success": true}))
                    .collect();
                async move { ok_items(Value::Array(items)) }
            },
        )
        .await
        .unwrap();

        assert_eq!(*sizes.borrow(), vec![100, 100, 50]);
        assert_eq!(result.success_count, 250);
        assert_eq!(result.success[0].id, "id-0");
        assert_eq!(result.success[249].id, "id-249");
    }

    #[tokio::test]
    async fn test_missing_success_flag_defaults() {
        let input = ids(2);
        let respond = |_: &[String]| async {
            ok_items(json!([{"_id": "a"}, {"_id": "b", "success": "yes"}]))
        };

        let created = run_batches(Some(&input[..]), 10, BatchOperation::Create, |id: &String| Some(id.clone()), respond)
            .await
            .unwrap();
        assert_eq!(created.success_count, 2);
        assert_eq!(created.failed_count, 0);

        let updated = run_batches(Some(&input[..]), 10, BatchOperation::Update, |id: &String| Some(id.clone()), respond)
            .await
            .unwrap();
        assert_eq!(updated.success_count, 0);
        assert_eq!(updated.failed_count, 2);
        assert_eq!(updated.failed[0], OperationItem::failed("a", ""));

        let deleted = run_batches(Some(&input[..]), 10, BatchOperation::Delete, |id: &String| Some(id.clone()), respond)
            .await
            .unwrap();
        assert_eq!(deleted.failed_count, 2);
    }

    #[tokio::test]
    async fn test_per_item_failures_and_placeholder_ids() {
        let input = ids(3);

        let result = run_batches(
            Some(&input[..]),
            10,
            BatchOperation::Update,
            |id: &String| Some(id.clone()),
            |_| async {
                ok_items(json!([
                    {"_id": "id-0", "success": true},
                    {"_id": "id-1", "success": false, "error": "field is read-only"},
                    {"success": true}
                ]))
            },
        )
        .await
        .unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(
            result.success,
            vec![OperationItem::succeeded("id-0"), OperationItem::succeeded(UNKNOWN_ID)]
        );
        assert_eq!(
            result.failed,
            vec![OperationItem::failed("id-1", "field is read-only")]
        );
    }

    #[tokio::test]
    async fn test_error_code_fails_whole_chunk() {
        let input = ids(3);

        let result = run_batches(
            Some(&input[..]),
            2,
            BatchOperation::Create,
            |_: &String| None,
            |chunk: &[String]| {
                let first = chunk.len() == 2;
                async move {
                    if first {
                        Ok(serde_json::from_value::<ApiResponse>(json!({"code": "k_ec_1", "msg": ""})).unwrap())
                    } else {
                        ok_items(json!([{"_id": "new-1"}]))
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(result.failed_count, 2);
        assert_eq!(
            result.failed[0],
            OperationItem::failed(UNKNOWN_ID, "Creation failed with code k_ec_1")
        );
        assert_eq!(result.success, vec![OperationItem::succeeded("new-1")]);
    }

    #[tokio::test]
    async fn test_undecodable_chunk_fails_whole_chunk() {
        let input = ids(2);

        let result = run_batches(
            Some(&input[..]),
            10,
            BatchOperation::Delete,
            |id: &String| Some(id.clone()),
            |_| async {
                Ok(serde_json::from_value::<ApiResponse>(json!({"code": "0", "data": {"items": "oops"}})).unwrap())
            },
        )
        .await
        .unwrap();

        assert_eq!(result.failed_count, 2);
        assert_eq!(result.failed[1].id, "id-1");
        assert!(!result.failed[1].error.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_aborts() {
        let input = ids(5);
        let calls = Cell::new(0);

        let result = run_batches(
            Some(&input[..]),
            1,
            BatchOperation::Create,
            |id: &String| Some(id.clone()),
            |_| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n == 2 {
                        Err(ApaasError::Cancelled)
                    } else {
                        ok_items(json!([{"_id": "x"}]))
                    }
                }
            },
        )
        .await;

        assert!(matches!(result, Err(ApaasError::Cancelled)));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_inputs_without_results_are_failed() {
        let input = ids(150);

        let result = run_batches(
            Some(&input[..]),
            100,
            BatchOperation::Update,
            |id: &String| Some(id.clone()),
            |chunk: &[String]| {
                let first = chunk.len() == 100;
                async move {
                    if first {
                        Ok(serde_json::from_value::<ApiResponse>(json!({"code": "0", "msg": "success"})).unwrap())
                    } else {
                        ok_items(json!([
                            {"_id": "id-100", "success": true},
                            {"_id": "id-101", "success": true}
                        ]))
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(result.total, 150);
        assert_eq!(result.success_count + result.failed_count, 150);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failed_count, 148);
        assert_eq!(
            result.failed[0],
            OperationItem::failed("id-0", "Update result missing for item")
        );
        assert_eq!(
            result.failed[147],
            OperationItem::failed("id-149", "Update result missing for item")
        );
    }

    #[tokio::test]
    async fn test_null_data_fails_chunk_with_unknown_ids() {
        let input = ids(3);

        let result = run_batches(
            Some(&input[..]),
            10,
            BatchOperation::Create,
            |_: &String| None,
            |_| async {
                Ok(serde_json::from_value::<ApiResponse>(json!({"code": "0", "data": null})).unwrap())
            },
        )
        .await
        .unwrap();

        assert_eq!(result.failed_count, 3);
        assert_eq!(
            result.failed[2],
            OperationItem::failed(UNKNOWN_ID, "Creation result missing for item")
        );
    }

    #[test]
    fn test_record_id() {
        let record: Record = serde_json::from_value(json!({"_id": "r-1", "name": "x"})).unwrap();
        assert_eq!(record_id(&record), Some("r-1".to_string()));

        let record: Record = serde_json::from_value(json!({"_id": 42})).unwrap();
        assert_eq!(record_id(&record), None);
    }
}
