//! 外部调用的超时与取消

use rtedit_core::{Result, RtEditError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 在超时预算和取消令牌约束下执行一次外部调用
pub async fn bounded<T, F>(
    operation: &str,
    budget: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(RtEditError::Cancelled(operation.to_string()));
    }

    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::warn!("Call {} cancelled", operation);
            Err(RtEditError::Cancelled(operation.to_string()))
        }
        outcome = tokio::time::timeout(budget, call) => match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Call {} exceeded budget {:?}", operation, budget);
                Err(RtEditError::Timeout {
                    operation: operation.to_string(),
                    budget,
                })
            }
        },
    }
}
