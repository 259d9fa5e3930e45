use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::error::AppError;
use crate::models::order::OrderId;
use crate::state::AppState;

/// Counts the order before handing it over, so the worker's decrement never runs first.
pub async fn enqueue_dispatch(state: &AppState, order_id: OrderId) -> Result<(), AppError> {
    state.metrics.dispatch_queue_depth.inc();

    if let Err(err) = state.dispatch_tx.send(order_id).await {
        state.metrics.dispatch_queue_depth.dec();
        return Err(AppError::Internal(format!(
            "dispatch queue send failed: {err}"
        )));
    }
    Ok(())
}

/// Non-blocking enqueue for request paths; a full or closed queue is logged and skipped.
pub fn try_enqueue_dispatch(state: &AppState, order_id: OrderId) {
    state.metrics.dispatch_queue_depth.inc();

    let reason = match state.dispatch_tx.try_send(order_id) {
        Ok(()) => return,
        Err(TrySendError::Full(_)) => "dispatch queue full; order left for manual dispatch",
        Err(TrySendError::Closed(_)) => "dispatch queue closed; order left for manual dispatch",
    };
    state.metrics.dispatch_queue_depth.dec();
    warn!(order_id = %order_id, "{reason}");
}
