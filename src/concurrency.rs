use anyhow::{Context, Result};
use tokio::task::JoinHandle;

/// Runs futures as separate tokio tasks and returns their outputs in input order.
///
/// A panicking task fails the whole batch.
pub async fn run_parallel<T, F>(futs: Vec<F>) -> Result<Vec<T>>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<JoinHandle<T>> = futs.into_iter().map(tokio::spawn).collect();

    let mut out = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        out.push(handle.await.with_context(|| format!("Task {} did not complete", index))?);
    }
    Ok(out)
}
