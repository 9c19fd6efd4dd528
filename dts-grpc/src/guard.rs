//! Scoped call guard.
//!
//! Every call site goes through [`guard`] (one RPC) or [`guard_with`] (a group
//! of RPCs expressed as one future). The future is owned by the guard and
//! dropped on every exit path, so channels, streams and buffers borrowed for
//! the call are released whether it succeeds or fails. A failure always comes
//! back as a [`CallError`], never as a raw `tonic::Status`.

use std::future::Future;

use tonic::{Response, Status};

use crate::error::CallError;

/// Await a single RPC and unwrap its response message.
pub async fn guard<T, F>(call: F) -> Result<T, CallError>
where
    F: Future<Output = Result<Response<T>, Status>>,
{
    guard_with(async move { call.await.map(Response::into_inner) }).await
}

/// Await any future that fails with a `Status`, e.g. several calls chained
/// with `?`.
pub async fn guard_with<T, F>(calls: F) -> Result<T, CallError>
where
    F: Future<Output = Result<T, Status>>,
{
    match calls.await {
        Ok(value) => Ok(value),
        Err(status) => {
            let err = CallError::from(status);
            tracing::debug!(
                code = ?err.code,
                category = %err.category,
                message = %err.message,
                "call failed"
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallCategory;

    #[tokio::test]
    async fn unimplemented_status_is_categorized() {
        let call = async { Err::<Response<()>, _>(Status::unimplemented("Method not implemented!")) };
        let err = guard(call).await.unwrap_err();
        assert_eq!(err.category, CallCategory::Unimplemented);
        assert_eq!(err.message, "Method not implemented!");
    }

    #[tokio::test]
    async fn success_unwraps_the_message() {
        let value = guard(async { Ok::<_, Status>(Response::new(42u32)) })
            .await
            .expect("ok");
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn group_stops_at_first_failure() {
        let result: Result<u32, CallError> = guard_with(async {
            let first = Ok::<u32, Status>(1)?;
            let second = Err::<u32, Status>(Status::not_found("missing.safetensors"))?;
            Ok(first + second)
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.category, CallCategory::NotFound);
    }
}
