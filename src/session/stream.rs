use std::time::Instant;

use futures_util::{Stream, StreamExt};

use super::StreamSession;
use crate::observability::log_session_complete;
use crate::protocol::ToolCallDelta;

/// Drive a [`StreamSession`] from an async stream of delta batches.
///
/// Yields each non-empty XML fragment as soon as its batch has been
/// processed, then the [`StreamSession::finalize`] fragment once `batches`
/// ends. Dropping the returned stream early is the cancellation path; the
/// session goes with it.
pub fn xml_fragment_stream<S>(
    batches: S,
    session: StreamSession,
) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Vec<ToolCallDelta>> + Send + 'static,
{
    futures_util::stream::unfold(
        (Box::pin(batches), Some((session, Instant::now()))),
        |(mut batches, state)| async move {
            let (mut session, started) = state?;
            loop {
                let Some(batch) = batches.as_mut().next().await else {
                    let tail = session.finalize();
                    log_session_complete(&session.stats(), started);
                    return (!tail.is_empty()).then_some((tail, (batches, None)));
                };
                let output = session.process_delta_batch(&batch);
                if !output.xml.is_empty() {
                    return Some((output.xml, (batches, Some((session, started)))));
                }
            }
        },
    )
}
