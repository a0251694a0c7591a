/*!
 * Request command implementation
 *
 * Serves JSON-lines requests: one request object per input line, one
 * response object per output line, in order. Blank lines are skipped.
 */

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

use crate::service::Dispatcher;

/// Handles the request command
pub struct RequestCommand;

impl RequestCommand {
    pub async fn execute(dispatcher: Dispatcher) -> Result<()> {
        log_session_start(&dispatcher);
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        let served = serve_lines(&dispatcher, stdin, stdout).await?;

        let stats = dispatcher.stats();
        info!(
            served,
            succeeded = stats.requests_succeeded,
            partial = stats.requests_partial,
            failed = stats.requests_failed,
            timed_out = stats.requests_timed_out,
            "request stream closed"
        );
        Ok(())
    }
}

fn log_session_start(dispatcher: &Dispatcher) {
    info!(
        root = %dispatcher.manager().sandbox().root().display(),
        "serving JSON requests on stdin"
    );
}

/// Answer every line of `reader` on `writer`. Returns the number of
/// requests served.
pub async fn serve_lines<R, W>(dispatcher: &Dispatcher, reader: R, mut writer: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut served = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = dispatcher.dispatch_json(&line).await;
        let mut encoded = serde_json::to_vec(&response).context("Failed to encode response")?;
        encoded.push(b'\n');
        writer
            .write_all(&encoded)
            .await
            .context("Failed to write response")?;
        writer.flush().await.context("Failed to flush response")?;
        served += 1;
    }

    Ok(served)
}
