use crate::server::{error::ServiceError, protocol::Reply, service::handler::SctIdService};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

/// Serves one client connection until it closes or the service shuts down.
///
/// Requests on a connection are handled one at a time, in order, so replies
/// line up with requests. Blank lines are ignored. A line longer than the
/// configured maximum gets a `BAD_REQUEST` reply and closes the connection,
/// since the framing can no longer be trusted.
pub async fn serve_connection<IO>(io: IO, service: SctIdService)
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let max = service.max_line_bytes();
    let mut framed = Framed::new(io, LinesCodec::new_with_max_length(max));
    let shutdown = service.shutdown_token();

    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            frame = framed.next() => frame,
        };

        let (reply, keep_open) = match frame {
            None => break,
            Some(Ok(line)) if line.trim().is_empty() => continue,
            Some(Ok(line)) => (service.handle_line(&line).await, true),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                tracing::warn!(max, "request line too long, closing connection");
                (Reply::error(ServiceError::LineTooLong { max }), false)
            }
            Some(Err(LinesCodecError::Io(e))) => {
                tracing::debug!(error = %e, "connection read failed");
                break;
            }
        };

        if let Err(e) = framed.send(reply.to_line()).await {
            tracing::debug!(error = %e, "connection write failed");
            break;
        }
        if !keep_open {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::service::config::ServiceConfig;
    use core::time::Duration;
    use sctid::{Coordinator, CoordinatorConfig, MemoryStore, StaticTokenAuthorizer};
    use serde_json::Value;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    fn service(max_line_bytes: usize) -> SctIdService {
        SctIdService::new(
            Coordinator::new(MemoryStore::new(), CoordinatorConfig::default()),
            StaticTokenAuthorizer::new([("s3cret", "alice")]),
            &ServiceConfig {
                num_workers: 2,
                max_line_bytes,
                shutdown_timeout: Duration::from_secs(1),
            },
        )
    }

    #[tokio::test]
    async fn one_reply_per_request_line_in_order() {
        let service = service(4096);
        let (client, server) = duplex(64 * 1024);
        let task = tokio::spawn(serve_connection(server, service.clone()));

        let (read, mut write) = tokio::io::split(client);
        write
            .write_all(
                concat!(
                    r#"{"credential":"s3cret","op":"generate","namespace":0,"category":"CONCEPT","quantity":1,"idempotencyKey":"a"}"#,
                    "\n\n",
                    r#"{"credential":"s3cret","op":"lookup","id":"100005"}"#,
                    "\n",
                    "garbage\n",
                )
                .as_bytes(),
            )
            .await
            .unwrap();
        write.shutdown().await.unwrap();

        let mut lines = BufReader::new(read).lines();
        let mut replies = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            replies.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        task.await.unwrap();

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["ok"]["records"][0]["id"], "100005");
        assert_eq!(replies[1]["ok"]["status"], "RESERVED");
        assert_eq!(replies[2]["error"]["kind"], "BAD_REQUEST");
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn oversized_line_is_rejected_and_closes() {
        let service = service(64);
        let (client, server) = duplex(64 * 1024);
        let task = tokio::spawn(serve_connection(server, service.clone()));

        let (read, mut write) = tokio::io::split(client);
        let mut long = "x".repeat(200);
        long.push('\n');
        write.write_all(long.as_bytes()).await.unwrap();

        let mut lines = BufReader::new(read).lines();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["error"]["kind"], "BAD_REQUEST");
        assert!(lines.next_line().await.unwrap().is_none());
        task.await.unwrap();
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_idle_connections() {
        let service = service(4096);
        let (_client, server) = duplex(1024);
        let task = tokio::spawn(serve_connection(server, service.clone()));
        service.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
