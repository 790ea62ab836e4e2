use crate::server::{
    error::{Result, ServiceError},
    pool::request::WorkRequest,
    protocol::{Command, Payload},
};
use sctid::{Coordinator, GenerateRequest, Principal, RecordStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Worker task processing [`WorkRequest`] messages.
///
/// Coordinator calls block on bucket locks and disk I/O, so each request runs
/// on the blocking thread pool while the worker awaits it. A worker therefore
/// has at most one request in flight, which bounds how many threads the
/// engine can occupy to the pool size.
///
/// Runs until it receives [`WorkRequest::Shutdown`] or every sender is
/// dropped. Requests that arrive after `shutdown_token` is cancelled are
/// answered with [`ServiceError::ServiceShutdown`] without touching the
/// engine.
pub async fn worker_loop<S>(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    coordinator: Arc<Coordinator<S>>,
    shutdown_token: CancellationToken,
) where
    S: RecordStore + 'static,
{
    tracing::trace!("Worker {worker_id} started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Execute {
                principal,
                command,
                response,
            } => {
                let result = if shutdown_token.is_cancelled() {
                    Err(ServiceError::ServiceShutdown)
                } else {
                    let coordinator = Arc::clone(&coordinator);
                    tokio::task::spawn_blocking(move || {
                        execute(&coordinator, &principal, command)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        Err(ServiceError::Worker {
                            reason: e.to_string(),
                        })
                    })
                };
                if response.send(result).is_err() {
                    tracing::debug!("Worker {worker_id}: requester went away before the reply");
                }
            }
            WorkRequest::Shutdown { response } => {
                tracing::debug!("Worker {worker_id} received shutdown signal");
                if response.send(()).is_err() {
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}

/// Runs one command against the engine. Blocking.
pub fn execute<S: RecordStore>(
    coordinator: &Coordinator<S>,
    principal: &Principal,
    command: Command,
) -> Result<Payload> {
    let (operation, payload) = match command.into_transition() {
        Ok(transition) => transition,
        Err(Command::Generate {
            namespace,
            category,
            quantity,
            idempotency_key,
        }) => {
            let request = GenerateRequest {
                namespace,
                category,
                quantity,
                requestor_id: principal.to_string(),
                idempotency_key,
            };
            return Ok(Payload::Generated(coordinator.generate(&request)?));
        }
        Err(Command::Lookup { id }) => return Ok(Payload::Record(coordinator.lookup(&id)?)),
        Err(Command::LookupMany { ids }) => {
            return Ok(Payload::Records(coordinator.lookup_many(&ids)?));
        }
        Err(Command::Bucket {
            namespace,
            category,
        }) => {
            return Ok(Payload::Bucket(
                coordinator.bucket_snapshot(namespace, category)?,
            ));
        }
        Err(other) => {
            return Err(ServiceError::protocol(format!(
                "unsupported op {}",
                other.name()
            )));
        }
    };
    let report = coordinator.apply(operation, &payload.into_request(principal))?;
    Ok(Payload::Batch(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::protocol::TransitionPayload;
    use sctid::{Category, CoordinatorConfig, IdentifierStatus, MemoryStore, Namespace};

    fn coordinator() -> Coordinator<MemoryStore> {
        Coordinator::new(MemoryStore::new(), CoordinatorConfig::default())
    }

    #[test]
    fn executes_against_the_engine_as_the_principal() {
        let coordinator = coordinator();
        let alice = Principal::new("alice");
        let generated = execute(
            &coordinator,
            &alice,
            Command::Generate {
                namespace: Namespace::CORE,
                category: Category::Concept,
                quantity: 2,
                idempotency_key: "g".into(),
            },
        )
        .unwrap();
        let Payload::Generated(generated) = generated else {
            panic!("expected generated ids");
        };
        assert_eq!(generated.records.len(), 2);
        assert!(generated.records.iter().all(|r| r.requestor_id() == "alice"));

        let ids: Vec<String> = generated.ids().collect();
        let Payload::Batch(report) = execute(
            &coordinator,
            &alice,
            Command::Register(TransitionPayload {
                ids: ids.clone(),
                comment: None,
                idempotency_key: "r".into(),
            }),
        )
        .unwrap() else {
            panic!("expected a batch report");
        };
        assert!(report.all_applied());

        let Payload::Record(record) =
            execute(&coordinator, &alice, Command::Lookup { id: ids[0].clone() }).unwrap()
        else {
            panic!("expected a record");
        };
        assert_eq!(record.status(), IdentifierStatus::Assigned);
    }

    #[test]
    fn engine_errors_keep_their_kind() {
        let err = execute(
            &coordinator(),
            &Principal::new("alice"),
            Command::Lookup {
                id: "138875005".into(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), sctid::ErrorKind::NotFound);
        assert_eq!(err.ids(), ["138875005"]);
    }
}
