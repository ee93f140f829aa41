//! Command executor - runs decoded requests against the translator

use servo_core::{
    CommandTranslator, ErrorKind, Position, Reply, Request, ServoError, ServoExecutor,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Translator over whichever backend the service was configured with
pub type SharedTranslator = Arc<CommandTranslator<Arc<dyn ServoExecutor>>>;

/// Result of command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Positions were written
    Applied,
    /// Snapshot of every channel
    Positions(Vec<Position>),
}

impl From<CommandResult> for Reply {
    fn from(result: CommandResult) -> Self {
        match result {
            CommandResult::Applied => Reply::Ok,
            CommandResult::Positions(positions) => Reply::Positions(positions),
        }
    }
}

/// Executes requests received from clients
pub struct CommandExecutor {
    translator: SharedTranslator,
    request_id: AtomicU64,
}

impl CommandExecutor {
    pub fn new(translator: SharedTranslator) -> Self {
        Self {
            translator,
            request_id: AtomicU64::new(0),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.translator.channel_count()
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Execute a request and build the reply
    ///
    /// Hardware I/O happens on the blocking pool so slow backends never
    /// stall the connection tasks.
    pub async fn execute(&self, request: Request) -> Reply {
        let request_id = self.next_request_id();
        let started = Instant::now();
        debug!("Executing request {}: {:?}", request_id, request);

        let translator = self.translator.clone();
        let outcome = tokio::task::spawn_blocking(move || run(&translator, request)).await;

        match outcome {
            Ok(Ok(result)) => {
                debug!(
                    "Request {} completed in {:?}",
                    request_id,
                    started.elapsed()
                );
                result.into()
            }
            Ok(Err(e @ ServoError::Executor(_))) => {
                error!("Request {} failed in backend: {}", request_id, e);
                Reply::from(&e)
            }
            Ok(Err(e)) => {
                warn!("Request {} rejected: {}", request_id, e);
                Reply::from(&e)
            }
            Err(e) => {
                error!("Request {} task failed: {}", request_id, e);
                Reply::error(ErrorKind::Executor, format!("backend task failed: {}", e))
            }
        }
    }
}

/// Map one request onto the translator
fn run(
    translator: &CommandTranslator<Arc<dyn ServoExecutor>>,
    request: Request,
) -> Result<CommandResult, ServoError> {
    if let Request::Operation(operation) = &request {
        info!(
            "Operation {:?} on {} devices",
            operation.name,
            operation.devices.len()
        );
    }

    let command = request.into_command()?;
    Ok(match translator.execute(command)? {
        Some(positions) => CommandResult::Positions(positions),
        None => CommandResult::Applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedServos;
    use servo_core::{ChannelMaskTable, Device, Operation, Parameter, SparseUpdate};

    fn executor(channels: usize) -> CommandExecutor {
        let backend: Arc<dyn ServoExecutor> = Arc::new(SimulatedServos::new(channels, 0));
        let translator = CommandTranslator::new(Arc::new(ChannelMaskTable::new(channels)), backend);
        CommandExecutor::new(Arc::new(translator))
    }

    #[tokio::test]
    async fn test_set_then_query() {
        let exec = executor(4);

        let reply = exec
            .execute(Request::SetPositions(SparseUpdate::from([(1, 90), (3, 45)])))
            .await;
        assert_eq!(reply, Reply::Ok);

        let reply = exec.execute(Request::SetPosition { id: 2, position: 120 }).await;
        assert_eq!(reply, Reply::Ok);

        let reply = exec.execute(Request::GetPositions).await;
        assert_eq!(reply, Reply::Positions(vec![0, 90, 120, 45]));
    }

    #[tokio::test]
    async fn test_operation_request() {
        let exec = executor(3);
        let op = Operation::new(
            "SET_POSITION",
            vec![Device::new(0, vec![Parameter::new("Position", "10")])],
        );

        assert_eq!(exec.execute(Request::Operation(op)).await, Reply::Ok);
        assert_eq!(
            exec.execute(Request::GetPositions).await,
            Reply::Positions(vec![10, 0, 0])
        );
    }

    #[tokio::test]
    async fn test_error_replies() {
        let exec = executor(4);

        let reply = exec.execute(Request::SetPositionsFlat(vec![1, 5, 2])).await;
        assert!(matches!(
            reply,
            Reply::Error {
                kind: ErrorKind::IllegalArgument,
                ..
            }
        ));

        let reply = exec
            .execute(Request::Operation(Operation::new("spin", vec![])))
            .await;
        assert!(matches!(
            reply,
            Reply::Error {
                kind: ErrorKind::UnsupportedOperation,
                ..
            }
        ));

        let reply = exec.execute(Request::SetPosition { id: 9, position: 1 }).await;
        assert!(matches!(
            reply,
            Reply::Error {
                kind: ErrorKind::ChannelOutOfRange,
                ..
            }
        ));

        // Nothing above reached the servos
        assert_eq!(
            exec.execute(Request::GetPositions).await,
            Reply::Positions(vec![0; 4])
        );
    }
}
