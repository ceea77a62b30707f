use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::session::{
    run_session, PicsCommand, PicsRequest, PicsResponse, PicsResult, SessionStatus,
};
use crate::documents::ProductInfo;
use crate::Status;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PRODUCT_INFO_TIMEOUT: Duration = Duration::from_secs(30);
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Caller side of the product-info session: serialized request/response
/// queues with per-request correlation ids and caller-side timeouts.
pub struct PicsClient {
    requests: Sender<PicsRequest>,
    responses: Mutex<Receiver<PicsResponse>>,
    counter: Mutex<u64>,
    worker: Option<JoinHandle<()>>,
}

impl PicsClient {
    pub fn start() -> PicsClient {
        let (request_tx, request_rx) = channel::<PicsRequest>();
        let (response_tx, response_rx) = channel::<PicsResponse>();

        let worker = std::thread::Builder::new()
            .name("pics-session".into())
            .spawn(move || run_session(request_rx, response_tx))
            .ok();
        info!("product-info session worker started");

        PicsClient {
            requests: request_tx,
            responses: Mutex::new(response_rx),
            counter: Mutex::new(0),
            worker,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| !worker.is_finished())
            .unwrap_or(false)
    }

    fn send_request(&self, command: PicsCommand, timeout: Duration) -> Result<PicsResult, Status> {
        let request_id = {
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            *counter
        };

        self.requests
            .send(PicsRequest {
                id: request_id,
                command,
            })
            .map_err(|_| Status::internal("product-info session worker is gone"))?;

        // One outstanding request at a time; stale responses from timed-out
        // predecessors are drained by id.
        let responses = self.responses.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Status::network(format!(
                    "product-info request {request_id} timed out"
                )));
            }
            match responses.recv_timeout(remaining) {
                Ok(response) if response.id == request_id => {
                    return response.result.map_err(Status::internal);
                }
                Ok(stale) => {
                    warn!("discarding stale product-info response {}", stale.id);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(Status::network(format!(
                        "product-info request {request_id} timed out"
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Status::internal("product-info session worker is gone"))
                }
            }
        }
    }

    pub fn connect(&self, force: bool) -> Result<bool, Status> {
        match self.send_request(PicsCommand::Connect { force }, CONNECT_TIMEOUT)? {
            PicsResult::Connected(ok) => Ok(ok),
            _ => Err(Status::internal("unexpected response to connect")),
        }
    }

    pub fn disconnect(&self) -> Result<(), Status> {
        self.send_request(PicsCommand::Disconnect, CONTROL_TIMEOUT)?;
        Ok(())
    }

    pub fn get_product_info(&self, app_ids: Vec<u32>) -> Result<HashMap<u32, ProductInfo>, Status> {
        match self.send_request(PicsCommand::GetProductInfo { app_ids }, PRODUCT_INFO_TIMEOUT)? {
            PicsResult::Products(products) => Ok(products),
            _ => Err(Status::internal("unexpected response to get_product_info")),
        }
    }

    pub fn status(&self) -> Result<SessionStatus, Status> {
        match self.send_request(PicsCommand::Status, CONTROL_TIMEOUT)? {
            PicsResult::Status(status) => Ok(status),
            _ => Err(Status::internal("unexpected response to status")),
        }
    }

    pub fn shutdown(&self) {
        let _ = self.send_request(PicsCommand::Shutdown, CONTROL_TIMEOUT);
    }
}

/// Thread-safe factory for the process-wide session client. Restarts the
/// worker when it has died.
pub struct PicsManager {
    client: Mutex<Option<PicsClient>>,
}

impl PicsManager {
    pub fn new() -> PicsManager {
        PicsManager {
            client: Mutex::new(None),
        }
    }

    /// Runs `f` against a live client, starting or restarting the worker
    /// first when needed.
    pub fn with_client<T>(&self, f: impl FnOnce(&PicsClient) -> T) -> T {
        let mut guard = self.client.lock().unwrap();
        let needs_restart = match guard.as_ref() {
            Some(client) => !client.is_alive(),
            None => true,
        };
        if needs_restart {
            if guard.is_some() {
                warn!("product-info session worker died, restarting");
            }
            *guard = Some(PicsClient::start());
        }

        f(guard.as_ref().unwrap())
    }
}

impl Default for PicsManager {
    fn default() -> Self {
        PicsManager::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_the_worker() {
        let client = PicsClient::start();

        let status = client.status().unwrap();
        assert!(!status.logged_in);
        assert_eq!(status.login_failures, 0);

        client.shutdown();
    }

    #[test]
    fn correlation_ids_increase() {
        let client = PicsClient::start();

        client.status().unwrap();
        client.status().unwrap();
        assert_eq!(*client.counter.lock().unwrap(), 2);

        client.shutdown();
    }

    #[test]
    fn manager_restarts_a_dead_worker() {
        let manager = PicsManager::new();

        manager.with_client(|client| client.shutdown());
        // Give the worker thread a moment to exit.
        std::thread::sleep(Duration::from_millis(50));

        let status = manager.with_client(|client| client.status());
        assert!(status.is_ok());
    }
}
