//! Wires a bound UDP socket to a pool of workers: builds the queues,
//! spawns the dispatcher and each worker task, and owns the shutdown
//! signal that stops all of them together.

use std::sync::Arc;

use sipd_transport::{Dispatcher, MessageQueue, TimerService};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::{EngineError, EngineResult};
use crate::responder::{Responder, UdpResponder};
use crate::worker::Worker;

/// A running server: the dispatcher and worker tasks, plus the handle
/// used to tell them all to stop.
pub struct Server {
    config: ServerConfig,
    shutdown_tx: watch::Sender<bool>,
    dispatcher_task: JoinHandle<()>,
    worker_tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Bind the configured port and spawn the dispatcher plus one
    /// worker task per `config.worker_count`.
    pub async fn bind(config: ServerConfig) -> EngineResult<Self> {
        let addr = ("0.0.0.0", config.port);
        let socket = UdpSocket::bind(addr).await.map_err(|err| {
            error!(port = config.port, error = %err, "failed to bind UDP socket");
            EngineError::AllocationFailure("UDP socket bind failed")
        })?;
        let socket = Arc::new(socket);
        info!(port = config.port, workers = config.worker_count, "bound UDP socket");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let responder: Arc<dyn Responder> = Arc::new(UdpResponder::new(socket.clone()));

        let mut worker_queues = Vec::with_capacity(config.worker_count);
        let mut worker_tasks = Vec::with_capacity(config.worker_count);
        for id in 0..config.worker_count {
            let (queue, queue_rx) = MessageQueue::bounded(config.queue_capacity);
            let (timer_tx, timer_rx) = mpsc::channel(config.queue_capacity.max(1));
            let timers = TimerService::new(timer_tx);
            let worker = Worker {
                id,
                queue: queue_rx,
                timer_rx,
                responder: responder.clone(),
                timers,
            };
            worker_tasks.push(tokio::spawn(worker.run()));
            worker_queues.push(queue);
        }

        let dispatcher = Dispatcher::new(socket, worker_queues, shutdown_rx);
        let dispatcher_task = tokio::spawn(dispatcher.run());

        Ok(Server {
            config,
            shutdown_tx,
            dispatcher_task,
            worker_tasks,
        })
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Signal the dispatcher to stop accepting new datagrams and wait
    /// for it to exit. Worker tasks drain whatever is already queued
    /// and then idle on their now-closed queues; this does not await
    /// them, matching the dispatcher-first shutdown order a SIGTERM
    /// handler would want (stop intake before tearing down state).
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.dispatcher_task.await;
        for task in self.worker_tasks {
            task.abort();
        }
    }
}
