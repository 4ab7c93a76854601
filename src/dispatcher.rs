//! Upcall dispatcher (REDESIGN FLAG R3): a fixed-size pool of joinable OS
//! threads pulling upcalls off a bounded queue. The teacher's per-connection
//! task split (`read_task`/`vfs_task`/`stream_writer`) is generalized here
//! into a single blocking worker pool rather than async tasks -- see
//! SPEC_FULL.md §10 for why this crate does not depend on an async runtime.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{error, info};

use crate::cancel;
use crate::client::Client;
use crate::close_driver::{self, CloseRequest};
use crate::error::HostStatus;
use crate::open_driver::{self, OpenOutcome, OpenRequest};
use crate::path::FileHandle;

pub type OpenUpcallReply = Result<OpenOutcome, HostStatus>;
pub type CloseUpcallReply = Result<(), HostStatus>;

/// One unit of work handed from the kernel-facing upcall layer (out of scope
/// here, per §1) to a worker thread.
pub enum Upcall {
    Open { root: FileHandle, request: OpenRequest, reply: SyncSender<OpenUpcallReply> },
    Close { request: CloseRequest, reply: SyncSender<CloseUpcallReply> },
    Cancel { outcome: OpenOutcome },
}

/// Owns the worker pool and the queue feeding it. Dropping the last `Sender`
/// clone (via [`Dispatcher::shutdown`]) lets every worker drain and exit.
pub struct Dispatcher {
    sender: SyncSender<Upcall>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns `pool_size` worker threads sharing one upcall queue bounded to
    /// `queue_depth` entries -- the pool's size is the back-pressure valve
    /// (SPEC_FULL §5, "scheduling model").
    pub fn spawn(client: Arc<Client>, pool_size: usize, queue_depth: usize) -> Self {
        let (sender, receiver) = sync_channel(queue_depth);
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(pool_size);
        for id in 0..pool_size {
            let client = Arc::clone(&client);
            let receiver = Arc::clone(&receiver);
            let handle = std::thread::Builder::new()
                .name(format!("nfs41-worker-{id}"))
                .spawn(move || worker_loop(id, &client, &receiver))
                .expect("failed to spawn dispatcher worker thread");
            workers.push(handle);
        }
        Self { sender, workers }
    }

    /// Enqueues an upcall; blocks the submitting thread if the queue is full.
    pub fn submit(&self, upcall: Upcall) -> Result<(), std::sync::mpsc::SendError<Upcall>> {
        self.sender.send(upcall)
    }

    /// Closes the queue and joins every worker, draining whatever is left.
    pub fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if worker.join().is_err() {
                error!("dispatcher worker panicked during shutdown");
            }
        }
    }
}

fn worker_loop(id: usize, client: &Arc<Client>, receiver: &Arc<Mutex<Receiver<Upcall>>>) {
    info!(worker = id, "dispatcher worker started");
    loop {
        let upcall = receiver.lock().unwrap().recv();
        match upcall {
            Ok(Upcall::Open { root, request, reply }) => {
                let outcome = open_driver::open(client, &root, request);
                let _ = reply.send(outcome);
            }
            Ok(Upcall::Close { request, reply }) => {
                let result = close_driver::close(client, request);
                let _ = reply.send(result);
            }
            Ok(Upcall::Cancel { outcome }) => cancel::cancel(client, &outcome),
            Err(_) => break,
        }
    }
    info!(worker = id, "dispatcher worker stopped");
}
