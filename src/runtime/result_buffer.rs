// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Client-facing result plumbing.
//!
//! [`ResultBufferMgr`] buffers serialized result rows between a result sink
//! and the client fetch path; senders block when the buffer is full.
//! [`ResultQueueMgr`] carries whole chunks plus a terminal status to
//! external-interface consumers (scratch sinks, pull-mode queries).
//! Both managers honor `cancel(instance_id)` as the guaranteed unblock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::basalt_logging::debug;
use crate::common::status::{Result, Status};
use crate::common::types::UniqueId;
use crate::exec::chunk::Chunk;

/// One batch of serialized result rows handed to the client fetch path.
#[derive(Clone, Debug)]
pub struct ResultBatch {
    pub packet_seq: i64,
    pub rows: Vec<String>,
}

#[derive(Debug, Default)]
struct BufferState {
    queue: VecDeque<Vec<String>>,
    pending_rows: usize,
    cancelled: bool,
    closed: bool,
    close_status: Option<Status>,
    next_packet_seq: i64,
}

/// Per-instance result buffer shared by the sink and the fetch path.
#[derive(Debug)]
pub struct BufferControlBlock {
    capacity_rows: usize,
    mu: Mutex<BufferState>,
    cv: Condvar,
}

impl BufferControlBlock {
    fn new(capacity_rows: usize) -> Self {
        Self {
            capacity_rows: capacity_rows.max(1),
            mu: Mutex::new(BufferState::default()),
            cv: Condvar::new(),
        }
    }

    /// Sink side: append one batch of rows, blocking while the buffer is
    /// over capacity. Cancellation unblocks with `Cancelled`.
    pub fn add_batch(&self, rows: Vec<String>) -> Result<()> {
        let mut state = self.mu.lock().expect("result buffer lock");
        loop {
            if state.cancelled {
                return Err(Status::cancelled("result buffer cancelled"));
            }
            if state.closed {
                return Err(Status::internal_error("result buffer already closed"));
            }
            if state.pending_rows < self.capacity_rows {
                state.pending_rows += rows.len();
                state.queue.push_back(rows);
                self.cv.notify_all();
                return Ok(());
            }
            state = self.cv.wait(state).expect("result buffer lock");
        }
    }

    /// Fetch side: blocking pop. `None` means the sink closed cleanly and
    /// the buffer is drained; a failed close surfaces its status.
    pub fn fetch(&self, timeout: Duration) -> Result<Option<ResultBatch>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.mu.lock().expect("result buffer lock");
        loop {
            if state.cancelled {
                return Err(Status::cancelled("result buffer cancelled"));
            }
            if let Some(rows) = state.queue.pop_front() {
                state.pending_rows = state.pending_rows.saturating_sub(rows.len());
                let seq = state.next_packet_seq;
                state.next_packet_seq += 1;
                self.cv.notify_all();
                return Ok(Some(ResultBatch {
                    packet_seq: seq,
                    rows,
                }));
            }
            if state.closed {
                return match state.close_status.clone() {
                    Some(status) if !status.is_ok() => Err(status),
                    _ => Ok(None),
                };
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Status::rpc_error("result fetch timed out"));
            }
            let (guard, _) = self
                .cv
                .wait_timeout(state, deadline - now)
                .expect("result buffer lock");
            state = guard;
        }
    }

    /// Sink side: terminal close with the final execution status.
    pub fn close(&self, status: Status) {
        let mut state = self.mu.lock().expect("result buffer lock");
        if state.closed {
            return;
        }
        state.closed = true;
        state.close_status = Some(status);
        self.cv.notify_all();
    }

    fn cancel(&self) {
        let mut state = self.mu.lock().expect("result buffer lock");
        state.cancelled = true;
        self.cv.notify_all();
    }
}

/// Registry of per-instance result buffers.
#[derive(Default)]
pub struct ResultBufferMgr {
    buffers: Mutex<HashMap<UniqueId, Arc<BufferControlBlock>>>,
}

impl ResultBufferMgr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_sender(
        &self,
        instance_id: UniqueId,
        capacity_rows: usize,
    ) -> Arc<BufferControlBlock> {
        let mut guard = self.buffers.lock().expect("result buffer mgr lock");
        Arc::clone(
            guard
                .entry(instance_id)
                .or_insert_with(|| Arc::new(BufferControlBlock::new(capacity_rows))),
        )
    }

    pub fn find_buffer(&self, instance_id: UniqueId) -> Option<Arc<BufferControlBlock>> {
        self.buffers
            .lock()
            .expect("result buffer mgr lock")
            .get(&instance_id)
            .cloned()
    }

    /// Unblock the sink and fetch paths of one instance.
    pub fn cancel(&self, instance_id: UniqueId) {
        if let Some(buffer) = self.find_buffer(instance_id) {
            buffer.cancel();
        }
        debug!("result buffer mgr cancel: finst={}", instance_id);
    }

    pub fn remove(&self, instance_id: UniqueId) {
        self.buffers
            .lock()
            .expect("result buffer mgr lock")
            .remove(&instance_id);
    }
}

#[derive(Debug, Default)]
struct QueueState {
    chunks: VecDeque<Chunk>,
    done: bool,
    status: Status,
    cancelled: bool,
}

/// Per-instance chunk queue for external-interface consumers.
#[derive(Debug)]
pub struct ScratchQueue {
    capacity: usize,
    mu: Mutex<QueueState>,
    cv: Condvar,
}

impl ScratchQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            mu: Mutex::new(QueueState::default()),
            cv: Condvar::new(),
        }
    }

    /// Producer side: blocking push with cancellation unblock.
    pub fn push(&self, chunk: Chunk) -> Result<()> {
        let mut state = self.mu.lock().expect("scratch queue lock");
        loop {
            if state.cancelled {
                return Err(Status::cancelled("scratch queue cancelled"));
            }
            if state.chunks.len() < self.capacity {
                state.chunks.push_back(chunk);
                self.cv.notify_all();
                return Ok(());
            }
            state = self.cv.wait(state).expect("scratch queue lock");
        }
    }

    /// Consumer side: `None` at clean end-of-stream; a recorded non-OK
    /// status surfaces once the queue drains.
    pub fn pop(&self, timeout: Duration) -> Result<Option<Chunk>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.mu.lock().expect("scratch queue lock");
        loop {
            if state.cancelled {
                return Err(Status::cancelled("scratch queue cancelled"));
            }
            if let Some(chunk) = state.chunks.pop_front() {
                self.cv.notify_all();
                return Ok(Some(chunk));
            }
            if state.done {
                return state.status.clone().into_result().map(|_| None);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Status::rpc_error("scratch queue fetch timed out"));
            }
            let (guard, _) = self
                .cv
                .wait_timeout(state, deadline - now)
                .expect("scratch queue lock");
            state = guard;
        }
    }

    /// Terminal marker from the producing sink or the executor's status
    /// propagation; the first non-OK status wins.
    pub fn mark_done(&self, status: &Status) {
        let mut state = self.mu.lock().expect("scratch queue lock");
        if state.done && !state.status.is_ok() {
            return;
        }
        state.done = true;
        if state.status.is_ok() {
            state.status = status.clone();
        }
        self.cv.notify_all();
    }

    fn cancel(&self) {
        let mut state = self.mu.lock().expect("scratch queue lock");
        state.cancelled = true;
        self.cv.notify_all();
    }

    pub fn recorded_status(&self) -> Status {
        self.mu.lock().expect("scratch queue lock").status.clone()
    }
}

/// Registry of per-instance scratch queues for external query interfaces.
#[derive(Default)]
pub struct ResultQueueMgr {
    queues: Mutex<HashMap<UniqueId, Arc<ScratchQueue>>>,
}

impl ResultQueueMgr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_queue(&self, instance_id: UniqueId, capacity: usize) -> Arc<ScratchQueue> {
        let mut guard = self.queues.lock().expect("result queue mgr lock");
        Arc::clone(
            guard
                .entry(instance_id)
                .or_insert_with(|| Arc::new(ScratchQueue::new(capacity))),
        )
    }

    pub fn find_queue(&self, instance_id: UniqueId) -> Option<Arc<ScratchQueue>> {
        self.queues
            .lock()
            .expect("result queue mgr lock")
            .get(&instance_id)
            .cloned()
    }

    /// Propagate a failed executor status so blocked consumers observe it.
    pub fn update_queue_status(&self, instance_id: UniqueId, status: &Status) {
        if status.is_ok() {
            return;
        }
        if let Some(queue) = self.find_queue(instance_id) {
            queue.mark_done(status);
        }
    }

    pub fn cancel(&self, instance_id: UniqueId) {
        if let Some(queue) = self.find_queue(instance_id) {
            queue.cancel();
        }
    }

    pub fn remove(&self, instance_id: UniqueId) {
        self.queues
            .lock()
            .expect("result queue mgr lock")
            .remove(&instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn buffer_round_trips_batches_in_order() {
        let mgr = ResultBufferMgr::new();
        let finst = UniqueId::new(1, 10);
        let buffer = mgr.create_sender(finst, 1024);
        buffer.add_batch(vec!["1\ta".to_string()]).expect("add");
        buffer.add_batch(vec!["2\tb".to_string()]).expect("add");
        buffer.close(Status::ok());

        let first = buffer
            .fetch(Duration::from_secs(1))
            .expect("fetch")
            .expect("batch");
        assert_eq!(first.packet_seq, 0);
        assert_eq!(first.rows, vec!["1\ta".to_string()]);
        let second = buffer
            .fetch(Duration::from_secs(1))
            .expect("fetch")
            .expect("batch");
        assert_eq!(second.packet_seq, 1);
        assert!(buffer.fetch(Duration::from_secs(1)).expect("fetch").is_none());
    }

    #[test]
    fn failed_close_surfaces_to_fetch() {
        let mgr = ResultBufferMgr::new();
        let finst = UniqueId::new(2, 20);
        let buffer = mgr.create_sender(finst, 16);
        buffer.close(Status::internal_error("boom"));
        let err = buffer
            .fetch(Duration::from_secs(1))
            .expect_err("close status");
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn cancel_unblocks_full_buffer_sender() {
        let mgr = Arc::new(ResultBufferMgr::new());
        let finst = UniqueId::new(3, 30);
        let buffer = mgr.create_sender(finst, 1);
        buffer.add_batch(vec!["x".to_string()]).expect("first add");

        let mgr_clone = Arc::clone(&mgr);
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            mgr_clone.cancel(finst);
        });
        let err = buffer
            .add_batch(vec!["y".to_string()])
            .expect_err("cancelled while blocked");
        assert!(err.is_cancelled());
        canceller.join().expect("join canceller");
    }

    #[test]
    fn queue_status_reaches_consumer() {
        let mgr = ResultQueueMgr::new();
        let finst = UniqueId::new(4, 40);
        let queue = mgr.create_queue(finst, 4);
        mgr.update_queue_status(finst, &Status::mem_limit_exceeded("oom"));
        let err = queue.pop(Duration::from_secs(1)).expect_err("status");
        assert!(err.is_mem_limit_exceeded());
    }
}
