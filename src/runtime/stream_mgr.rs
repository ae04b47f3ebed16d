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
//! Data stream manager: routes sender chunks to exchange receivers.
//!
//! Receivers block on a condvar until data, sender close, or cancellation
//! arrives. `cancel(instance_id)` is the executor's guaranteed unblock for
//! exchange receives and may be called from any thread.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::basalt_logging::debug;
use crate::common::status::{Result, Status};
use crate::common::types::UniqueId;
use crate::exec::chunk::Chunk;
use crate::runtime::mem_tracker::MemTracker;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ReceiverKey {
    pub instance_id: UniqueId,
    pub node_id: i32,
}

#[derive(Default)]
struct ReceiverState {
    num_remaining_senders: usize,
    chunks: VecDeque<Chunk>,
    queued_bytes: i64,
    is_cancelled: bool,
    mem_tracker: Option<Arc<MemTracker>>,
}

struct Receiver {
    mu: Mutex<ReceiverState>,
    cv: Condvar,
}

/// Process-wide router from stream senders to exchange receivers.
#[derive(Default)]
pub struct DataStreamMgr {
    receivers: Mutex<HashMap<ReceiverKey, Arc<Receiver>>>,
}

impl DataStreamMgr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the receive side of an exchange before senders appear.
    pub fn create_recvr(
        &self,
        instance_id: UniqueId,
        node_id: i32,
        num_senders: usize,
        mem_tracker: Option<Arc<MemTracker>>,
    ) {
        let key = ReceiverKey {
            instance_id,
            node_id,
        };
        let mut guard = self.receivers.lock().expect("stream mgr lock");
        let receiver = guard.entry(key).or_insert_with(|| {
            Arc::new(Receiver {
                mu: Mutex::new(ReceiverState::default()),
                cv: Condvar::new(),
            })
        });
        let mut state = receiver.mu.lock().expect("stream receiver lock");
        state.num_remaining_senders = num_senders;
        state.mem_tracker = mem_tracker;
        debug!(
            "exchange receiver created: finst={} node_id={} num_senders={}",
            instance_id, node_id, num_senders
        );
    }

    fn find(&self, instance_id: UniqueId, node_id: i32) -> Option<Arc<Receiver>> {
        let key = ReceiverKey {
            instance_id,
            node_id,
        };
        self.receivers
            .lock()
            .expect("stream mgr lock")
            .get(&key)
            .cloned()
    }

    /// Sender side: enqueue one chunk for a receiver.
    pub fn add_chunk(&self, instance_id: UniqueId, node_id: i32, chunk: Chunk) -> Result<()> {
        let receiver = self.find(instance_id, node_id).ok_or_else(|| {
            Status::rpc_error(format!(
                "no exchange receiver for finst={} node_id={}",
                instance_id, node_id
            ))
        })?;
        let mut state = receiver.mu.lock().expect("stream receiver lock");
        if state.is_cancelled {
            return Err(Status::cancelled("exchange receiver cancelled"));
        }
        let bytes = chunk.memory_usage() as i64;
        if let Some(tracker) = state.mem_tracker.as_ref() {
            tracker.consume(bytes);
        }
        state.queued_bytes += bytes;
        state.chunks.push_back(chunk);
        receiver.cv.notify_all();
        Ok(())
    }

    /// Sender side: report end-of-stream for one sender.
    pub fn close_sender(&self, instance_id: UniqueId, node_id: i32) -> Result<()> {
        let receiver = self.find(instance_id, node_id).ok_or_else(|| {
            Status::rpc_error(format!(
                "no exchange receiver for finst={} node_id={}",
                instance_id, node_id
            ))
        })?;
        let mut state = receiver.mu.lock().expect("stream receiver lock");
        state.num_remaining_senders = state.num_remaining_senders.saturating_sub(1);
        receiver.cv.notify_all();
        Ok(())
    }

    /// Receiver side: blocking pop. Returns `None` once all senders are done
    /// and the queue is drained. Cancellation surfaces as `Cancelled`; an
    /// exhausted wait budget surfaces as `RpcError`.
    pub fn get_next(
        &self,
        instance_id: UniqueId,
        node_id: i32,
        timeout: Duration,
    ) -> Result<Option<Chunk>> {
        let receiver = self.find(instance_id, node_id).ok_or_else(|| {
            Status::internal_error(format!(
                "exchange receiver missing for finst={} node_id={}",
                instance_id, node_id
            ))
        })?;
        let deadline = Instant::now() + timeout;
        let mut state = receiver.mu.lock().expect("stream receiver lock");
        loop {
            if state.is_cancelled {
                return Err(Status::cancelled("exchange receiver cancelled"));
            }
            if let Some(chunk) = state.chunks.pop_front() {
                let bytes = chunk.memory_usage() as i64;
                state.queued_bytes -= bytes;
                if let Some(tracker) = state.mem_tracker.as_ref() {
                    tracker.release(bytes);
                }
                return Ok(Some(chunk));
            }
            if state.num_remaining_senders == 0 {
                return Ok(None);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Status::rpc_error(format!(
                    "exchange receive timed out: finst={} node_id={}",
                    instance_id, node_id
                )));
            }
            let (guard, _) = receiver
                .cv
                .wait_timeout(state, deadline - now)
                .expect("stream receiver lock");
            state = guard;
        }
    }

    /// Unblock and poison every receiver of one fragment instance.
    pub fn cancel(&self, instance_id: UniqueId) {
        let receivers: Vec<Arc<Receiver>> = {
            let guard = self.receivers.lock().expect("stream mgr lock");
            guard
                .iter()
                .filter(|(key, _)| key.instance_id == instance_id)
                .map(|(_, r)| Arc::clone(r))
                .collect()
        };
        for receiver in receivers {
            let mut state = receiver.mu.lock().expect("stream receiver lock");
            state.is_cancelled = true;
            release_queued(&mut state);
            receiver.cv.notify_all();
        }
        debug!("stream mgr cancel: finst={}", instance_id);
    }

    /// Drop the receiver registration after the exchange node closes.
    pub fn close_recvr(&self, instance_id: UniqueId, node_id: i32) {
        let key = ReceiverKey {
            instance_id,
            node_id,
        };
        let removed = self.receivers.lock().expect("stream mgr lock").remove(&key);
        if let Some(receiver) = removed {
            let mut state = receiver.mu.lock().expect("stream receiver lock");
            release_queued(&mut state);
            receiver.cv.notify_all();
        }
    }
}

fn release_queued(state: &mut ReceiverState) {
    if let Some(tracker) = state.mem_tracker.as_ref() {
        tracker.release(state.queued_bytes);
    }
    state.queued_bytes = 0;
    state.chunks.clear();
}
