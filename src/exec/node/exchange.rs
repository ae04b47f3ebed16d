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
use std::time::Duration;

use crate::common::config;
use crate::common::status::{Result, Status};
use crate::exec::chunk::Chunk;
use crate::exec::node::ExecNodeBase;
use crate::runtime::profile::{CounterRef, CounterUnit};
use crate::runtime::runtime_state::RuntimeState;

/// Receive side of a fragment boundary.
///
/// The expected sender count must be configured before prepare; receives
/// block on the stream manager, whose `cancel(instance_id)` is the
/// guaranteed unblock.
pub struct ExchangeNode {
    num_senders: usize,
    rows_received_counter: Option<CounterRef>,
    bytes_received_counter: Option<CounterRef>,
}

impl ExchangeNode {
    pub fn new() -> Self {
        Self {
            num_senders: 0,
            rows_received_counter: None,
            bytes_received_counter: None,
        }
    }

    pub fn set_num_senders(&mut self, num_senders: usize) {
        self.num_senders = num_senders;
    }

    pub fn num_senders(&self) -> usize {
        self.num_senders
    }

    pub(crate) fn prepare(&mut self, state: &RuntimeState, base: &mut ExecNodeBase) -> Result<()> {
        if self.num_senders == 0 {
            return Err(Status::invalid_argument(
                "exchange node has no sender count configured",
            ));
        }
        self.rows_received_counter =
            Some(base.runtime_profile().add_counter("RowsReceived", CounterUnit::Unit));
        self.bytes_received_counter =
            Some(base.runtime_profile().add_counter("BytesReceived", CounterUnit::Bytes));
        let mem_tracker = base.mem_tracker().cloned();
        state.exec_env().stream_mgr().create_recvr(
            state.fragment_instance_id(),
            base.id(),
            self.num_senders,
            mem_tracker,
        );
        Ok(())
    }

    pub(crate) fn open(&mut self, _state: &RuntimeState, _base: &mut ExecNodeBase) -> Result<()> {
        Ok(())
    }

    pub(crate) fn get_next(
        &mut self,
        state: &RuntimeState,
        base: &mut ExecNodeBase,
        chunk: &mut Chunk,
        eos: &mut bool,
    ) -> Result<()> {
        let timeout = Duration::from_millis(config::exchange_wait_ms());
        let received = state.exec_env().stream_mgr().get_next(
            state.fragment_instance_id(),
            base.id(),
            timeout,
        )?;
        match received {
            Some(next) => {
                if let Some(counter) = self.rows_received_counter.as_ref() {
                    counter.update(next.len() as i64);
                }
                if let Some(counter) = self.bytes_received_counter.as_ref() {
                    counter.update(next.memory_usage() as i64);
                }
                *chunk = next;
            }
            None => {
                chunk.reset();
                *eos = true;
            }
        }
        Ok(())
    }

    pub(crate) fn close(&mut self, state: &RuntimeState, base: &mut ExecNodeBase) {
        state
            .exec_env()
            .stream_mgr()
            .close_recvr(state.fragment_instance_id(), base.id());
    }
}
