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
use std::sync::Arc;

use crate::common::config;
use crate::common::status::{Result, Status};
use crate::exec::chunk::Chunk;
use crate::exec::sink::DataSink;
use crate::plan::MemoryScratchSinkDesc;
use crate::runtime::result_buffer::ScratchQueue;
use crate::runtime::runtime_state::RuntimeState;

/// Hands chunks to an in-process consumer through the result queue
/// manager. With a row limit configured, the first send at or past the
/// limit reports end-of-file so the driver stops pulling.
pub struct MemoryScratchSink {
    row_limit: Option<i64>,
    sent_rows: i64,
    queue: Option<Arc<ScratchQueue>>,
}

impl MemoryScratchSink {
    pub fn new(desc: &MemoryScratchSinkDesc) -> Self {
        Self {
            row_limit: desc.row_limit,
            sent_rows: 0,
            queue: None,
        }
    }
}

impl DataSink for MemoryScratchSink {
    fn name(&self) -> &'static str {
        "MemoryScratchSink"
    }

    fn prepare(&mut self, state: &RuntimeState) -> Result<()> {
        let queue = state.exec_env().result_queue_mgr().create_queue(
            state.fragment_instance_id(),
            config::scratch_queue_capacity(),
        );
        self.queue = Some(queue);
        Ok(())
    }

    fn open(&mut self, _state: &RuntimeState) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, _state: &RuntimeState, chunk: &Chunk) -> Result<()> {
        if let Some(limit) = self.row_limit {
            if self.sent_rows >= limit {
                return Err(Status::end_of_file("scratch sink reached its row limit"));
            }
        }
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| Status::internal_error("scratch sink not prepared"))?;
        queue.push(chunk.clone())?;
        self.sent_rows += chunk.len() as i64;
        Ok(())
    }

    fn close(&mut self, _state: &RuntimeState, exec_status: Status) -> Result<()> {
        if let Some(queue) = self.queue.take() {
            queue.mark_done(&exec_status);
        }
        Ok(())
    }
}
