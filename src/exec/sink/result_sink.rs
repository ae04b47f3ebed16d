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
use crate::exec::expr::Expr;
use crate::exec::sink::{DataSink, render_rows};
use crate::runtime::profile::{CounterRef, CounterUnit, RuntimeProfile};
use crate::runtime::query_statistics::QueryStatisticsRef;
use crate::runtime::result_buffer::BufferControlBlock;
use crate::runtime::runtime_state::RuntimeState;

/// Feeds the client result set through the result-buffer manager. Sends
/// block when the client falls behind; cancellation unblocks them.
pub struct ResultSink {
    output_exprs: Vec<Expr>,
    buffer: Option<Arc<BufferControlBlock>>,
    profile: RuntimeProfile,
    rows_appended_counter: CounterRef,
    query_statistics: Option<QueryStatisticsRef>,
}

impl ResultSink {
    pub fn new(output_exprs: Vec<Expr>) -> Self {
        let profile = RuntimeProfile::new("ResultSink");
        let rows_appended_counter = profile.add_counter("RowsAppended", CounterUnit::Unit);
        Self {
            output_exprs,
            buffer: None,
            profile,
            rows_appended_counter,
            query_statistics: None,
        }
    }
}

impl DataSink for ResultSink {
    fn name(&self) -> &'static str {
        "ResultSink"
    }

    fn prepare(&mut self, state: &RuntimeState) -> Result<()> {
        let buffer = state.exec_env().result_mgr().create_sender(
            state.fragment_instance_id(),
            config::result_buffer_capacity_rows(),
        );
        self.buffer = Some(buffer);
        Ok(())
    }

    fn open(&mut self, _state: &RuntimeState) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, _state: &RuntimeState, chunk: &Chunk) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| Status::internal_error("result sink not prepared"))?;
        let rows = render_rows(chunk, &self.output_exprs, "\t")?;
        self.rows_appended_counter.update(rows.len() as i64);
        buffer.add_batch(rows)
    }

    fn close(&mut self, _state: &RuntimeState, exec_status: Status) -> Result<()> {
        if let Some(statistics) = self.query_statistics.as_ref() {
            let stats = statistics.lock().expect("query statistics lock");
            self.profile
                .add_info_string("ReturnedRows", stats.returned_rows().to_string());
        }
        if let Some(buffer) = self.buffer.take() {
            buffer.close(exec_status);
        }
        Ok(())
    }

    fn profile(&self) -> Option<&RuntimeProfile> {
        Some(&self.profile)
    }

    fn set_query_statistics(&mut self, statistics: QueryStatisticsRef) {
        self.query_statistics = Some(statistics);
    }
}
