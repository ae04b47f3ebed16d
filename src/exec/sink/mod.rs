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
//! Terminal consumers of a fragment's output.
//!
//! A sink is prepared and opened by the executor, fed one chunk per `send`,
//! and closed exactly once with the final execution status. `send`
//! returning `EndOfFile` asks the driver to stop pulling and is treated as
//! graceful termination, not an error.

pub mod data_stream_sender;
pub mod export_sink;
pub mod memory_scratch_sink;
pub mod olap_table_sink;
pub mod result_sink;

use crate::common::status::{Result, Status};
use crate::exec::chunk::Chunk;
use crate::exec::expr::Expr;
use crate::exec::sink::data_stream_sender::DataStreamSender;
use crate::exec::sink::export_sink::ExportSink;
use crate::exec::sink::memory_scratch_sink::MemoryScratchSink;
use crate::exec::sink::olap_table_sink::OlapTableSink;
use crate::exec::sink::result_sink::ResultSink;
use crate::plan::{DataSinkDesc, DataSinkType, ExprDesc, PlanFragmentExecParams};
use crate::runtime::profile::RuntimeProfile;
use crate::runtime::query_statistics::QueryStatisticsRef;
use crate::runtime::runtime_state::RuntimeState;

pub trait DataSink: Send {
    fn name(&self) -> &'static str;

    /// Allocate buffers and wire the sink-scoped profile subtree.
    fn prepare(&mut self, state: &RuntimeState) -> Result<()>;

    /// Establish channels; blocking allowed.
    fn open(&mut self, state: &RuntimeState) -> Result<()>;

    /// Consume one chunk; blocking allowed. `EndOfFile` means graceful
    /// early termination.
    fn send(&mut self, state: &RuntimeState, chunk: &Chunk) -> Result<()>;

    /// Finalize; invoked exactly once even on failure. `exec_status` lets
    /// ingest sinks decide between commit and rollback.
    fn close(&mut self, state: &RuntimeState, exec_status: Status) -> Result<()>;

    fn profile(&self) -> Option<&RuntimeProfile> {
        None
    }

    /// Install the shared statistics accumulator so the sink includes it
    /// in its outgoing messages.
    fn set_query_statistics(&mut self, statistics: QueryStatisticsRef) {
        let _ = statistics;
    }
}

/// Build the sink named by the output-sink descriptor.
pub fn create_data_sink(
    desc: &DataSinkDesc,
    output_exprs: &[ExprDesc],
    params: &PlanFragmentExecParams,
) -> Result<Box<dyn DataSink>> {
    let output_exprs = Expr::from_descs(output_exprs)?;
    let sink: Box<dyn DataSink> = match desc.sink_type {
        DataSinkType::DataStreamSink => {
            let stream_desc = desc.stream_sink.as_ref().ok_or_else(|| {
                Status::invalid_argument("DATA_STREAM_SINK missing stream descriptor")
            })?;
            Box::new(DataStreamSender::new(stream_desc, params)?)
        }
        DataSinkType::ResultSink => Box::new(ResultSink::new(output_exprs)),
        DataSinkType::OlapTableSink => {
            let table_desc = desc.olap_table_sink.as_ref().ok_or_else(|| {
                Status::invalid_argument("OLAP_TABLE_SINK missing table descriptor")
            })?;
            Box::new(OlapTableSink::new(table_desc)?)
        }
        DataSinkType::ExportSink => {
            let export_desc = desc.export_sink.as_ref().ok_or_else(|| {
                Status::invalid_argument("EXPORT_SINK missing export descriptor")
            })?;
            Box::new(ExportSink::new(export_desc, output_exprs))
        }
        DataSinkType::MemoryScratchSink => {
            let scratch_desc = desc.memory_scratch_sink.clone().unwrap_or_default();
            Box::new(MemoryScratchSink::new(&scratch_desc))
        }
    };
    Ok(sink)
}

/// Render chunk rows as delimiter-joined text, through the output exprs
/// when present.
pub(crate) fn render_rows(
    chunk: &Chunk,
    output_exprs: &[Expr],
    separator: &str,
) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(chunk.len());
    for row in 0..chunk.len() {
        let datums = if output_exprs.is_empty() {
            chunk.row_datums(row)?
        } else {
            output_exprs
                .iter()
                .map(|e| e.evaluate(chunk, row))
                .collect::<Result<_>>()?
        };
        let rendered: Vec<String> = datums.iter().map(|d| d.to_string()).collect();
        out.push(rendered.join(separator));
    }
    Ok(out)
}
