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
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::basalt_logging::debug;
use crate::common::status::{Result, Status};
use crate::common::types::UniqueId;
use crate::exec::chunk::{Chunk, Datum};
use crate::exec::expr::Expr;
use crate::exec::sink::DataSink;
use crate::plan::{DataPartitionType, DataStreamSinkDesc, PlanFragmentExecParams};
use crate::runtime::profile::{CounterRef, CounterUnit, RuntimeProfile};
use crate::runtime::query_statistics::QueryStatisticsRef;
use crate::runtime::runtime_state::RuntimeState;

/// Fan-out of the fragment's output to the exchange receivers of the
/// destination instances, through the stream manager.
pub struct DataStreamSender {
    dest_node_id: i32,
    destinations: Vec<UniqueId>,
    partition_type: DataPartitionType,
    partition_exprs: Vec<Expr>,
    next_destination: usize,
    senders_closed: bool,
    profile: RuntimeProfile,
    rows_sent_counter: CounterRef,
    bytes_sent_counter: CounterRef,
    query_statistics: Option<QueryStatisticsRef>,
}

impl DataStreamSender {
    pub fn new(desc: &DataStreamSinkDesc, params: &PlanFragmentExecParams) -> Result<Self> {
        if params.destinations.is_empty() {
            return Err(Status::invalid_argument(
                "DATA_STREAM_SINK without destinations",
            ));
        }
        if desc.partition_type == DataPartitionType::HashPartitioned
            && desc.partition_exprs.is_empty()
        {
            return Err(Status::invalid_argument(
                "hash-partitioned stream sink without partition exprs",
            ));
        }
        let profile = RuntimeProfile::new("DataStreamSender");
        let rows_sent_counter = profile.add_counter("RowsSent", CounterUnit::Unit);
        let bytes_sent_counter = profile.add_counter("BytesSent", CounterUnit::Bytes);
        Ok(Self {
            dest_node_id: desc.dest_node_id,
            destinations: params
                .destinations
                .iter()
                .map(|d| d.fragment_instance_id)
                .collect(),
            partition_type: desc.partition_type,
            partition_exprs: Expr::from_descs(&desc.partition_exprs)?,
            next_destination: 0,
            senders_closed: false,
            profile,
            rows_sent_counter,
            bytes_sent_counter,
            query_statistics: None,
        })
    }

    fn record_sent(&self, chunk: &Chunk) {
        self.rows_sent_counter.update(chunk.len() as i64);
        self.bytes_sent_counter.update(chunk.memory_usage() as i64);
    }
}

impl DataSink for DataStreamSender {
    fn name(&self) -> &'static str {
        "DataStreamSender"
    }

    fn prepare(&mut self, _state: &RuntimeState) -> Result<()> {
        Ok(())
    }

    fn open(&mut self, _state: &RuntimeState) -> Result<()> {
        // Channels are the in-process stream manager; receivers register
        // themselves during their own prepare.
        Ok(())
    }

    fn send(&mut self, state: &RuntimeState, chunk: &Chunk) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let stream_mgr = state.exec_env().stream_mgr();
        match self.partition_type {
            DataPartitionType::Unpartitioned => {
                for dest in &self.destinations {
                    stream_mgr.add_chunk(*dest, self.dest_node_id, chunk.clone())?;
                    self.record_sent(chunk);
                }
            }
            DataPartitionType::Random => {
                let dest = self.destinations[self.next_destination % self.destinations.len()];
                self.next_destination = self.next_destination.wrapping_add(1);
                stream_mgr.add_chunk(dest, self.dest_node_id, chunk.clone())?;
                self.record_sent(chunk);
            }
            DataPartitionType::HashPartitioned => {
                let num_dests = self.destinations.len();
                let mut rows_per_dest: Vec<Vec<u32>> = vec![Vec::new(); num_dests];
                for row in 0..chunk.len() {
                    let key: Vec<Datum> = self
                        .partition_exprs
                        .iter()
                        .map(|e| e.evaluate(chunk, row))
                        .collect::<Result<_>>()?;
                    let mut hasher = DefaultHasher::new();
                    key.hash(&mut hasher);
                    let dest = (hasher.finish() % num_dests as u64) as usize;
                    rows_per_dest[dest].push(row as u32);
                }
                for (dest_idx, rows) in rows_per_dest.iter().enumerate() {
                    if rows.is_empty() {
                        continue;
                    }
                    let part = chunk.take(rows)?;
                    stream_mgr.add_chunk(
                        self.destinations[dest_idx],
                        self.dest_node_id,
                        part.clone(),
                    )?;
                    self.record_sent(&part);
                }
            }
        }
        Ok(())
    }

    fn close(&mut self, state: &RuntimeState, _exec_status: Status) -> Result<()> {
        if self.senders_closed {
            return Ok(());
        }
        self.senders_closed = true;
        // Statistics ride along with the end-of-stream marker so the
        // parent fragment can aggregate work done below this boundary.
        if let Some(statistics) = self.query_statistics.as_ref() {
            let stats = statistics.lock().expect("query statistics lock");
            debug!(
                "stream sink eos: scan_rows={} scan_bytes={} cpu_ms={}",
                stats.scan_rows(),
                stats.scan_bytes(),
                stats.cpu_ms()
            );
        }
        // Receivers need the end-of-stream marker on every exit path so
        // peer fragments do not hang; a receiver already torn down by
        // cancellation is not an error here.
        for dest in &self.destinations {
            if let Err(e) = state
                .exec_env()
                .stream_mgr()
                .close_sender(*dest, self.dest_node_id)
            {
                debug!(
                    "close_sender failed: dest={} node_id={} status={}",
                    dest, self.dest_node_id, e
                );
            }
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
