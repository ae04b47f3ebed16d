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
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::basalt_logging::info;
use crate::common::status::{Result, Status};
use crate::exec::chunk::{Chunk, Datum};
use crate::exec::sink::DataSink;
use crate::plan::OlapTableSinkDesc;
use crate::runtime::profile::{CounterRef, CounterUnit, RuntimeProfile};
use crate::runtime::query_statistics::QueryStatisticsRef;
use crate::runtime::runtime_state::RuntimeState;
use crate::runtime::sink_commit::{TabletCommitInfo, TabletFailInfo};

/// Ingest sink: distributes rows over the target tablets and reports
/// per-tablet commit (or fail) info through the publish/commit contract
/// when closed with the final execution status.
pub struct OlapTableSink {
    table_id: i64,
    tablet_ids: Vec<i64>,
    tablet_rows: HashMap<i64, i64>,
    loaded_rows: i64,
    loaded_bytes: i64,
    profile: RuntimeProfile,
    rows_written_counter: CounterRef,
    query_statistics: Option<QueryStatisticsRef>,
}

impl OlapTableSink {
    pub fn new(desc: &OlapTableSinkDesc) -> Result<Self> {
        if desc.tablet_ids.is_empty() {
            return Err(Status::invalid_argument(
                "OLAP_TABLE_SINK without target tablets",
            ));
        }
        let profile = RuntimeProfile::new("OlapTableSink");
        let rows_written_counter = profile.add_counter("RowsWritten", CounterUnit::Unit);
        Ok(Self {
            table_id: desc.table_id,
            tablet_ids: desc.tablet_ids.clone(),
            tablet_rows: HashMap::new(),
            loaded_rows: 0,
            loaded_bytes: 0,
            profile,
            rows_written_counter,
            query_statistics: None,
        })
    }

    fn tablet_for_row(&self, chunk: &Chunk, row: usize) -> Result<i64> {
        let mut hasher = DefaultHasher::new();
        // Distribute by the first column, the layout's leading key.
        let key: Datum = chunk.datum(0, row)?;
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.tablet_ids.len() as u64) as usize;
        Ok(self.tablet_ids[index])
    }
}

impl DataSink for OlapTableSink {
    fn name(&self) -> &'static str {
        "OlapTableSink"
    }

    fn prepare(&mut self, _state: &RuntimeState) -> Result<()> {
        Ok(())
    }

    fn open(&mut self, _state: &RuntimeState) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, _state: &RuntimeState, chunk: &Chunk) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        for row in 0..chunk.len() {
            let tablet_id = self.tablet_for_row(chunk, row)?;
            *self.tablet_rows.entry(tablet_id).or_insert(0) += 1;
        }
        self.loaded_rows += chunk.len() as i64;
        self.loaded_bytes += chunk.memory_usage() as i64;
        self.rows_written_counter.update(chunk.len() as i64);
        Ok(())
    }

    fn close(&mut self, state: &RuntimeState, exec_status: Status) -> Result<()> {
        if let Some(statistics) = self.query_statistics.as_ref() {
            let stats = statistics.lock().expect("query statistics lock");
            self.profile
                .add_info_string("ScanRows", stats.scan_rows().to_string());
        }
        let backend_id = state.backend_id();
        if exec_status.is_ok() {
            for tablet_id in self.tablet_rows.keys() {
                state.add_tablet_commit_info(TabletCommitInfo {
                    tablet_id: *tablet_id,
                    backend_id,
                });
            }
            state.add_sink_load_counters(self.loaded_rows, self.loaded_bytes);
            info!(
                "olap table sink committed: table_id={} finst={} loaded_rows={} loaded_bytes={}",
                self.table_id,
                state.fragment_instance_id(),
                self.loaded_rows,
                self.loaded_bytes
            );
        } else {
            for tablet_id in self.tablet_rows.keys() {
                state.add_tablet_fail_info(TabletFailInfo {
                    tablet_id: *tablet_id,
                    backend_id,
                });
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
