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
use std::collections::VecDeque;

use crate::basalt_logging::debug;
use crate::common::ids::TupleId;
use crate::common::status::{Result, Status};
use crate::exec::chunk::Chunk;
use crate::exec::node::ExecNodeBase;
use crate::plan::{PlanNodeDesc, ScanRangeParams};
use crate::runtime::profile::{CounterRef, CounterUnit};
use crate::runtime::runtime_state::RuntimeState;

pub const RAW_ROWS_READ_COUNTER: &str = "RawRowsRead";
pub const BYTES_READ_COUNTER: &str = "BytesRead";

/// Scan over locally stored tablets.
///
/// Ranges are bound after prepare from the coordinator's per-node
/// assignment; a node with zero ranges produces zero rows but still walks
/// the full state machine. Tablet internals stay behind the
/// `TabletSource` contract.
pub struct OlapScanNode {
    #[allow(dead_code)]
    tuple_id: TupleId,
    scan_ranges: Vec<ScanRangeParams>,
    pending: VecDeque<Chunk>,
    rows_read_counter: Option<CounterRef>,
    bytes_read_counter: Option<CounterRef>,
}

impl OlapScanNode {
    pub fn from_desc(desc: &PlanNodeDesc) -> Result<Self> {
        let scan_desc = desc
            .olap_scan_node
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("OLAP_SCAN_NODE missing scan descriptor"))?;
        let tuple_id =
            TupleId::try_from(scan_desc.tuple_id).map_err(Status::invalid_argument)?;
        Ok(Self {
            tuple_id,
            scan_ranges: Vec::new(),
            pending: VecDeque::new(),
            rows_read_counter: None,
            bytes_read_counter: None,
        })
    }

    pub fn set_scan_ranges(&mut self, ranges: Vec<ScanRangeParams>) {
        self.scan_ranges = ranges;
    }

    pub fn scan_range_count(&self) -> usize {
        self.scan_ranges.len()
    }

    pub(crate) fn prepare(&mut self, _state: &RuntimeState, base: &mut ExecNodeBase) -> Result<()> {
        self.rows_read_counter =
            Some(base.runtime_profile().add_counter(RAW_ROWS_READ_COUNTER, CounterUnit::Unit));
        self.bytes_read_counter =
            Some(base.runtime_profile().add_counter(BYTES_READ_COUNTER, CounterUnit::Bytes));
        Ok(())
    }

    pub(crate) fn open(&mut self, state: &RuntimeState, base: &mut ExecNodeBase) -> Result<()> {
        let source = std::sync::Arc::clone(state.exec_env().tablet_source());
        for range in &self.scan_ranges {
            state.check_cancelled()?;
            let chunks = source.tablet_chunks(range)?;
            for chunk in chunks {
                let projected = chunk.project_to_schema(base.schema())?;
                base.track_memory(projected.memory_usage())?;
                if let Some(counter) = self.rows_read_counter.as_ref() {
                    counter.update(projected.len() as i64);
                }
                if let Some(counter) = self.bytes_read_counter.as_ref() {
                    counter.update(projected.memory_usage() as i64);
                }
                self.pending.push_back(projected);
            }
        }
        debug!(
            "olap scan opened: node_id={} ranges={} chunks={}",
            base.id(),
            self.scan_ranges.len(),
            self.pending.len()
        );
        Ok(())
    }

    pub(crate) fn get_next(
        &mut self,
        _state: &RuntimeState,
        _base: &mut ExecNodeBase,
        chunk: &mut Chunk,
        eos: &mut bool,
    ) -> Result<()> {
        match self.pending.pop_front() {
            Some(next) => {
                *chunk = next;
            }
            None => {
                chunk.reset();
                *eos = true;
            }
        }
        Ok(())
    }

    pub(crate) fn close(&mut self, _state: &RuntimeState, _base: &mut ExecNodeBase) {
        self.pending.clear();
    }
}
