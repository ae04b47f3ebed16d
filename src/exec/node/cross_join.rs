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
use arrow::datatypes::SchemaRef;

use crate::common::status::{Result, Status};
use crate::exec::chunk::{Chunk, Datum};
use crate::exec::node::{ExecNode, ExecNodeBase, pull_child_chunk};
use crate::runtime::runtime_state::RuntimeState;

/// Nested-loop cartesian product: the right child is materialized at open,
/// then each probe row is paired with the whole build side, one probe row
/// per output chunk.
pub struct CrossJoinNode {
    build_schema: Option<SchemaRef>,
    build_chunk: Option<Chunk>,
    probe_chunk: Option<Chunk>,
    probe_row: usize,
    probe_eos: bool,
}

impl CrossJoinNode {
    pub fn new() -> Self {
        Self {
            build_schema: None,
            build_chunk: None,
            probe_chunk: None,
            probe_row: 0,
            probe_eos: false,
        }
    }

    pub(crate) fn open(
        &mut self,
        state: &RuntimeState,
        base: &mut ExecNodeBase,
        children: &mut [ExecNode],
    ) -> Result<()> {
        let [probe_child, build_child] = children else {
            return Err(Status::internal_error("cross join expects two children"));
        };
        build_child.open(state)?;
        let build_schema = build_child.schema();
        let mut scratch = Chunk::empty(build_schema.clone())?;
        let mut build_eos = false;
        let mut build_rows: Vec<Vec<Datum>> = Vec::new();
        while pull_child_chunk(build_child, state, &mut scratch, &mut build_eos)? {
            base.track_memory(scratch.memory_usage())?;
            for row in 0..scratch.len() {
                build_rows.push(scratch.row_datums(row)?);
            }
        }
        self.build_chunk = Some(Chunk::from_rows(build_schema.clone(), &build_rows)?);
        self.build_schema = Some(build_schema);

        probe_child.open(state)?;
        self.probe_chunk = Some(Chunk::empty(probe_child.schema())?);
        self.probe_row = 0;
        Ok(())
    }

    pub(crate) fn get_next(
        &mut self,
        state: &RuntimeState,
        base: &mut ExecNodeBase,
        children: &mut [ExecNode],
        chunk: &mut Chunk,
        eos: &mut bool,
    ) -> Result<()> {
        let build_chunk = self
            .build_chunk
            .as_ref()
            .ok_or_else(|| Status::internal_error("cross join not opened"))?;
        if build_chunk.is_empty() {
            chunk.reset();
            *eos = true;
            return Ok(());
        }
        loop {
            let probe_chunk = self
                .probe_chunk
                .as_mut()
                .ok_or_else(|| Status::internal_error("cross join not opened"))?;
            if self.probe_row >= probe_chunk.len() {
                if self.probe_eos {
                    chunk.reset();
                    *eos = true;
                    return Ok(());
                }
                if !pull_child_chunk(&mut children[0], state, probe_chunk, &mut self.probe_eos)? {
                    continue;
                }
                self.probe_row = 0;
            }

            let probe_indices = vec![self.probe_row as u32; build_chunk.len()];
            let probe_taken = probe_chunk.take(&probe_indices)?;
            *chunk = Chunk::compose(base.schema(), &[&probe_taken, build_chunk])?;
            self.probe_row += 1;
            return Ok(());
        }
    }

    pub(crate) fn close(&mut self, _state: &RuntimeState, _base: &mut ExecNodeBase) {
        self.build_chunk = None;
        self.probe_chunk = None;
    }
}
