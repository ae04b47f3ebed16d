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
use crate::common::status::{Result, Status};
use crate::exec::chunk::{Chunk, Datum};
use crate::exec::node::sort::{SortKey, drain_and_sort, emit_sorted_rows};
use crate::exec::node::{ExecNode, ExecNodeBase};
use crate::plan::PlanNodeDesc;
use crate::runtime::runtime_state::RuntimeState;

/// Sort with offset; the node's row limit bounds what is emitted after the
/// offset is skipped.
pub struct TopNNode {
    key: SortKey,
    offset: i64,
    sorted_rows: Vec<Vec<Datum>>,
    cursor: usize,
}

impl TopNNode {
    pub fn from_desc(desc: &PlanNodeDesc) -> Result<Self> {
        let sort_desc = desc
            .sort_node
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("TOP_N_NODE missing sort descriptor"))?;
        if desc.limit < 0 {
            return Err(Status::invalid_argument("TOP_N_NODE without a limit"));
        }
        Ok(Self {
            key: SortKey::from_desc(sort_desc)?,
            offset: sort_desc.offset.max(0),
            sorted_rows: Vec::new(),
            cursor: 0,
        })
    }

    pub(crate) fn open(
        &mut self,
        state: &RuntimeState,
        base: &mut ExecNodeBase,
        children: &mut [ExecNode],
    ) -> Result<()> {
        children[0].open(state)?;
        let mut rows = drain_and_sort(state, base, &mut children[0], &self.key)?;
        let offset = (self.offset as usize).min(rows.len());
        if offset > 0 {
            rows.drain(..offset);
        }
        self.sorted_rows = rows;
        Ok(())
    }

    pub(crate) fn get_next(
        &mut self,
        state: &RuntimeState,
        base: &mut ExecNodeBase,
        _children: &mut [ExecNode],
        chunk: &mut Chunk,
        eos: &mut bool,
    ) -> Result<()> {
        emit_sorted_rows(
            state,
            base,
            &self.sorted_rows,
            &mut self.cursor,
            chunk,
            eos,
        )
    }

    pub(crate) fn close(&mut self, _state: &RuntimeState, _base: &mut ExecNodeBase) {
        self.sorted_rows.clear();
    }
}
