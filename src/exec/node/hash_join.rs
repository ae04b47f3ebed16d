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

use arrow::datatypes::SchemaRef;

use crate::common::status::{Result, Status};
use crate::exec::chunk::{Chunk, Datum};
use crate::exec::expr::Expr;
use crate::exec::node::{ExecNode, ExecNodeBase, pull_child_chunk};
use crate::plan::{JoinOp, PlanNodeDesc};
use crate::runtime::profile::{CounterRef, CounterUnit};
use crate::runtime::runtime_state::RuntimeState;

/// Hash join: the right child is the build side, drained fully at open;
/// the left child is probed chunk by chunk. Output rows stitch probe
/// columns and build columns by slot id.
pub struct HashJoinNode {
    join_op: JoinOp,
    probe_exprs: Vec<Expr>,
    build_exprs: Vec<Expr>,
    build_schema: Option<SchemaRef>,
    build_rows: Vec<Vec<Datum>>,
    build_index: HashMap<Vec<Datum>, Vec<usize>>,
    probe_chunk: Option<Chunk>,
    probe_eos: bool,
    build_rows_counter: Option<CounterRef>,
    probe_rows_counter: Option<CounterRef>,
}

impl HashJoinNode {
    pub fn from_desc(desc: &PlanNodeDesc) -> Result<Self> {
        let join_desc = desc
            .hash_join_node
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("HASH_JOIN_NODE missing join descriptor"))?;
        if join_desc.eq_join_conjuncts.is_empty() {
            return Err(Status::invalid_argument(
                "HASH_JOIN_NODE without equi-join conjuncts",
            ));
        }
        let mut probe_exprs = Vec::with_capacity(join_desc.eq_join_conjuncts.len());
        let mut build_exprs = Vec::with_capacity(join_desc.eq_join_conjuncts.len());
        for conjunct in &join_desc.eq_join_conjuncts {
            probe_exprs.push(Expr::from_desc(&conjunct.left)?);
            build_exprs.push(Expr::from_desc(&conjunct.right)?);
        }
        Ok(Self {
            join_op: join_desc.join_op,
            probe_exprs,
            build_exprs,
            build_schema: None,
            build_rows: Vec::new(),
            build_index: HashMap::new(),
            probe_chunk: None,
            probe_eos: false,
            build_rows_counter: None,
            probe_rows_counter: None,
        })
    }

    pub(crate) fn prepare(
        &mut self,
        _state: &RuntimeState,
        base: &mut ExecNodeBase,
        children: &mut [ExecNode],
    ) -> Result<()> {
        self.build_schema = Some(children[1].schema());
        self.build_rows_counter =
            Some(base.runtime_profile().add_counter("BuildRows", CounterUnit::Unit));
        self.probe_rows_counter =
            Some(base.runtime_profile().add_counter("ProbeRows", CounterUnit::Unit));
        Ok(())
    }

    pub(crate) fn open(
        &mut self,
        state: &RuntimeState,
        base: &mut ExecNodeBase,
        children: &mut [ExecNode],
    ) -> Result<()> {
        let (probe_child, build_child) = split_children(children)?;
        build_child.open(state)?;

        let mut scratch = Chunk::empty(build_child.schema())?;
        let mut build_eos = false;
        while pull_child_chunk(build_child, state, &mut scratch, &mut build_eos)? {
            base.track_memory(scratch.memory_usage())?;
            for row in 0..scratch.len() {
                let key: Vec<Datum> = self
                    .build_exprs
                    .iter()
                    .map(|e| e.evaluate(&scratch, row))
                    .collect::<Result<_>>()?;
                let index = self.build_rows.len();
                self.build_rows.push(scratch.row_datums(row)?);
                // Null keys never match; keep the row (for row storage) but
                // leave it out of the index.
                if !key.iter().any(Datum::is_null) {
                    self.build_index.entry(key).or_default().push(index);
                }
            }
        }
        if let Some(counter) = self.build_rows_counter.as_ref() {
            counter.update(self.build_rows.len() as i64);
        }

        probe_child.open(state)?;
        self.probe_chunk = Some(Chunk::empty(probe_child.schema())?);
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
        let build_schema = self
            .build_schema
            .clone()
            .ok_or_else(|| Status::internal_error("hash join not prepared"))?;
        let build_width = build_schema.fields().len();
        loop {
            if self.probe_eos {
                chunk.reset();
                *eos = true;
                return Ok(());
            }
            let probe_chunk = self
                .probe_chunk
                .as_mut()
                .ok_or_else(|| Status::internal_error("hash join not opened"))?;
            if !pull_child_chunk(&mut children[0], state, probe_chunk, &mut self.probe_eos)? {
                continue;
            }
            if let Some(counter) = self.probe_rows_counter.as_ref() {
                counter.update(probe_chunk.len() as i64);
            }

            let mut probe_indices: Vec<u32> = Vec::new();
            let mut matched_rows: Vec<Vec<Datum>> = Vec::new();
            for row in 0..probe_chunk.len() {
                let key: Vec<Datum> = self
                    .probe_exprs
                    .iter()
                    .map(|e| e.evaluate(probe_chunk, row))
                    .collect::<Result<_>>()?;
                let matches = if key.iter().any(Datum::is_null) {
                    None
                } else {
                    self.build_index.get(&key)
                };
                match matches {
                    Some(indices) => {
                        for build_idx in indices {
                            probe_indices.push(row as u32);
                            matched_rows.push(self.build_rows[*build_idx].clone());
                        }
                    }
                    None => {
                        if self.join_op == JoinOp::LeftOuterJoin {
                            probe_indices.push(row as u32);
                            matched_rows.push(vec![Datum::Null; build_width]);
                        }
                    }
                }
            }
            if probe_indices.is_empty() {
                continue;
            }

            let probe_taken = probe_chunk.take(&probe_indices)?;
            let build_chunk = Chunk::from_rows(build_schema.clone(), &matched_rows)?;
            *chunk = Chunk::compose(base.schema(), &[&probe_taken, &build_chunk])?;
            return Ok(());
        }
    }

    pub(crate) fn close(&mut self, _state: &RuntimeState, _base: &mut ExecNodeBase) {
        self.build_rows.clear();
        self.build_index.clear();
        self.probe_chunk = None;
    }
}

fn split_children(children: &mut [ExecNode]) -> Result<(&mut ExecNode, &mut ExecNode)> {
    match children {
        [probe, build] => Ok((probe, build)),
        _ => Err(Status::internal_error("join expects exactly two children")),
    }
}
