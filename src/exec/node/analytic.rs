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

use crate::common::status::{Result, Status};
use crate::exec::chunk::{Chunk, Datum};
use crate::exec::expr::Expr;
use crate::exec::node::aggregate::AccState;
use crate::exec::node::{ExecNode, ExecNodeBase, pull_child_chunk};
use crate::plan::{AggFunction, PlanNodeDesc};
use crate::runtime::runtime_state::RuntimeState;

/// Window evaluation over an unbounded partition frame: each input row is
/// extended with one aggregate computed over its whole partition. Output
/// rows keep the child's column order and append the window result, in
/// line with the analytic tuple holding the single output slot.
pub struct AnalyticNode {
    partition_exprs: Vec<Expr>,
    function: AggFunction,
    fn_input: Option<Expr>,
    out_rows: Vec<Vec<Datum>>,
    cursor: usize,
}

impl AnalyticNode {
    pub fn from_desc(desc: &PlanNodeDesc) -> Result<Self> {
        let analytic_desc = desc.analytic_node.as_ref().ok_or_else(|| {
            Status::invalid_argument("ANALYTIC_EVAL_NODE missing analytic descriptor")
        })?;
        let partition_exprs = Expr::from_descs(&analytic_desc.partition_exprs)?;
        let fn_input = analytic_desc
            .window_function
            .child
            .as_ref()
            .map(Expr::from_desc)
            .transpose()?;
        if fn_input.is_none() && analytic_desc.window_function.function != AggFunction::Count {
            return Err(Status::invalid_argument(format!(
                "{:?} window requires an input expression",
                analytic_desc.window_function.function
            )));
        }
        Ok(Self {
            partition_exprs,
            function: analytic_desc.window_function.function,
            fn_input,
            out_rows: Vec::new(),
            cursor: 0,
        })
    }

    pub(crate) fn prepare(
        &mut self,
        _state: &RuntimeState,
        _base: &mut ExecNodeBase,
        _children: &mut [ExecNode],
    ) -> Result<()> {
        Ok(())
    }

    pub(crate) fn open(
        &mut self,
        state: &RuntimeState,
        base: &mut ExecNodeBase,
        children: &mut [ExecNode],
    ) -> Result<()> {
        children[0].open(state)?;
        let mut scratch = Chunk::empty(children[0].schema())?;
        let mut child_eos = false;

        let mut rows: Vec<Vec<Datum>> = Vec::new();
        let mut partition_of_row: Vec<usize> = Vec::new();
        let mut partition_index: HashMap<Vec<Datum>, usize> = HashMap::new();
        let mut partition_states: Vec<AccState> = Vec::new();

        while pull_child_chunk(&mut children[0], state, &mut scratch, &mut child_eos)? {
            base.track_memory(scratch.memory_usage())?;
            for row in 0..scratch.len() {
                let key: Vec<Datum> = self
                    .partition_exprs
                    .iter()
                    .map(|e| e.evaluate(&scratch, row))
                    .collect::<Result<_>>()?;
                let partition = match partition_index.get(&key) {
                    Some(idx) => *idx,
                    None => {
                        let idx = partition_states.len();
                        partition_states.push(AccState::new(self.function));
                        partition_index.insert(key, idx);
                        idx
                    }
                };
                match self.fn_input.as_ref() {
                    Some(expr) => partition_states[partition]
                        .update(Some(&expr.evaluate(&scratch, row)?))?,
                    None => partition_states[partition].update(None)?,
                }
                rows.push(scratch.row_datums(row)?);
                partition_of_row.push(partition);
            }
        }

        let finalized: Vec<Datum> = partition_states.iter().map(AccState::finalize).collect();
        self.out_rows = rows
            .into_iter()
            .zip(partition_of_row)
            .map(|(mut row, partition)| {
                row.push(finalized[partition].clone());
                row
            })
            .collect();
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
        if self.cursor >= self.out_rows.len() {
            chunk.reset();
            *eos = true;
            return Ok(());
        }
        let end = (self.cursor + state.batch_size()).min(self.out_rows.len());
        *chunk = Chunk::from_rows(base.schema(), &self.out_rows[self.cursor..end])?;
        self.cursor = end;
        Ok(())
    }

    pub(crate) fn close(&mut self, _state: &RuntimeState, _base: &mut ExecNodeBase) {
        self.out_rows.clear();
    }
}
