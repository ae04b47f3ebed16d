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
use std::cmp::Ordering;

use crate::common::status::{Result, Status};
use crate::exec::chunk::{Chunk, Datum};
use crate::exec::expr::Expr;
use crate::exec::node::{ExecNode, ExecNodeBase, pull_child_chunk};
use crate::plan::{PlanNodeDesc, SortNodeDesc};
use crate::runtime::runtime_state::RuntimeState;

/// Ordering spec shared by SORT_NODE and TOP_N_NODE.
pub(crate) struct SortKey {
    exprs: Vec<Expr>,
    is_asc: Vec<bool>,
    nulls_first: Vec<bool>,
}

impl SortKey {
    pub(crate) fn from_desc(desc: &SortNodeDesc) -> Result<Self> {
        if desc.ordering_exprs.is_empty() {
            return Err(Status::invalid_argument("sort without ordering exprs"));
        }
        if desc.ordering_exprs.len() != desc.is_asc_order.len() {
            return Err(Status::invalid_argument(
                "ordering exprs and asc flags differ in length",
            ));
        }
        let exprs = Expr::from_descs(&desc.ordering_exprs)?;
        let mut nulls_first = desc.nulls_first.clone();
        nulls_first.resize(exprs.len(), true);
        Ok(Self {
            exprs,
            is_asc: desc.is_asc_order.clone(),
            nulls_first,
        })
    }

    fn eval(&self, chunk: &Chunk, row: usize) -> Result<Vec<Datum>> {
        self.exprs.iter().map(|e| e.evaluate(chunk, row)).collect()
    }

    fn compare(&self, a: &[Datum], b: &[Datum]) -> Ordering {
        for i in 0..self.exprs.len() {
            let (lhs, rhs) = (&a[i], &b[i]);
            let ord = match (lhs.is_null(), rhs.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => {
                    if self.nulls_first[i] {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    }
                }
                (false, true) => {
                    if self.nulls_first[i] {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    }
                }
                (false, false) => {
                    let ord = lhs.cmp(rhs);
                    if self.is_asc[i] { ord } else { ord.reverse() }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Drain the child completely and return its rows in key order.
pub(crate) fn drain_and_sort(
    state: &RuntimeState,
    base: &mut ExecNodeBase,
    child: &mut ExecNode,
    key: &SortKey,
) -> Result<Vec<Vec<Datum>>> {
    let mut scratch = Chunk::empty(child.schema())?;
    let mut child_eos = false;
    let mut entries: Vec<(Vec<Datum>, Vec<Datum>)> = Vec::new();
    while pull_child_chunk(child, state, &mut scratch, &mut child_eos)? {
        base.track_memory(scratch.memory_usage())?;
        for row in 0..scratch.len() {
            let keys = key.eval(&scratch, row)?;
            entries.push((keys, scratch.row_datums(row)?));
        }
    }
    entries.sort_by(|a, b| key.compare(&a.0, &b.0));
    Ok(entries.into_iter().map(|(_, row)| row).collect())
}

/// Full in-memory sort. Consumes the child at open, emits in order.
pub struct SortNode {
    key: SortKey,
    sorted_rows: Vec<Vec<Datum>>,
    cursor: usize,
}

impl SortNode {
    pub fn from_desc(desc: &PlanNodeDesc) -> Result<Self> {
        let sort_desc = desc
            .sort_node
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("SORT_NODE missing sort descriptor"))?;
        Ok(Self {
            key: SortKey::from_desc(sort_desc)?,
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
        self.sorted_rows = drain_and_sort(state, base, &mut children[0], &self.key)?;
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

/// Emit one batch from a sorted row store, advancing the cursor.
pub(crate) fn emit_sorted_rows(
    state: &RuntimeState,
    base: &mut ExecNodeBase,
    rows: &[Vec<Datum>],
    cursor: &mut usize,
    chunk: &mut Chunk,
    eos: &mut bool,
) -> Result<()> {
    if *cursor >= rows.len() {
        chunk.reset();
        *eos = true;
        return Ok(());
    }
    let end = (*cursor + state.batch_size()).min(rows.len());
    *chunk = Chunk::from_rows(base.schema(), &rows[*cursor..end])?;
    *cursor = end;
    Ok(())
}
