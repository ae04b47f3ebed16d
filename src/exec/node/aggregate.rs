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
use crate::exec::node::{ExecNode, ExecNodeBase, pull_child_chunk};
use crate::plan::{AggFunction, PlanNodeDesc};
use crate::runtime::profile::{CounterRef, CounterUnit};
use crate::runtime::runtime_state::RuntimeState;

/// Accumulator for one aggregate function in one group.
#[derive(Clone, Debug)]
pub(crate) enum AccState {
    Count(i64),
    Sum(Option<Datum>),
    Min(Option<Datum>),
    Max(Option<Datum>),
    Avg { sum: f64, count: i64 },
}

impl AccState {
    pub(crate) fn new(function: AggFunction) -> Self {
        match function {
            AggFunction::Count => AccState::Count(0),
            AggFunction::Sum => AccState::Sum(None),
            AggFunction::Min => AccState::Min(None),
            AggFunction::Max => AccState::Max(None),
            AggFunction::Avg => AccState::Avg { sum: 0.0, count: 0 },
        }
    }

    /// Feed one input value; `None` marks COUNT(*), which counts rows.
    pub(crate) fn update(&mut self, value: Option<&Datum>) -> Result<()> {
        match self {
            AccState::Count(count) => match value {
                None => *count += 1,
                Some(datum) if !datum.is_null() => *count += 1,
                Some(_) => {}
            },
            AccState::Sum(acc) => {
                if let Some(datum) = value {
                    if !datum.is_null() {
                        *acc = Some(match acc.take() {
                            None => datum.clone(),
                            Some(current) => add_datums(&current, datum)?,
                        });
                    }
                }
            }
            AccState::Min(acc) => {
                if let Some(datum) = value {
                    if !datum.is_null() {
                        let replace = match acc.as_ref() {
                            None => true,
                            Some(current) => datum < current,
                        };
                        if replace {
                            *acc = Some(datum.clone());
                        }
                    }
                }
            }
            AccState::Max(acc) => {
                if let Some(datum) = value {
                    if !datum.is_null() {
                        let replace = match acc.as_ref() {
                            None => true,
                            Some(current) => datum > current,
                        };
                        if replace {
                            *acc = Some(datum.clone());
                        }
                    }
                }
            }
            AccState::Avg { sum, count } => {
                if let Some(datum) = value {
                    match datum {
                        Datum::Null => {}
                        Datum::Int(v) => {
                            *sum += *v as f64;
                            *count += 1;
                        }
                        Datum::Float(v) => {
                            *sum += v;
                            *count += 1;
                        }
                        other => {
                            return Err(Status::invalid_argument(format!(
                                "AVG over non-numeric datum {:?}",
                                other
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn finalize(&self) -> Datum {
        match self {
            AccState::Count(count) => Datum::Int(*count),
            AccState::Sum(acc) | AccState::Min(acc) | AccState::Max(acc) => {
                acc.clone().unwrap_or(Datum::Null)
            }
            AccState::Avg { sum, count } => {
                if *count == 0 {
                    Datum::Null
                } else {
                    Datum::Float(sum / *count as f64)
                }
            }
        }
    }
}

fn add_datums(a: &Datum, b: &Datum) -> Result<Datum> {
    match (a, b) {
        (Datum::Int(x), Datum::Int(y)) => Ok(Datum::Int(x.wrapping_add(*y))),
        (Datum::Float(x), Datum::Float(y)) => Ok(Datum::Float(x + y)),
        (Datum::Int(x), Datum::Float(y)) => Ok(Datum::Float(*x as f64 + y)),
        (Datum::Float(x), Datum::Int(y)) => Ok(Datum::Float(x + *y as f64)),
        _ => Err(Status::invalid_argument(format!(
            "SUM over non-numeric datums {:?} and {:?}",
            a, b
        ))),
    }
}

pub(crate) struct AggSpec {
    pub(crate) function: AggFunction,
    pub(crate) input: Option<Expr>,
}

/// Hash aggregation. The child is drained at open; groups are emitted in
/// insertion order. Output rows hold grouping keys first, then aggregate
/// results, matching the aggregation tuple's slot order.
pub struct AggregationNode {
    grouping: Vec<Expr>,
    aggs: Vec<AggSpec>,
    streaming_passthrough: bool,
    group_keys: Vec<Vec<Datum>>,
    group_states: Vec<Vec<AccState>>,
    group_index: HashMap<Vec<Datum>, usize>,
    cursor: usize,
    child_eos: bool,
    input_rows_counter: Option<CounterRef>,
}

impl AggregationNode {
    pub fn from_desc(desc: &PlanNodeDesc) -> Result<Self> {
        let agg_desc = desc.agg_node.as_ref().ok_or_else(|| {
            Status::invalid_argument("AGGREGATION_NODE missing aggregation descriptor")
        })?;
        let grouping = Expr::from_descs(&agg_desc.grouping_exprs)?;
        let mut aggs = Vec::with_capacity(agg_desc.aggregate_functions.len());
        for agg in &agg_desc.aggregate_functions {
            let input = agg.child.as_ref().map(Expr::from_desc).transpose()?;
            if input.is_none() && agg.function != AggFunction::Count {
                return Err(Status::invalid_argument(format!(
                    "{:?} requires an input expression",
                    agg.function
                )));
            }
            aggs.push(AggSpec {
                function: agg.function,
                input,
            });
        }
        Ok(Self {
            grouping,
            aggs,
            streaming_passthrough: false,
            group_keys: Vec::new(),
            group_states: Vec::new(),
            group_index: HashMap::new(),
            cursor: 0,
            child_eos: false,
            input_rows_counter: None,
        })
    }

    /// Planner fast path: input chunks already match the output layout and
    /// stream through untouched.
    pub fn enable_streaming_passthrough(&mut self) {
        self.streaming_passthrough = true;
    }

    pub fn streaming_passthrough(&self) -> bool {
        self.streaming_passthrough
    }

    pub(crate) fn prepare(
        &mut self,
        _state: &RuntimeState,
        base: &mut ExecNodeBase,
        _children: &mut [ExecNode],
    ) -> Result<()> {
        self.input_rows_counter =
            Some(base.runtime_profile().add_counter("InputRows", CounterUnit::Unit));
        Ok(())
    }

    pub(crate) fn open(
        &mut self,
        state: &RuntimeState,
        base: &mut ExecNodeBase,
        children: &mut [ExecNode],
    ) -> Result<()> {
        children[0].open(state)?;
        if self.streaming_passthrough {
            return Ok(());
        }
        let mut scratch = Chunk::empty(children[0].schema())?;
        let mut child_eos = false;
        while pull_child_chunk(&mut children[0], state, &mut scratch, &mut child_eos)? {
            base.track_memory(scratch.memory_usage())?;
            if let Some(counter) = self.input_rows_counter.as_ref() {
                counter.update(scratch.len() as i64);
            }
            for row in 0..scratch.len() {
                let key: Vec<Datum> = self
                    .grouping
                    .iter()
                    .map(|e| e.evaluate(&scratch, row))
                    .collect::<Result<_>>()?;
                let group_idx = match self.group_index.get(&key) {
                    Some(idx) => *idx,
                    None => {
                        let idx = self.group_keys.len();
                        self.group_keys.push(key.clone());
                        self.group_states.push(
                            self.aggs.iter().map(|a| AccState::new(a.function)).collect(),
                        );
                        self.group_index.insert(key, idx);
                        idx
                    }
                };
                let states = &mut self.group_states[group_idx];
                for (agg, acc) in self.aggs.iter().zip(states.iter_mut()) {
                    match agg.input.as_ref() {
                        Some(expr) => acc.update(Some(&expr.evaluate(&scratch, row)?))?,
                        None => acc.update(None)?,
                    }
                }
            }
        }
        // Aggregation without grouping always yields one row, even on
        // empty input (e.g. COUNT(*) = 0).
        if self.grouping.is_empty() && self.group_keys.is_empty() {
            self.group_keys.push(Vec::new());
            self.group_states
                .push(self.aggs.iter().map(|a| AccState::new(a.function)).collect());
        }
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
        if self.streaming_passthrough {
            if self.child_eos {
                chunk.reset();
                *eos = true;
                return Ok(());
            }
            children[0].get_next(state, chunk, &mut self.child_eos)?;
            if self.child_eos && chunk.is_empty() {
                *eos = true;
            }
            return Ok(());
        }

        if self.cursor >= self.group_keys.len() {
            chunk.reset();
            *eos = true;
            return Ok(());
        }
        let end = (self.cursor + state.batch_size()).min(self.group_keys.len());
        let mut rows = Vec::with_capacity(end - self.cursor);
        for idx in self.cursor..end {
            let mut row = self.group_keys[idx].clone();
            for acc in &self.group_states[idx] {
                row.push(acc.finalize());
            }
            rows.push(row);
        }
        *chunk = Chunk::from_rows(base.schema(), &rows)?;
        self.cursor = end;
        Ok(())
    }

    pub(crate) fn close(&mut self, _state: &RuntimeState, _base: &mut ExecNodeBase) {
        self.group_keys.clear();
        self.group_states.clear();
        self.group_index.clear();
    }
}
