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
//! Operator tree of one plan fragment.
//!
//! Nodes share an [`ExecNodeBase`] record (id, layout, limit, profile,
//! memory tracking) and keep per-operator state in a tagged
//! [`ExecNodeKind`] variant. The tree is strict: a parent owns its
//! children, and every node moves through
//! constructed → prepared → opened → draining → closed, with `close` safe
//! from any state.

pub mod aggregate;
pub mod analytic;
pub mod cross_join;
pub mod empty_set;
pub mod exchange;
pub mod hash_join;
pub mod olap_scan;
pub mod select;
pub mod sort;
pub mod topn;
pub mod union_all;

use arrow::datatypes::SchemaRef;

use crate::common::status::{Result, Status};
use crate::exec::chunk::Chunk;
use crate::exec::expr::{Expr, filter_chunk};
use crate::exec::node::aggregate::AggregationNode;
use crate::exec::node::analytic::AnalyticNode;
use crate::exec::node::cross_join::CrossJoinNode;
use crate::exec::node::empty_set::EmptySetNode;
use crate::exec::node::exchange::ExchangeNode;
use crate::exec::node::hash_join::HashJoinNode;
use crate::exec::node::olap_scan::OlapScanNode;
use crate::exec::node::select::SelectNode;
use crate::exec::node::sort::SortNode;
use crate::exec::node::topn::TopNNode;
use crate::exec::node::union_all::UnionAllNode;
use crate::plan::{PlanNodeDesc, PlanNodeType, PlanTree};
use crate::runtime::descriptors::{DescriptorTbl, RowDescriptor};
use crate::runtime::mem_tracker::MemTracker;
use crate::runtime::profile::{CounterRef, CounterUnit, RuntimeProfile};
use crate::runtime::query_statistics::QueryStatistics;
use crate::runtime::runtime_state::RuntimeState;

/// Shared state and behavior of every plan node.
pub struct ExecNodeBase {
    id: i32,
    node_type: PlanNodeType,
    limit: i64,
    num_rows_returned: i64,
    row_descriptor: RowDescriptor,
    schema: SchemaRef,
    conjuncts: Vec<Expr>,
    profile: RuntimeProfile,
    rows_returned_counter: CounterRef,
    mem_tracker: Option<std::sync::Arc<MemTracker>>,
    tracked_bytes: i64,
    prepared: bool,
    opened: bool,
    closed: bool,
}

impl ExecNodeBase {
    fn new(desc: &PlanNodeDesc, desc_tbl: &DescriptorTbl) -> Result<Self> {
        let row_descriptor = RowDescriptor::from_wire(&desc.row_tuples)?;
        let schema = row_descriptor.arrow_schema(desc_tbl)?;
        let conjuncts = Expr::from_descs(&desc.conjuncts)?;
        let profile = RuntimeProfile::new(format!(
            "{} (id={})",
            node_type_name(desc.node_type),
            desc.node_id
        ));
        let rows_returned_counter = profile.add_counter("RowsReturned", CounterUnit::Unit);
        Ok(Self {
            id: desc.node_id,
            node_type: desc.node_type,
            limit: desc.limit,
            num_rows_returned: 0,
            row_descriptor,
            schema,
            conjuncts,
            profile,
            rows_returned_counter,
            mem_tracker: None,
            tracked_bytes: 0,
            prepared: false,
            opened: false,
            closed: false,
        })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn node_type(&self) -> PlanNodeType {
        self.node_type
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn row_descriptor(&self) -> &RowDescriptor {
        &self.row_descriptor
    }

    pub fn runtime_profile(&self) -> &RuntimeProfile {
        &self.profile
    }

    pub(crate) fn mem_tracker(&self) -> Option<&std::sync::Arc<MemTracker>> {
        self.mem_tracker.as_ref()
    }

    fn prepare(&mut self, state: &RuntimeState) -> Result<()> {
        if self.prepared {
            return Err(Status::internal_error("node already prepared"));
        }
        let instance_tracker = state.instance_mem_tracker()?;
        self.mem_tracker = Some(MemTracker::new_child(
            format!("{} (id={})", node_type_name(self.node_type), self.id),
            instance_tracker,
        ));
        self.prepared = true;
        Ok(())
    }

    fn reached_limit(&self) -> bool {
        self.limit >= 0 && self.num_rows_returned >= self.limit
    }

    fn apply_limit(&self, chunk: &mut Chunk, eos: &mut bool) {
        if self.limit < 0 {
            return;
        }
        let remaining = (self.limit - self.num_rows_returned).max(0) as usize;
        if remaining == 0 {
            chunk.reset();
            *eos = true;
        } else if chunk.len() > remaining {
            // Trim the overflow; eos is reported by the next call, keeping
            // the empty-at-eos contract.
            chunk.truncate(remaining);
        }
    }

    /// Account bytes the node materializes against the instance budget.
    pub(crate) fn track_memory(&mut self, bytes: usize) -> Result<()> {
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.try_consume(bytes)?;
            self.tracked_bytes += bytes;
        }
        Ok(())
    }

    fn release_memory(&mut self) {
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.release(self.tracked_bytes);
        }
        self.tracked_bytes = 0;
    }
}

/// Per-operator state of a plan node.
pub enum ExecNodeKind {
    OlapScan(OlapScanNode),
    Exchange(ExchangeNode),
    UnionAll(UnionAllNode),
    HashJoin(HashJoinNode),
    CrossJoin(CrossJoinNode),
    Aggregation(AggregationNode),
    Analytic(AnalyticNode),
    Sort(SortNode),
    TopN(TopNNode),
    Select(SelectNode),
    EmptySet(EmptySetNode),
}

pub struct ExecNode {
    pub(crate) base: ExecNodeBase,
    pub(crate) kind: ExecNodeKind,
    pub(crate) children: Vec<ExecNode>,
}

impl std::fmt::Debug for ExecNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecNode")
            .field("id", &self.base.id())
            .field("node_type", &self.base.node_type())
            .field("children", &self.children)
            .finish()
    }
}

impl ExecNode {
    /// Build the operator tree from the coordinator's flat preorder list.
    pub fn create_tree(plan: &PlanTree, desc_tbl: &DescriptorTbl) -> Result<ExecNode> {
        if plan.nodes.is_empty() {
            return Err(Status::invalid_argument("plan tree has no nodes"));
        }
        let (root, consumed) = Self::create_tree_helper(&plan.nodes, 0, desc_tbl)?;
        if consumed != plan.nodes.len() {
            return Err(Status::invalid_argument(format!(
                "plan tree has {} trailing nodes",
                plan.nodes.len() - consumed
            )));
        }
        Ok(root)
    }

    fn create_tree_helper(
        nodes: &[PlanNodeDesc],
        index: usize,
        desc_tbl: &DescriptorTbl,
    ) -> Result<(ExecNode, usize)> {
        let desc = nodes
            .get(index)
            .ok_or_else(|| Status::invalid_argument("plan tree is truncated"))?;
        let mut next = index + 1;
        let mut children = Vec::with_capacity(desc.num_children.max(0) as usize);
        for _ in 0..desc.num_children {
            let (child, consumed) = Self::create_tree_helper(nodes, next, desc_tbl)?;
            children.push(child);
            next = consumed;
        }
        let node = Self::create_node(desc, desc_tbl, children)
            .map_err(|e| e.with_node(desc.node_id))?;
        Ok((node, next))
    }

    fn create_node(
        desc: &PlanNodeDesc,
        desc_tbl: &DescriptorTbl,
        children: Vec<ExecNode>,
    ) -> Result<ExecNode> {
        check_child_count(desc, children.len())?;
        let base = ExecNodeBase::new(desc, desc_tbl)?;
        let kind = match desc.node_type {
            PlanNodeType::OlapScanNode => ExecNodeKind::OlapScan(OlapScanNode::from_desc(desc)?),
            PlanNodeType::ExchangeNode => ExecNodeKind::Exchange(ExchangeNode::new()),
            PlanNodeType::UnionNode => ExecNodeKind::UnionAll(UnionAllNode::new()),
            PlanNodeType::HashJoinNode => ExecNodeKind::HashJoin(HashJoinNode::from_desc(desc)?),
            PlanNodeType::CrossJoinNode => ExecNodeKind::CrossJoin(CrossJoinNode::new()),
            PlanNodeType::AggregationNode => {
                ExecNodeKind::Aggregation(AggregationNode::from_desc(desc)?)
            }
            PlanNodeType::AnalyticEvalNode => {
                ExecNodeKind::Analytic(AnalyticNode::from_desc(desc)?)
            }
            PlanNodeType::SortNode => ExecNodeKind::Sort(SortNode::from_desc(desc)?),
            PlanNodeType::TopNNode => ExecNodeKind::TopN(TopNNode::from_desc(desc)?),
            PlanNodeType::SelectNode => ExecNodeKind::Select(SelectNode::new()),
            PlanNodeType::EmptySetNode => ExecNodeKind::EmptySet(EmptySetNode::new()),
        };
        // Wire child profiles under the parent node's subtree.
        for child in &children {
            base.profile.add_child(child.base.profile.clone());
        }
        Ok(ExecNode {
            base,
            kind,
            children,
        })
    }

    pub fn id(&self) -> i32 {
        self.base.id
    }

    pub fn node_type(&self) -> PlanNodeType {
        self.base.node_type
    }

    pub fn runtime_profile(&self) -> &RuntimeProfile {
        &self.base.profile
    }

    pub fn row_descriptor(&self) -> &RowDescriptor {
        &self.base.row_descriptor
    }

    pub fn schema(&self) -> SchemaRef {
        self.base.schema()
    }

    pub fn children(&self) -> &[ExecNode] {
        &self.children
    }

    /// Prepare post-order: children first, then this node.
    pub fn prepare(&mut self, state: &RuntimeState) -> Result<()> {
        for child in &mut self.children {
            child.prepare(state)?;
        }
        let ExecNode {
            base,
            kind,
            children,
        } = self;
        base.prepare(state).map_err(|e| e.with_node(base.id))?;
        let result = match kind {
            ExecNodeKind::OlapScan(node) => node.prepare(state, base),
            ExecNodeKind::Exchange(node) => node.prepare(state, base),
            ExecNodeKind::HashJoin(node) => node.prepare(state, base, children),
            ExecNodeKind::Aggregation(node) => node.prepare(state, base, children),
            ExecNodeKind::Analytic(node) => node.prepare(state, base, children),
            _ => Ok(()),
        };
        result.map_err(|e| e.with_node(base.id))
    }

    /// Open this node and whatever children its semantics require.
    pub fn open(&mut self, state: &RuntimeState) -> Result<()> {
        if !self.base.prepared {
            return Err(Status::internal_error("open called on unprepared node"));
        }
        state.check_cancelled()?;
        let _timer = self.base.profile.scoped_timer(crate::runtime::profile::TOTAL_TIME_COUNTER);
        let ExecNode {
            base,
            kind,
            children,
        } = self;
        base.opened = true;
        match kind {
            ExecNodeKind::OlapScan(node) => node.open(state, base),
            ExecNodeKind::Exchange(node) => node.open(state, base),
            ExecNodeKind::UnionAll(node) => node.open(state, base, children),
            ExecNodeKind::HashJoin(node) => node.open(state, base, children),
            ExecNodeKind::CrossJoin(node) => node.open(state, base, children),
            ExecNodeKind::Aggregation(node) => node.open(state, base, children),
            ExecNodeKind::Analytic(node) => node.open(state, base, children),
            ExecNodeKind::Sort(node) => node.open(state, base, children),
            ExecNodeKind::TopN(node) => node.open(state, base, children),
            ExecNodeKind::Select(node) => node.open(state, base, children),
            ExecNodeKind::EmptySet(node) => node.open(state, base),
        }
    }

    /// Fill `chunk` with the next rows. Contract per call: non-empty with
    /// `eos=false`, empty with `eos=false` (caller retries), or empty with
    /// `eos=true` (terminal).
    pub fn get_next(
        &mut self,
        state: &RuntimeState,
        chunk: &mut Chunk,
        eos: &mut bool,
    ) -> Result<()> {
        if !self.base.opened {
            return Err(Status::internal_error("get_next called on unopened node"));
        }
        state.check_cancelled()?;
        let _timer = self.base.profile.scoped_timer(crate::runtime::profile::TOTAL_TIME_COUNTER);
        if self.base.reached_limit() {
            chunk.reset();
            *eos = true;
            return Ok(());
        }
        let ExecNode {
            base,
            kind,
            children,
        } = self;
        match kind {
            ExecNodeKind::OlapScan(node) => node.get_next(state, base, chunk, eos),
            ExecNodeKind::Exchange(node) => node.get_next(state, base, chunk, eos),
            ExecNodeKind::UnionAll(node) => node.get_next(state, base, children, chunk, eos),
            ExecNodeKind::HashJoin(node) => node.get_next(state, base, children, chunk, eos),
            ExecNodeKind::CrossJoin(node) => node.get_next(state, base, children, chunk, eos),
            ExecNodeKind::Aggregation(node) => node.get_next(state, base, children, chunk, eos),
            ExecNodeKind::Analytic(node) => node.get_next(state, base, children, chunk, eos),
            ExecNodeKind::Sort(node) => node.get_next(state, base, children, chunk, eos),
            ExecNodeKind::TopN(node) => node.get_next(state, base, children, chunk, eos),
            ExecNodeKind::Select(node) => node.get_next(state, base, children, chunk, eos),
            ExecNodeKind::EmptySet(node) => node.get_next(state, base, chunk, eos),
        }?;
        if !base.conjuncts.is_empty() && !chunk.is_empty() {
            *chunk = filter_chunk(&base.conjuncts, chunk)?;
        }
        base.apply_limit(chunk, eos);
        if !chunk.is_empty() {
            base.num_rows_returned += chunk.len() as i64;
            base.rows_returned_counter.update(chunk.len() as i64);
        }
        Ok(())
    }

    /// Close this node and its children. Safe from any state, idempotent,
    /// never fails hard.
    pub fn close(&mut self, state: &RuntimeState) {
        if self.base.closed {
            return;
        }
        self.base.closed = true;
        let ExecNode {
            base,
            kind,
            children,
        } = self;
        match kind {
            ExecNodeKind::OlapScan(node) => node.close(state, base),
            ExecNodeKind::Exchange(node) => node.close(state, base),
            ExecNodeKind::HashJoin(node) => node.close(state, base),
            ExecNodeKind::CrossJoin(node) => node.close(state, base),
            ExecNodeKind::Aggregation(node) => node.close(state, base),
            ExecNodeKind::Analytic(node) => node.close(state, base),
            ExecNodeKind::Sort(node) => node.close(state, base),
            ExecNodeKind::TopN(node) => node.close(state, base),
            _ => {}
        }
        for child in children {
            child.close(state);
        }
        base.release_memory();
    }

    /// Collect nodes matching a type tag, preorder.
    pub fn collect_nodes<'a>(&'a self, node_type: PlanNodeType, out: &mut Vec<&'a ExecNode>) {
        if self.base.node_type == node_type {
            out.push(self);
        }
        for child in &self.children {
            child.collect_nodes(node_type, out);
        }
    }

    /// Collect every scan-node subtype, preorder.
    pub fn collect_scan_nodes<'a>(&'a self, out: &mut Vec<&'a ExecNode>) {
        self.collect_nodes(PlanNodeType::OlapScanNode, out);
    }

    /// Preorder mutable visitor over every node's base and kind.
    pub fn for_each_node_mut(
        &mut self,
        f: &mut dyn FnMut(&mut ExecNodeBase, &mut ExecNodeKind) -> Result<()>,
    ) -> Result<()> {
        f(&mut self.base, &mut self.kind)?;
        for child in &mut self.children {
            child.for_each_node_mut(f)?;
        }
        Ok(())
    }

    /// Aggregate leaf counters into the query-statistics accumulator.
    pub fn collect_query_statistics(&self, stats: &mut QueryStatistics) {
        if matches!(self.kind, ExecNodeKind::OlapScan(_)) {
            stats.add_scan_rows(self.base.profile.counter_value(olap_scan::RAW_ROWS_READ_COUNTER));
            stats.add_scan_bytes(self.base.profile.counter_value(olap_scan::BYTES_READ_COUNTER));
        }
        for child in &self.children {
            child.collect_query_statistics(stats);
        }
    }

    /// Planner hint: an aggregation directly over a scan whose layout
    /// already matches the aggregation output can stream chunks through
    /// without rebuilding them.
    pub fn try_do_aggregate_serde_improve(&mut self) {
        let ExecNode {
            base,
            kind,
            children,
        } = self;
        if let ExecNodeKind::Aggregation(agg) = kind {
            if children.len() == 1
                && matches!(children[0].kind, ExecNodeKind::OlapScan(_))
                && children[0].base.schema == base.schema
            {
                agg.enable_streaming_passthrough();
            }
        }
        for child in children {
            child.try_do_aggregate_serde_improve();
        }
    }
}

fn check_child_count(desc: &PlanNodeDesc, actual: usize) -> Result<()> {
    let expected: Option<usize> = match desc.node_type {
        PlanNodeType::OlapScanNode
        | PlanNodeType::ExchangeNode
        | PlanNodeType::EmptySetNode => Some(0),
        PlanNodeType::HashJoinNode | PlanNodeType::CrossJoinNode => Some(2),
        PlanNodeType::AggregationNode
        | PlanNodeType::AnalyticEvalNode
        | PlanNodeType::SortNode
        | PlanNodeType::TopNNode
        | PlanNodeType::SelectNode => Some(1),
        PlanNodeType::UnionNode => None,
    };
    match expected {
        Some(expected) if expected != actual => Err(Status::invalid_argument(format!(
            "{} expects {} children, got {}",
            node_type_name(desc.node_type),
            expected,
            actual
        ))),
        None if actual == 0 => Err(Status::invalid_argument(
            "UNION_NODE expects at least one child",
        )),
        _ => Ok(()),
    }
}

pub(crate) fn node_type_name(node_type: PlanNodeType) -> &'static str {
    match node_type {
        PlanNodeType::OlapScanNode => "OLAP_SCAN_NODE",
        PlanNodeType::ExchangeNode => "EXCHANGE_NODE",
        PlanNodeType::UnionNode => "UNION_NODE",
        PlanNodeType::HashJoinNode => "HASH_JOIN_NODE",
        PlanNodeType::CrossJoinNode => "CROSS_JOIN_NODE",
        PlanNodeType::AggregationNode => "AGGREGATION_NODE",
        PlanNodeType::AnalyticEvalNode => "ANALYTIC_EVAL_NODE",
        PlanNodeType::SortNode => "SORT_NODE",
        PlanNodeType::TopNNode => "TOP_N_NODE",
        PlanNodeType::SelectNode => "SELECT_NODE",
        PlanNodeType::EmptySetNode => "EMPTY_SET_NODE",
    }
}

/// Pull from a child until it yields rows or reports end-of-stream.
/// Returns true when `chunk` holds rows.
pub(crate) fn pull_child_chunk(
    child: &mut ExecNode,
    state: &RuntimeState,
    chunk: &mut Chunk,
    child_eos: &mut bool,
) -> Result<bool> {
    while !*child_eos {
        chunk.reset();
        child.get_next(state, chunk, child_eos)?;
        if !chunk.is_empty() {
            return Ok(true);
        }
    }
    chunk.reset();
    Ok(false)
}
