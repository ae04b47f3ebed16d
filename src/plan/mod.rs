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
//! Coordinator-facing wire model of a fragment execution request.
//!
//! A coordinator compiles a distributed query into fragments and submits one
//! request per fragment instance. The request is fully self-describing: plan
//! tree (flat preorder node list), descriptor table, optional output sink,
//! scan range assignments, and exchange sender counts. The execution layer
//! lowers these descriptions into `exec` types and never hands them to
//! operators directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::common::types::UniqueId;

/// Top-level fragment execution request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecPlanFragmentParams {
    pub query_id: UniqueId,
    #[serde(default)]
    pub query_globals: QueryGlobals,
    #[serde(default)]
    pub query_options: QueryOptions,
    pub params: PlanFragmentExecParams,
    pub fragment: PlanFragment,
    #[serde(default)]
    pub desc_tbl: DescriptorTable,
    #[serde(default)]
    pub backend_num: i32,
    #[serde(default)]
    pub backend_id: Option<i64>,
    #[serde(default)]
    pub import_label: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub load_job_id: Option<i64>,
}

/// Query-scoped constants shared by all fragments of one statement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryGlobals {
    /// Statement submission time, `%Y-%m-%d %H:%M:%S` in `time_zone`.
    #[serde(default)]
    pub now_string: String,
    #[serde(default = "QueryGlobals::default_time_zone")]
    pub time_zone: String,
    #[serde(default)]
    pub load_zero_tolerance: bool,
}

impl QueryGlobals {
    fn default_time_zone() -> String {
        "UTC".to_string()
    }
}

impl Default for QueryGlobals {
    fn default() -> Self {
        Self {
            now_string: String::new(),
            time_zone: Self::default_time_zone(),
            load_zero_tolerance: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    Select,
    Load,
    External,
}

/// Per-query session options forwarded by the coordinator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Memory budget for the query on this backend; <= 0 means the
    /// configured default applies.
    #[serde(default)]
    pub mem_limit: i64,
    #[serde(default = "QueryOptions::default_batch_size")]
    pub batch_size: i32,
    #[serde(default = "QueryOptions::default_true")]
    pub enable_vectorized: bool,
    #[serde(default)]
    pub is_report_success: bool,
    #[serde(default = "QueryOptions::default_query_type")]
    pub query_type: QueryType,
}

impl QueryOptions {
    fn default_batch_size() -> i32 {
        4096
    }

    fn default_true() -> bool {
        true
    }

    fn default_query_type() -> QueryType {
        QueryType::Select
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            mem_limit: 0,
            batch_size: Self::default_batch_size(),
            enable_vectorized: true,
            is_report_success: false,
            query_type: QueryType::Select,
        }
    }
}

/// Instance-specific execution parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanFragmentExecParams {
    pub fragment_instance_id: UniqueId,
    #[serde(default)]
    pub sender_id: i32,
    #[serde(default)]
    pub num_senders: i32,
    /// Expected sender count per exchange node id. A missing entry fails
    /// validation during prepare.
    #[serde(default)]
    pub per_exch_num_senders: HashMap<i32, i32>,
    /// Scan range assignments per scan node id; unlisted scan nodes get
    /// an empty assignment and produce zero rows.
    #[serde(default)]
    pub per_node_scan_ranges: HashMap<i32, Vec<ScanRangeParams>>,
    #[serde(default)]
    pub send_query_statistics_with_every_batch: bool,
    /// Downstream instances fed by this fragment's stream sink.
    #[serde(default)]
    pub destinations: Vec<PlanFragmentDestination>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanFragmentDestination {
    pub fragment_instance_id: UniqueId,
}

/// Opaque handle to one storage slice assigned to a scan node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanRangeParams {
    pub tablet_id: i64,
    #[serde(default)]
    pub version: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanFragment {
    pub plan: PlanTree,
    #[serde(default)]
    pub output_sink: Option<DataSinkDesc>,
    #[serde(default)]
    pub output_exprs: Vec<ExprDesc>,
}

/// Flat preorder encoding of the operator tree, Impala-style: each node
/// carries `num_children` and children follow their parent immediately.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlanTree {
    pub nodes: Vec<PlanNodeDesc>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanNodeType {
    OlapScanNode,
    ExchangeNode,
    UnionNode,
    HashJoinNode,
    CrossJoinNode,
    AggregationNode,
    AnalyticEvalNode,
    SortNode,
    TopNNode,
    SelectNode,
    EmptySetNode,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanNodeDesc {
    pub node_id: i32,
    pub node_type: PlanNodeType,
    #[serde(default)]
    pub num_children: i32,
    /// Row limit, -1 for unlimited.
    #[serde(default = "PlanNodeDesc::no_limit")]
    pub limit: i64,
    /// Tuple ids making up this node's output row.
    pub row_tuples: Vec<i32>,
    #[serde(default)]
    pub conjuncts: Vec<ExprDesc>,
    #[serde(default)]
    pub olap_scan_node: Option<OlapScanNodeDesc>,
    #[serde(default)]
    pub hash_join_node: Option<HashJoinNodeDesc>,
    #[serde(default)]
    pub agg_node: Option<AggregationNodeDesc>,
    #[serde(default)]
    pub analytic_node: Option<AnalyticNodeDesc>,
    #[serde(default)]
    pub sort_node: Option<SortNodeDesc>,
}

impl PlanNodeDesc {
    fn no_limit() -> i64 {
        -1
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OlapScanNodeDesc {
    pub tuple_id: i32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinOp {
    InnerJoin,
    LeftOuterJoin,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HashJoinNodeDesc {
    pub join_op: JoinOp,
    pub eq_join_conjuncts: Vec<EqJoinConjunctDesc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EqJoinConjunctDesc {
    /// Probe-side (left child) expression.
    pub left: ExprDesc,
    /// Build-side (right child) expression.
    pub right: ExprDesc,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggExprDesc {
    pub function: AggFunction,
    /// Aggregated input; None only for COUNT(*).
    #[serde(default)]
    pub child: Option<ExprDesc>,
    /// Output slot in the aggregation tuple.
    pub output_slot_id: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregationNodeDesc {
    pub tuple_id: i32,
    #[serde(default)]
    pub grouping_exprs: Vec<ExprDesc>,
    #[serde(default)]
    pub aggregate_functions: Vec<AggExprDesc>,
    #[serde(default)]
    pub use_streaming_preaggregation: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyticNodeDesc {
    #[serde(default)]
    pub partition_exprs: Vec<ExprDesc>,
    pub window_function: AggExprDesc,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortNodeDesc {
    pub ordering_exprs: Vec<ExprDesc>,
    pub is_asc_order: Vec<bool>,
    #[serde(default)]
    pub nulls_first: Vec<bool>,
    /// Rows skipped before emission; only meaningful for TOP_N.
    #[serde(default)]
    pub offset: i64,
}

/// Expression tree for output exprs, conjuncts, and operator keys.
///
/// The core consumes predicates through this contract only; richer
/// expression evaluation lives outside the fragment execution core.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum ExprDesc {
    SlotRef {
        slot_id: i32,
    },
    IntLiteral {
        value: i64,
    },
    FloatLiteral {
        value: f64,
    },
    StringLiteral {
        value: String,
    },
    BoolLiteral {
        value: bool,
    },
    NullLiteral,
    BinaryPred {
        op: BinaryPredOp,
        left: Box<ExprDesc>,
        right: Box<ExprDesc>,
    },
    IsNullPred {
        negated: bool,
        child: Box<ExprDesc>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryPredOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSinkType {
    DataStreamSink,
    ResultSink,
    OlapTableSink,
    ExportSink,
    MemoryScratchSink,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataSinkDesc {
    pub sink_type: DataSinkType,
    #[serde(default)]
    pub stream_sink: Option<DataStreamSinkDesc>,
    #[serde(default)]
    pub olap_table_sink: Option<OlapTableSinkDesc>,
    #[serde(default)]
    pub export_sink: Option<ExportSinkDesc>,
    #[serde(default)]
    pub memory_scratch_sink: Option<MemoryScratchSinkDesc>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataPartitionType {
    Unpartitioned,
    Random,
    HashPartitioned,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataStreamSinkDesc {
    /// Exchange node id on the receiving side.
    pub dest_node_id: i32,
    pub partition_type: DataPartitionType,
    #[serde(default)]
    pub partition_exprs: Vec<ExprDesc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OlapTableSinkDesc {
    pub table_id: i64,
    pub tuple_id: i32,
    /// Target tablets; rows are distributed by row hash.
    pub tablet_ids: Vec<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportSinkDesc {
    pub export_path: String,
    #[serde(default = "ExportSinkDesc::default_column_separator")]
    pub column_separator: String,
    #[serde(default = "ExportSinkDesc::default_line_delimiter")]
    pub line_delimiter: String,
}

impl ExportSinkDesc {
    fn default_column_separator() -> String {
        "\t".to_string()
    }

    fn default_line_delimiter() -> String {
        "\n".to_string()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryScratchSinkDesc {
    /// Rows accepted before further sends report end-of-file.
    #[serde(default)]
    pub row_limit: Option<i64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Boolean,
    Bigint,
    Double,
    Varchar,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlotDescriptorDesc {
    pub id: i32,
    /// Owning tuple id.
    pub parent: i32,
    pub col_name: String,
    pub col_type: ColumnType,
    #[serde(default = "SlotDescriptorDesc::default_nullable")]
    pub nullable: bool,
}

impl SlotDescriptorDesc {
    fn default_nullable() -> bool {
        true
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TupleDescriptorDesc {
    pub id: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DescriptorTable {
    #[serde(default)]
    pub tuple_descriptors: Vec<TupleDescriptorDesc>,
    #[serde(default)]
    pub slot_descriptors: Vec<SlotDescriptorDesc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let request = ExecPlanFragmentParams {
            query_id: UniqueId::new(1, 2),
            query_globals: QueryGlobals::default(),
            query_options: QueryOptions::default(),
            params: PlanFragmentExecParams {
                fragment_instance_id: UniqueId::new(1, 3),
                sender_id: 0,
                num_senders: 1,
                per_exch_num_senders: HashMap::from([(2, 1)]),
                per_node_scan_ranges: HashMap::from([(1, vec![ScanRangeParams {
                    tablet_id: 10,
                    version: 1,
                }])]),
                send_query_statistics_with_every_batch: false,
                destinations: vec![],
            },
            fragment: PlanFragment {
                plan: PlanTree {
                    nodes: vec![PlanNodeDesc {
                        node_id: 1,
                        node_type: PlanNodeType::OlapScanNode,
                        num_children: 0,
                        limit: -1,
                        row_tuples: vec![0],
                        conjuncts: vec![],
                        olap_scan_node: Some(OlapScanNodeDesc { tuple_id: 0 }),
                        hash_join_node: None,
                        agg_node: None,
                        analytic_node: None,
                        sort_node: None,
                    }],
                },
                output_sink: None,
                output_exprs: vec![],
            },
            desc_tbl: DescriptorTable::default(),
            backend_num: 0,
            backend_id: None,
            import_label: None,
            db_name: None,
            load_job_id: None,
        };
        let json = serde_json::to_string(&request).expect("serialize request");
        let parsed: ExecPlanFragmentParams =
            serde_json::from_str(&json).expect("deserialize request");
        assert_eq!(parsed.query_id, UniqueId::new(1, 2));
        assert_eq!(parsed.fragment.plan.nodes.len(), 1);
        assert_eq!(parsed.params.per_exch_num_senders.get(&2), Some(&1));
    }

    #[test]
    fn expr_desc_uses_tagged_encoding() {
        let expr = ExprDesc::BinaryPred {
            op: BinaryPredOp::Lt,
            left: Box::new(ExprDesc::SlotRef { slot_id: 4 }),
            right: Box::new(ExprDesc::IntLiteral { value: 100 }),
        };
        let json = serde_json::to_value(&expr).expect("serialize expr");
        assert_eq!(json["expr"], "binary_pred");
        assert_eq!(json["left"]["expr"], "slot_ref");
    }
}
