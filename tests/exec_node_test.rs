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
//! Operator-level tests driving plan trees directly against a runtime
//! state: factory validation, conjuncts, limits, joins, aggregation,
//! ordering, and window evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use basalt::common::status::StatusCode;
use basalt::common::types::UniqueId;
use basalt::exec::chunk::{Chunk, Datum};
use basalt::exec::node::{ExecNode, ExecNodeKind};
use basalt::plan;
use basalt::runtime::descriptors::DescriptorTbl;
use basalt::runtime::exec_env::ExecEnv;
use basalt::runtime::runtime_state::RuntimeState;

use crate::common::{desc_tbl_of, env_with_tablets, node_desc, scan_node_desc, schema_of};

mod common;

/// tuple 0: a/b, tuple 1: c/d, tuple 2: g/s (agg), tuple 3: w (window),
/// tuple 4: cnt (global agg) — all BIGINT.
fn numbers_desc_tbl() -> plan::DescriptorTable {
    desc_tbl_of(&[
        (0, &[
            (0, "a", plan::ColumnType::Bigint),
            (1, "b", plan::ColumnType::Bigint),
        ]),
        (1, &[
            (2, "c", plan::ColumnType::Bigint),
            (3, "d", plan::ColumnType::Bigint),
        ]),
        (2, &[
            (4, "g", plan::ColumnType::Bigint),
            (5, "s", plan::ColumnType::Bigint),
        ]),
        (3, &[(6, "w", plan::ColumnType::Bigint)]),
        (4, &[(7, "cnt", plan::ColumnType::Bigint)]),
    ])
}

fn pairs_chunk(desc: &plan::DescriptorTable, tuple: i32, rows: &[(i64, i64)]) -> Chunk {
    let datums: Vec<Vec<Datum>> = rows
        .iter()
        .map(|(x, y)| vec![Datum::Int(*x), Datum::Int(*y)])
        .collect();
    Chunk::from_rows(schema_of(desc, &[tuple]), &datums).expect("build pairs chunk")
}

fn make_state(env: Arc<ExecEnv>, desc: &plan::DescriptorTable, finst_lo: i64) -> RuntimeState {
    let params = plan::PlanFragmentExecParams {
        fragment_instance_id: UniqueId::new(200, finst_lo),
        sender_id: 0,
        num_senders: 1,
        per_exch_num_senders: HashMap::new(),
        per_node_scan_ranges: HashMap::new(),
        send_query_statistics_with_every_batch: false,
        destinations: vec![],
    };
    let mut state = RuntimeState::new(
        &params,
        UniqueId::new(200, 0),
        plan::QueryOptions::default(),
        plan::QueryGlobals::default(),
        env,
    );
    state.init_mem_trackers(None).expect("init trackers");
    state.set_desc_tbl(DescriptorTbl::create(desc).expect("create desc tbl"));
    state
}

fn bind_scan_ranges(plan_root: &mut ExecNode, ranges: &HashMap<i32, Vec<i64>>) {
    plan_root
        .for_each_node_mut(&mut |base, kind| {
            if let ExecNodeKind::OlapScan(scan) = kind {
                let tablets = ranges.get(&base.id()).cloned().unwrap_or_default();
                scan.set_scan_ranges(
                    tablets
                        .into_iter()
                        .map(|tablet_id| plan::ScanRangeParams {
                            tablet_id,
                            version: 1,
                        })
                        .collect(),
                );
            }
            Ok(())
        })
        .expect("bind scan ranges");
}

/// Prepare, open, and drain a plan tree, returning all produced rows.
fn run_to_rows(
    state: &RuntimeState,
    nodes: Vec<plan::PlanNodeDesc>,
    scan_ranges: HashMap<i32, Vec<i64>>,
) -> Vec<Vec<Datum>> {
    let desc_tbl = state.desc_tbl().expect("desc tbl");
    let tree = plan::PlanTree { nodes };
    let mut root = ExecNode::create_tree(&tree, desc_tbl).expect("create tree");
    root.prepare(state).expect("prepare");
    bind_scan_ranges(&mut root, &scan_ranges);
    root.open(state).expect("open");

    let mut chunk = Chunk::empty(root.schema()).expect("chunk");
    let mut rows = Vec::new();
    let mut eos = false;
    while !eos {
        chunk.reset();
        root.get_next(state, &mut chunk, &mut eos).expect("get_next");
        for row in 0..chunk.len() {
            rows.push(chunk.row_datums(row).expect("row datums"));
        }
    }
    root.close(state);
    rows
}

fn slot_ref(slot_id: i32) -> plan::ExprDesc {
    plan::ExprDesc::SlotRef { slot_id }
}

#[test]
fn create_tree_rejects_trailing_nodes() {
    let desc = numbers_desc_tbl();
    let desc_tbl = DescriptorTbl::create(&desc).expect("desc tbl");
    let tree = plan::PlanTree {
        nodes: vec![scan_node_desc(1, 0), scan_node_desc(2, 0)],
    };
    let err = ExecNode::create_tree(&tree, &desc_tbl).expect_err("trailing nodes");
    assert_eq!(err.code(), StatusCode::InvalidArgument);
}

#[test]
fn create_tree_checks_child_counts() {
    let desc = numbers_desc_tbl();
    let desc_tbl = DescriptorTbl::create(&desc).expect("desc tbl");
    // HASH_JOIN with a single child.
    let mut join = node_desc(3, plan::PlanNodeType::HashJoinNode, 1, vec![0, 1]);
    join.hash_join_node = Some(plan::HashJoinNodeDesc {
        join_op: plan::JoinOp::InnerJoin,
        eq_join_conjuncts: vec![plan::EqJoinConjunctDesc {
            left: slot_ref(0),
            right: slot_ref(2),
        }],
    });
    let tree = plan::PlanTree {
        nodes: vec![join, scan_node_desc(1, 0)],
    };
    let err = ExecNode::create_tree(&tree, &desc_tbl).expect_err("bad child count");
    assert_eq!(err.code(), StatusCode::InvalidArgument);
}

#[test]
fn select_node_applies_conjuncts() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![(1, vec![pairs_chunk(&desc, 0, &[
        (1, 10),
        (5, 20),
        (9, 30),
    ])])]);
    let state = make_state(env, &desc, 1);

    let mut select = node_desc(2, plan::PlanNodeType::SelectNode, 1, vec![0]);
    select.conjuncts = vec![plan::ExprDesc::BinaryPred {
        op: plan::BinaryPredOp::Ge,
        left: Box::new(slot_ref(0)),
        right: Box::new(plan::ExprDesc::IntLiteral { value: 5 }),
    }];

    let rows = run_to_rows(
        &state,
        vec![select, scan_node_desc(1, 0)],
        HashMap::from([(1, vec![1])]),
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], Datum::Int(5));
    assert_eq!(rows[1][0], Datum::Int(9));
}

#[test]
fn limit_truncates_scan_output() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![(1, vec![pairs_chunk(&desc, 0, &[
        (1, 1),
        (2, 2),
        (3, 3),
        (4, 4),
        (5, 5),
    ])])]);
    let state = make_state(env, &desc, 2);

    let mut scan = scan_node_desc(1, 0);
    scan.limit = 3;
    let rows = run_to_rows(&state, vec![scan], HashMap::from([(1, vec![1])]));
    assert_eq!(rows.len(), 3);
}

#[test]
fn union_concatenates_children() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![
        (1, vec![pairs_chunk(&desc, 0, &[(1, 1), (2, 2)])]),
        (2, vec![pairs_chunk(&desc, 0, &[(3, 3)])]),
    ]);
    let state = make_state(env, &desc, 3);

    let union = node_desc(3, plan::PlanNodeType::UnionNode, 2, vec![0]);
    let rows = run_to_rows(
        &state,
        vec![union, scan_node_desc(1, 0), scan_node_desc(2, 0)],
        HashMap::from([(1, vec![1]), (2, vec![2])]),
    );
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2][0], Datum::Int(3));
}

#[test]
fn hash_join_inner_matches_keys() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![
        (1, vec![pairs_chunk(&desc, 0, &[(1, 10), (2, 20), (3, 30)])]),
        (2, vec![pairs_chunk(&desc, 1, &[(2, 200), (3, 300), (4, 400)])]),
    ]);
    let state = make_state(env, &desc, 4);

    let mut join = node_desc(3, plan::PlanNodeType::HashJoinNode, 2, vec![0, 1]);
    join.hash_join_node = Some(plan::HashJoinNodeDesc {
        join_op: plan::JoinOp::InnerJoin,
        eq_join_conjuncts: vec![plan::EqJoinConjunctDesc {
            left: slot_ref(0),
            right: slot_ref(2),
        }],
    });

    let mut rows = run_to_rows(
        &state,
        vec![join, scan_node_desc(1, 0), scan_node_desc(2, 1)],
        HashMap::from([(1, vec![1]), (2, vec![2])]),
    );
    rows.sort();
    assert_eq!(rows.len(), 2);
    // Output layout: a, b, c, d.
    assert_eq!(rows[0], vec![
        Datum::Int(2),
        Datum::Int(20),
        Datum::Int(2),
        Datum::Int(200),
    ]);
    assert_eq!(rows[1], vec![
        Datum::Int(3),
        Datum::Int(30),
        Datum::Int(3),
        Datum::Int(300),
    ]);
}

#[test]
fn hash_join_left_outer_pads_with_nulls() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![
        (1, vec![pairs_chunk(&desc, 0, &[(1, 10), (2, 20)])]),
        (2, vec![pairs_chunk(&desc, 1, &[(2, 200)])]),
    ]);
    let state = make_state(env, &desc, 5);

    let mut join = node_desc(3, plan::PlanNodeType::HashJoinNode, 2, vec![0, 1]);
    join.hash_join_node = Some(plan::HashJoinNodeDesc {
        join_op: plan::JoinOp::LeftOuterJoin,
        eq_join_conjuncts: vec![plan::EqJoinConjunctDesc {
            left: slot_ref(0),
            right: slot_ref(2),
        }],
    });

    let mut rows = run_to_rows(
        &state,
        vec![join, scan_node_desc(1, 0), scan_node_desc(2, 1)],
        HashMap::from([(1, vec![1]), (2, vec![2])]),
    );
    rows.sort();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], vec![
        Datum::Int(1),
        Datum::Int(10),
        Datum::Null,
        Datum::Null,
    ]);
    assert_eq!(rows[1][2], Datum::Int(2));
}

#[test]
fn cross_join_produces_cartesian_product() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![
        (1, vec![pairs_chunk(&desc, 0, &[(1, 1), (2, 2), (3, 3)])]),
        (2, vec![pairs_chunk(&desc, 1, &[(7, 7), (8, 8)])]),
    ]);
    let state = make_state(env, &desc, 6);

    let join = node_desc(3, plan::PlanNodeType::CrossJoinNode, 2, vec![0, 1]);
    let rows = run_to_rows(
        &state,
        vec![join, scan_node_desc(1, 0), scan_node_desc(2, 1)],
        HashMap::from([(1, vec![1]), (2, vec![2])]),
    );
    assert_eq!(rows.len(), 6);
}

#[test]
fn aggregation_groups_and_sums() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![(1, vec![pairs_chunk(&desc, 0, &[
        (1, 10),
        (2, 20),
        (1, 5),
        (2, 1),
        (1, 1),
    ])])]);
    let state = make_state(env, &desc, 7);

    let mut agg = node_desc(4, plan::PlanNodeType::AggregationNode, 1, vec![2]);
    agg.agg_node = Some(plan::AggregationNodeDesc {
        tuple_id: 2,
        grouping_exprs: vec![slot_ref(0)],
        aggregate_functions: vec![plan::AggExprDesc {
            function: plan::AggFunction::Sum,
            child: Some(slot_ref(1)),
            output_slot_id: 5,
        }],
        use_streaming_preaggregation: false,
    });

    let mut rows = run_to_rows(
        &state,
        vec![agg, scan_node_desc(1, 0)],
        HashMap::from([(1, vec![1])]),
    );
    rows.sort();
    assert_eq!(rows, vec![
        vec![Datum::Int(1), Datum::Int(16)],
        vec![Datum::Int(2), Datum::Int(21)],
    ]);
}

#[test]
fn global_aggregation_emits_one_row_on_empty_input() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![]);
    let state = make_state(env, &desc, 8);

    let mut agg = node_desc(4, plan::PlanNodeType::AggregationNode, 1, vec![4]);
    agg.agg_node = Some(plan::AggregationNodeDesc {
        tuple_id: 4,
        grouping_exprs: vec![],
        aggregate_functions: vec![plan::AggExprDesc {
            function: plan::AggFunction::Count,
            child: None,
            output_slot_id: 7,
        }],
        use_streaming_preaggregation: false,
    });

    // Scan with zero assigned ranges produces no rows.
    let rows = run_to_rows(&state, vec![agg, scan_node_desc(1, 0)], HashMap::new());
    assert_eq!(rows, vec![vec![Datum::Int(0)]]);
}

#[test]
fn topn_orders_and_applies_offset_and_limit() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![(1, vec![pairs_chunk(&desc, 0, &[
        (5, 1),
        (1, 2),
        (4, 3),
        (2, 4),
        (3, 5),
    ])])]);
    let state = make_state(env, &desc, 9);

    let mut topn = node_desc(5, plan::PlanNodeType::TopNNode, 1, vec![0]);
    topn.limit = 2;
    topn.sort_node = Some(plan::SortNodeDesc {
        ordering_exprs: vec![slot_ref(0)],
        is_asc_order: vec![false],
        nulls_first: vec![],
        offset: 1,
    });

    let rows = run_to_rows(
        &state,
        vec![topn, scan_node_desc(1, 0)],
        HashMap::from([(1, vec![1])]),
    );
    // Descending by a, skip the first (5): 4, 3.
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], Datum::Int(4));
    assert_eq!(rows[1][0], Datum::Int(3));
}

#[test]
fn sort_orders_ascending() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![(1, vec![pairs_chunk(&desc, 0, &[
        (3, 1),
        (1, 2),
        (2, 3),
    ])])]);
    let state = make_state(env, &desc, 10);

    let mut sort = node_desc(5, plan::PlanNodeType::SortNode, 1, vec![0]);
    sort.sort_node = Some(plan::SortNodeDesc {
        ordering_exprs: vec![slot_ref(0)],
        is_asc_order: vec![true],
        nulls_first: vec![],
        offset: 0,
    });

    let rows = run_to_rows(
        &state,
        vec![sort, scan_node_desc(1, 0)],
        HashMap::from([(1, vec![1])]),
    );
    let keys: Vec<Datum> = rows.iter().map(|r| r[0].clone()).collect();
    assert_eq!(keys, vec![Datum::Int(1), Datum::Int(2), Datum::Int(3)]);
}

#[test]
fn analytic_appends_partition_count() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![(1, vec![pairs_chunk(&desc, 0, &[
        (1, 10),
        (2, 20),
        (1, 30),
    ])])]);
    let state = make_state(env, &desc, 11);

    let mut analytic = node_desc(6, plan::PlanNodeType::AnalyticEvalNode, 1, vec![0, 3]);
    analytic.analytic_node = Some(plan::AnalyticNodeDesc {
        partition_exprs: vec![slot_ref(0)],
        window_function: plan::AggExprDesc {
            function: plan::AggFunction::Count,
            child: None,
            output_slot_id: 6,
        },
    });

    let rows = run_to_rows(
        &state,
        vec![analytic, scan_node_desc(1, 0)],
        HashMap::from([(1, vec![1])]),
    );
    assert_eq!(rows.len(), 3);
    // Rows with a=1 see a partition count of 2, a=2 sees 1.
    assert_eq!(rows[0], vec![Datum::Int(1), Datum::Int(10), Datum::Int(2)]);
    assert_eq!(rows[1], vec![Datum::Int(2), Datum::Int(20), Datum::Int(1)]);
    assert_eq!(rows[2], vec![Datum::Int(1), Datum::Int(30), Datum::Int(2)]);
}

#[test]
fn empty_set_reports_eos_immediately() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![]);
    let state = make_state(env, &desc, 12);

    let empty = node_desc(7, plan::PlanNodeType::EmptySetNode, 0, vec![0]);
    let rows = run_to_rows(&state, vec![empty], HashMap::new());
    assert!(rows.is_empty());
}

#[test]
fn exchange_prepare_requires_sender_count() {
    let desc = numbers_desc_tbl();
    let env = env_with_tablets(vec![]);
    let state = make_state(env, &desc, 13);
    let desc_tbl = state.desc_tbl().expect("desc tbl");

    let tree = plan::PlanTree {
        nodes: vec![node_desc(2, plan::PlanNodeType::ExchangeNode, 0, vec![0])],
    };
    let mut root = ExecNode::create_tree(&tree, desc_tbl).expect("create tree");
    let err = root.prepare(&state).expect_err("no sender count");
    assert_eq!(err.code(), StatusCode::InvalidArgument);
    root.close(&state);
}
