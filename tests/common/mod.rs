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
//! Shared helpers for integration tests: descriptor tables, chunks,
//! request builders, and a report-collecting callback.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arrow::datatypes::SchemaRef;

use basalt::common::status::Status;
use basalt::common::types::UniqueId;
use basalt::exec::chunk::{Chunk, Datum};
use basalt::plan;
use basalt::runtime::descriptors::{DescriptorTbl, RowDescriptor};
use basalt::runtime::exec_env::{ExecEnv, InMemoryTabletSource};
use basalt::runtime::fragment_executor::ReportStatusCallback;

/// Descriptor table from `(tuple_id, [(slot_id, name, type)])` specs.
pub fn desc_tbl_of(tuples: &[(i32, &[(i32, &str, plan::ColumnType)])]) -> plan::DescriptorTable {
    let mut tuple_descriptors = Vec::new();
    let mut slot_descriptors = Vec::new();
    for (tuple_id, slots) in tuples {
        tuple_descriptors.push(plan::TupleDescriptorDesc { id: *tuple_id });
        for (slot_id, name, col_type) in slots.iter() {
            slot_descriptors.push(plan::SlotDescriptorDesc {
                id: *slot_id,
                parent: *tuple_id,
                col_name: (*name).to_string(),
                col_type: *col_type,
                nullable: true,
            });
        }
    }
    plan::DescriptorTable {
        tuple_descriptors,
        slot_descriptors,
    }
}

/// One tuple: slot 0 `k` BIGINT, slot 1 `v` VARCHAR.
pub fn kv_desc_tbl() -> plan::DescriptorTable {
    desc_tbl_of(&[(0, &[
        (0, "k", plan::ColumnType::Bigint),
        (1, "v", plan::ColumnType::Varchar),
    ])])
}

pub fn schema_of(desc: &plan::DescriptorTable, row_tuples: &[i32]) -> SchemaRef {
    let desc_tbl = DescriptorTbl::create(desc).expect("create descriptor table");
    RowDescriptor::from_wire(row_tuples)
        .expect("row descriptor")
        .arrow_schema(&desc_tbl)
        .expect("arrow schema")
}

/// Chunk of `(k, v)` rows in the kv layout.
pub fn kv_chunk(rows: &[(i64, &str)]) -> Chunk {
    let datums: Vec<Vec<Datum>> = rows
        .iter()
        .map(|(k, v)| vec![Datum::Int(*k), Datum::String((*v).to_string())])
        .collect();
    Chunk::from_rows(schema_of(&kv_desc_tbl(), &[0]), &datums).expect("build kv chunk")
}

/// `n` sequential kv rows starting at `start`.
pub fn kv_chunk_seq(start: i64, n: usize) -> Chunk {
    let rows: Vec<(i64, String)> = (0..n as i64)
        .map(|i| (start + i, format!("v{}", start + i)))
        .collect();
    let borrowed: Vec<(i64, &str)> = rows.iter().map(|(k, v)| (*k, v.as_str())).collect();
    kv_chunk(&borrowed)
}

pub fn env_with_tablet(tablet_id: i64, chunks: Vec<Chunk>) -> Arc<ExecEnv> {
    let source = InMemoryTabletSource::new();
    source.register_tablet(tablet_id, chunks);
    ExecEnv::with_tablet_source(Arc::new(source))
}

pub fn env_with_tablets(tablets: Vec<(i64, Vec<Chunk>)>) -> Arc<ExecEnv> {
    let source = InMemoryTabletSource::new();
    for (tablet_id, chunks) in tablets {
        source.register_tablet(tablet_id, chunks);
    }
    ExecEnv::with_tablet_source(Arc::new(source))
}

/// Bare plan node with no operator options filled in.
pub fn node_desc(
    node_id: i32,
    node_type: plan::PlanNodeType,
    num_children: i32,
    row_tuples: Vec<i32>,
) -> plan::PlanNodeDesc {
    plan::PlanNodeDesc {
        node_id,
        node_type,
        num_children,
        limit: -1,
        row_tuples,
        conjuncts: vec![],
        olap_scan_node: None,
        hash_join_node: None,
        agg_node: None,
        analytic_node: None,
        sort_node: None,
    }
}

pub fn scan_node_desc(node_id: i32, tuple_id: i32) -> plan::PlanNodeDesc {
    let mut desc = node_desc(node_id, plan::PlanNodeType::OlapScanNode, 0, vec![tuple_id]);
    desc.olap_scan_node = Some(plan::OlapScanNodeDesc { tuple_id });
    desc
}

pub fn exchange_node_desc(node_id: i32, tuple_id: i32) -> plan::PlanNodeDesc {
    node_desc(node_id, plan::PlanNodeType::ExchangeNode, 0, vec![tuple_id])
}

pub fn scratch_sink_desc(row_limit: Option<i64>) -> plan::DataSinkDesc {
    plan::DataSinkDesc {
        sink_type: plan::DataSinkType::MemoryScratchSink,
        stream_sink: None,
        olap_table_sink: None,
        export_sink: None,
        memory_scratch_sink: Some(plan::MemoryScratchSinkDesc { row_limit }),
    }
}

pub fn export_sink_desc(export_path: &str) -> plan::DataSinkDesc {
    plan::DataSinkDesc {
        sink_type: plan::DataSinkType::ExportSink,
        stream_sink: None,
        olap_table_sink: None,
        export_sink: Some(plan::ExportSinkDesc {
            export_path: export_path.to_string(),
            column_separator: ",".to_string(),
            line_delimiter: "\n".to_string(),
        }),
        memory_scratch_sink: None,
    }
}

pub fn olap_table_sink_desc(table_id: i64, tablet_ids: &[i64]) -> plan::DataSinkDesc {
    plan::DataSinkDesc {
        sink_type: plan::DataSinkType::OlapTableSink,
        stream_sink: None,
        olap_table_sink: Some(plan::OlapTableSinkDesc {
            table_id,
            tuple_id: 0,
            tablet_ids: tablet_ids.to_vec(),
        }),
        export_sink: None,
        memory_scratch_sink: None,
    }
}

pub fn stream_sink_desc(dest_node_id: i32) -> plan::DataSinkDesc {
    plan::DataSinkDesc {
        sink_type: plan::DataSinkType::DataStreamSink,
        stream_sink: Some(plan::DataStreamSinkDesc {
            dest_node_id,
            partition_type: plan::DataPartitionType::Unpartitioned,
            partition_exprs: vec![],
        }),
        olap_table_sink: None,
        export_sink: None,
        memory_scratch_sink: None,
    }
}

pub struct RequestSpec {
    pub finst_id: UniqueId,
    pub nodes: Vec<plan::PlanNodeDesc>,
    pub output_sink: Option<plan::DataSinkDesc>,
    pub desc_tbl: plan::DescriptorTable,
    pub per_node_scan_ranges: HashMap<i32, Vec<plan::ScanRangeParams>>,
    pub per_exch_num_senders: HashMap<i32, i32>,
    pub destinations: Vec<UniqueId>,
    pub backend_id: Option<i64>,
}

impl RequestSpec {
    pub fn new(finst_id: UniqueId, nodes: Vec<plan::PlanNodeDesc>) -> Self {
        Self {
            finst_id,
            nodes,
            output_sink: None,
            desc_tbl: kv_desc_tbl(),
            per_node_scan_ranges: HashMap::new(),
            per_exch_num_senders: HashMap::new(),
            destinations: Vec::new(),
            backend_id: None,
        }
    }

    pub fn with_sink(mut self, sink: plan::DataSinkDesc) -> Self {
        self.output_sink = Some(sink);
        self
    }

    pub fn with_desc_tbl(mut self, desc_tbl: plan::DescriptorTable) -> Self {
        self.desc_tbl = desc_tbl;
        self
    }

    pub fn with_scan_ranges(mut self, node_id: i32, tablet_ids: &[i64]) -> Self {
        self.per_node_scan_ranges.insert(
            node_id,
            tablet_ids
                .iter()
                .map(|id| plan::ScanRangeParams {
                    tablet_id: *id,
                    version: 1,
                })
                .collect(),
        );
        self
    }

    pub fn with_exchange_senders(mut self, node_id: i32, num_senders: i32) -> Self {
        self.per_exch_num_senders.insert(node_id, num_senders);
        self
    }

    pub fn with_destination(mut self, finst_id: UniqueId) -> Self {
        self.destinations.push(finst_id);
        self
    }

    pub fn with_backend_id(mut self, backend_id: i64) -> Self {
        self.backend_id = Some(backend_id);
        self
    }

    pub fn build(self) -> plan::ExecPlanFragmentParams {
        plan::ExecPlanFragmentParams {
            query_id: UniqueId::new(self.finst_id.hi, 0),
            query_globals: plan::QueryGlobals::default(),
            query_options: plan::QueryOptions {
                mem_limit: 0,
                batch_size: 4096,
                enable_vectorized: true,
                is_report_success: true,
                query_type: plan::QueryType::Select,
            },
            params: plan::PlanFragmentExecParams {
                fragment_instance_id: self.finst_id,
                sender_id: 0,
                num_senders: 1,
                per_exch_num_senders: self.per_exch_num_senders,
                per_node_scan_ranges: self.per_node_scan_ranges,
                send_query_statistics_with_every_batch: false,
                destinations: self
                    .destinations
                    .into_iter()
                    .map(|id| plan::PlanFragmentDestination {
                        fragment_instance_id: id,
                    })
                    .collect(),
            },
            fragment: plan::PlanFragment {
                plan: plan::PlanTree { nodes: self.nodes },
                output_sink: self.output_sink,
                output_exprs: vec![],
            },
            desc_tbl: self.desc_tbl,
            backend_num: 0,
            backend_id: self.backend_id,
            import_label: None,
            db_name: None,
            load_job_id: None,
        }
    }
}

pub type ReportLog = Arc<Mutex<Vec<(Status, bool)>>>;

/// Callback recording `(status, done)` per report.
pub fn report_collector() -> (ReportStatusCallback, ReportLog) {
    let log: ReportLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let callback: ReportStatusCallback = Arc::new(move |status, _profile, done| {
        sink.lock().expect("report log lock").push((status.clone(), done));
    });
    (callback, log)
}

pub fn done_reports(log: &ReportLog) -> Vec<Status> {
    log.lock()
        .expect("report log lock")
        .iter()
        .filter(|(_, done)| *done)
        .map(|(status, _)| status.clone())
        .collect()
}
