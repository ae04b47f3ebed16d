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
//! End-to-end tests for the fragment executor: driven and pull modes,
//! cancellation, prepare failure, and reporting behavior.

use std::thread;
use std::time::Duration;

use basalt::common::status::StatusCode;
use basalt::common::types::UniqueId;
use basalt::exec::chunk::Datum;
use basalt::runtime::exec_env::ExecEnv;
use basalt::runtime::fragment_executor::{CancelReason, FragmentExecutor};

use crate::common::{
    RequestSpec, done_reports, env_with_tablet, exchange_node_desc, export_sink_desc,
    kv_chunk_seq, kv_desc_tbl, olap_table_sink_desc, report_collector, scan_node_desc,
    scratch_sink_desc, stream_sink_desc,
};

mod common;

#[test]
fn happy_path_driven_scan_to_sink() {
    let env = env_with_tablet(10, vec![kv_chunk_seq(0, 10)]);
    let finst = UniqueId::new(100, 1);
    let request = RequestSpec::new(finst, vec![scan_node_desc(1, 0)])
        .with_scan_ranges(1, &[10])
        .with_sink(scratch_sink_desc(None))
        .build();

    let (callback, reports) = report_collector();
    let mut executor = FragmentExecutor::new(env.clone(), Some(callback));
    executor.prepare(&request, None).expect("prepare");
    executor.open().expect("open");

    assert!(executor.status().is_ok());
    let done = done_reports(&reports);
    assert_eq!(done.len(), 1);
    assert!(done[0].is_ok());
    assert_eq!(
        executor.profile().expect("profile").counter_value("RowsProduced"),
        10
    );

    let queue = env
        .result_queue_mgr()
        .find_queue(finst)
        .expect("scratch queue");
    let chunk = queue
        .pop(Duration::from_secs(1))
        .expect("pop")
        .expect("chunk");
    assert_eq!(chunk.len(), 10);
    assert_eq!(chunk.datum(0, 0).expect("datum"), Datum::Int(0));
    assert!(queue.pop(Duration::from_secs(1)).expect("pop").is_none());

    executor.close();
}

#[test]
fn sink_end_of_file_is_graceful() {
    // Two chunks; the sink's row limit is hit after the first, so the
    // second send reports end-of-file and the driver stops pulling.
    let env = env_with_tablet(11, vec![kv_chunk_seq(0, 6), kv_chunk_seq(6, 4)]);
    let finst = UniqueId::new(101, 1);
    let request = RequestSpec::new(finst, vec![scan_node_desc(1, 0)])
        .with_scan_ranges(1, &[11])
        .with_sink(scratch_sink_desc(Some(6)))
        .build();

    let (callback, reports) = report_collector();
    let mut executor = FragmentExecutor::new(env.clone(), Some(callback));
    executor.prepare(&request, None).expect("prepare");
    executor.open().expect("open treats sink EOF as success");

    assert!(executor.status().is_ok());
    let done = done_reports(&reports);
    assert_eq!(done.len(), 1);
    assert!(done[0].is_ok());

    let queue = env
        .result_queue_mgr()
        .find_queue(finst)
        .expect("scratch queue");
    let first = queue
        .pop(Duration::from_secs(1))
        .expect("pop")
        .expect("chunk");
    assert_eq!(first.len(), 6);
    assert!(queue.pop(Duration::from_secs(1)).expect("pop").is_none());
    assert!(queue.recorded_status().is_ok());

    executor.close();
}

#[test]
fn sink_end_of_file_on_first_send_is_still_ok() {
    let env = env_with_tablet(20, vec![kv_chunk_seq(0, 5)]);
    let finst = UniqueId::new(113, 1);
    let request = RequestSpec::new(finst, vec![scan_node_desc(1, 0)])
        .with_scan_ranges(1, &[20])
        .with_sink(scratch_sink_desc(Some(0)))
        .build();

    let mut executor = FragmentExecutor::new(env.clone(), None);
    executor.prepare(&request, None).expect("prepare");
    executor.open().expect("open");
    assert!(executor.status().is_ok());

    let queue = env
        .result_queue_mgr()
        .find_queue(finst)
        .expect("scratch queue");
    assert!(queue.pop(Duration::from_secs(1)).expect("pop").is_none());
    executor.close();
}

#[test]
fn cancel_unblocks_exchange_and_rewrites_status() {
    // The exchange never hears from its sender, so the drive loop blocks
    // until cancel pokes the stream manager.
    let env = ExecEnv::new();
    let finst = UniqueId::new(102, 1);
    let request = RequestSpec::new(finst, vec![exchange_node_desc(2, 0)])
        .with_exchange_senders(2, 1)
        .with_sink(scratch_sink_desc(None))
        .build();

    let (callback, reports) = report_collector();
    let mut executor = FragmentExecutor::new(env, Some(callback));
    executor.prepare(&request, None).expect("prepare");

    let handle = executor.cancel_handle().expect("cancel handle");
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        handle.cancel(CancelReason::MemoryLimitExceed, "oom");
    });

    let err = executor.open().expect_err("cancelled mid-execution");
    assert_eq!(err.code(), StatusCode::MemLimitExceeded);
    assert_eq!(err.message(), "oom");
    canceller.join().expect("join canceller");

    let done = done_reports(&reports);
    assert_eq!(done.len(), 1);
    assert!(done[0].is_mem_limit_exceeded());
    assert_eq!(
        executor.profile().expect("profile").counter_value("RowsProduced"),
        0
    );

    executor.close();
}

#[test]
fn prepare_failure_closes_sink_with_internal_error() {
    // Exchange node without an entry in the sender-count map.
    let env = ExecEnv::new();
    let finst = UniqueId::new(103, 1);
    let request = RequestSpec::new(finst, vec![exchange_node_desc(2, 0)])
        .with_sink(scratch_sink_desc(None))
        .build();

    let (callback, reports) = report_collector();
    let mut executor = FragmentExecutor::new(env.clone(), Some(callback));
    let err = executor.prepare(&request, None).expect_err("bad request");
    assert_eq!(err.code(), StatusCode::InvalidArgument);

    executor.close();

    let queue = env
        .result_queue_mgr()
        .find_queue(finst)
        .expect("scratch queue created during sink prepare");
    let recorded = queue.recorded_status();
    assert_eq!(recorded.code(), StatusCode::InternalError);
    assert_eq!(recorded.message(), "prepare failed");
    // No execution ever ran, so nothing was reported.
    assert!(done_reports(&reports).is_empty());
}

#[test]
fn pull_mode_yields_batches_then_eos() {
    let env = env_with_tablet(12, vec![kv_chunk_seq(0, 5), kv_chunk_seq(5, 3)]);
    let finst = UniqueId::new(104, 1);
    let request = RequestSpec::new(finst, vec![scan_node_desc(1, 0)])
        .with_scan_ranges(1, &[12])
        .build();

    let (callback, reports) = report_collector();
    let mut executor = FragmentExecutor::new(env, Some(callback));
    executor.prepare(&request, None).expect("prepare");
    executor.open().expect("open in pull mode returns immediately");

    let first = executor.get_next().expect("first batch").expect("rows");
    assert_eq!(first.num_rows(), 5);
    assert_eq!(first.rows()[0][0], Datum::Int(0));
    let second = executor.get_next().expect("second batch").expect("rows");
    assert_eq!(second.num_rows(), 3);
    assert!(executor.get_next().expect("eos").is_none());

    let done = done_reports(&reports);
    assert_eq!(done.len(), 1);
    assert!(done[0].is_ok());
    assert!(executor.status().is_ok());

    executor.close();
}

#[test]
fn zero_scan_ranges_terminate_cleanly() {
    let env = ExecEnv::new();
    let finst = UniqueId::new(105, 1);
    let request = RequestSpec::new(finst, vec![scan_node_desc(1, 0)]).build();

    let mut executor = FragmentExecutor::new(env, None);
    executor.prepare(&request, None).expect("prepare");
    executor.open().expect("open");
    assert!(executor.get_next().expect("eos").is_none());
    assert!(executor.status().is_ok());
    executor.close();
}

#[test]
fn double_cancel_and_double_close_are_noops() {
    let env = env_with_tablet(13, vec![kv_chunk_seq(0, 4)]);
    let finst = UniqueId::new(106, 1);
    let request = RequestSpec::new(finst, vec![scan_node_desc(1, 0)])
        .with_scan_ranges(1, &[13])
        .with_sink(scratch_sink_desc(None))
        .build();

    let (callback, reports) = report_collector();
    let mut executor = FragmentExecutor::new(env, Some(callback));
    executor.prepare(&request, None).expect("prepare");

    executor.cancel(CancelReason::UserCancel, "first");
    executor.cancel(CancelReason::InternalError, "second");
    // The first recorded reason wins while the status is still OK.
    assert_eq!(executor.cancel_reason(), Some(CancelReason::UserCancel));

    executor.close();
    executor.close();
    assert!(done_reports(&reports).is_empty());
}

#[test]
fn status_transitions_are_monotonic() {
    let env = env_with_tablet(14, vec![kv_chunk_seq(0, 2)]);
    let finst = UniqueId::new(107, 1);
    let request = RequestSpec::new(finst, vec![scan_node_desc(1, 0)])
        .with_scan_ranges(1, &[14])
        .build();

    let mut executor = FragmentExecutor::new(env, None);
    executor.prepare(&request, None).expect("prepare");

    executor.update_status(&basalt::Status::internal_error("first failure"));
    executor.update_status(&basalt::Status::cancelled("too late"));
    let status = executor.status();
    assert_eq!(status.code(), StatusCode::InternalError);
    assert_eq!(status.message(), "first failure");

    executor.close();
}

#[test]
fn statistics_are_collected_at_termination() {
    let env = env_with_tablet(15, vec![kv_chunk_seq(0, 10)]);
    let finst = UniqueId::new(108, 1);
    let request = RequestSpec::new(finst, vec![scan_node_desc(1, 0)])
        .with_scan_ranges(1, &[15])
        .with_sink(scratch_sink_desc(None))
        .with_backend_id(7)
        .build();

    let mut executor = FragmentExecutor::new(env, None);
    executor.prepare(&request, None).expect("prepare");
    executor.open().expect("open");

    let statistics = executor.query_statistics();
    let stats = statistics.lock().expect("statistics lock");
    assert_eq!(stats.scan_rows(), 10);
    assert!(stats.scan_bytes() > 0);
    assert!(stats.nodes_statistics(7).is_some());
    drop(stats);

    executor.close();
}

#[test]
fn prepare_borrows_descriptor_table_from_query_ctx() {
    use basalt::plan;
    use basalt::runtime::descriptors::DescriptorTbl;
    use basalt::runtime::query_context::QueryFragmentsCtx;

    let env = env_with_tablet(17, vec![kv_chunk_seq(0, 3)]);
    let finst = UniqueId::new(110, 1);
    // The request itself carries no descriptors; they come from the
    // query-level context.
    let mut request = RequestSpec::new(finst, vec![scan_node_desc(1, 0)])
        .with_scan_ranges(1, &[17])
        .build();
    request.desc_tbl = plan::DescriptorTable::default();

    let desc_tbl = DescriptorTbl::create(&kv_desc_tbl()).expect("desc tbl");
    let query_ctx = QueryFragmentsCtx::new(
        request.query_id,
        plan::QueryGlobals::default(),
        desc_tbl,
    );

    let mut executor = FragmentExecutor::new(env, None);
    executor.prepare(&request, Some(&query_ctx)).expect("prepare");
    executor.open().expect("open");
    let batch = executor.get_next().expect("batch").expect("rows");
    assert_eq!(batch.num_rows(), 3);
    assert!(executor.get_next().expect("eos").is_none());
    executor.close();
}

#[test]
fn export_sink_writes_delimited_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("export.csv");
    let env = env_with_tablet(18, vec![kv_chunk_seq(0, 4)]);
    let finst = UniqueId::new(111, 1);
    let request = RequestSpec::new(finst, vec![scan_node_desc(1, 0)])
        .with_scan_ranges(1, &[18])
        .with_sink(export_sink_desc(path.to_str().expect("utf8 path")))
        .build();

    let mut executor = FragmentExecutor::new(env, None);
    executor.prepare(&request, None).expect("prepare");
    executor.open().expect("open");
    executor.close();

    let contents = std::fs::read_to_string(&path).expect("read export file");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "0,v0");
}

#[test]
fn olap_table_sink_commits_on_success() {
    use basalt::runtime::sink_commit;

    let env = env_with_tablet(19, vec![kv_chunk_seq(0, 12)]);
    let finst = UniqueId::new(112, 1);
    let request = RequestSpec::new(finst, vec![scan_node_desc(1, 0)])
        .with_scan_ranges(1, &[19])
        .with_sink(olap_table_sink_desc(900, &[500, 501]))
        .with_backend_id(3)
        .build();

    let mut executor = FragmentExecutor::new(env, None);
    executor.prepare(&request, None).expect("prepare");
    executor.open().expect("open");

    let commits = sink_commit::list_tablet_commit_infos(finst);
    assert!(!commits.is_empty());
    assert!(commits.iter().all(|info| info.backend_id == 3));
    assert!(sink_commit::list_tablet_fail_infos(finst).is_empty());
    let (rows, bytes) = sink_commit::load_counters(finst);
    assert_eq!(rows, 12);
    assert!(bytes > 0);

    executor.close();
}

#[test]
fn exchange_pipeline_between_two_fragments() {
    // Producer fragment: scan -> stream sink; consumer fragment:
    // exchange -> scratch sink, wired through the shared stream manager.
    let env = env_with_tablet(16, vec![kv_chunk_seq(0, 8)]);
    let producer_finst = UniqueId::new(109, 1);
    let consumer_finst = UniqueId::new(109, 2);

    let consumer_request = RequestSpec::new(consumer_finst, vec![exchange_node_desc(2, 0)])
        .with_exchange_senders(2, 1)
        .with_sink(scratch_sink_desc(None))
        .build();
    let producer_request = RequestSpec::new(producer_finst, vec![scan_node_desc(1, 0)])
        .with_scan_ranges(1, &[16])
        .with_sink(stream_sink_desc(2))
        .with_destination(consumer_finst)
        .build();

    let mut consumer = FragmentExecutor::new(env.clone(), None);
    consumer.prepare(&consumer_request, None).expect("prepare consumer");

    let mut producer = FragmentExecutor::new(env.clone(), None);
    producer.prepare(&producer_request, None).expect("prepare producer");

    let producer_thread = thread::spawn(move || {
        producer.open().expect("producer open");
        producer.close();
    });

    consumer.open().expect("consumer open");
    producer_thread.join().expect("join producer");

    let queue = env
        .result_queue_mgr()
        .find_queue(consumer_finst)
        .expect("scratch queue");
    let mut rows = 0;
    while let Some(chunk) = queue.pop(Duration::from_secs(1)).expect("pop") {
        rows += chunk.len();
    }
    assert_eq!(rows, 8);
    assert_eq!(
        consumer
            .profile()
            .expect("profile")
            .counter_value("RowsProduced"),
        8
    );
    consumer.close();
}
