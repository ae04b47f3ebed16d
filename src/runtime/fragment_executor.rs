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
//! Fragment instance executor.
//!
//! Drives one fragment instance: prepare builds the runtime state, plan
//! tree, and optional sink from the coordinator request; open either pushes
//! batches plan → sink to completion or leaves the instance in pull mode
//! for `get_next`; cancel cooperatively unblocks execution from any thread;
//! close releases everything. A side reporter thread publishes profile
//! snapshots on a timer and a final report is guaranteed for every
//! terminated instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use rand::Rng;

use crate::basalt_logging::{debug, info, warn};
use crate::common::config;
use crate::common::status::{Result, Status};
use crate::common::types::UniqueId;
use crate::exec::chunk::{Chunk, RowBatch};
use crate::exec::node::{ExecNode, ExecNodeKind};
use crate::exec::sink::{self, DataSink};
use crate::plan::{ExecPlanFragmentParams, QueryType};
use crate::runtime::descriptors::DescriptorTbl;
use crate::runtime::exec_env::ExecEnv;
use crate::runtime::profile::{
    CounterRef, CounterUnit, RuntimeProfile, ScopedTimer, TOTAL_TIME_COUNTER,
};
use crate::runtime::query_context::QueryFragmentsCtx;
use crate::runtime::query_statistics::{QueryStatistics, QueryStatisticsRef};
use crate::runtime::runtime_state::RuntimeState;

/// `(status, profile_or_null, done)`; `done == true` fires exactly once per
/// instance when it terminates or is cancelled.
pub type ReportStatusCallback = Arc<dyn Fn(&Status, Option<&RuntimeProfile>, bool) + Send + Sync>;

/// Why an instance was cancelled, recorded by the first `cancel` call while
/// the executor status was still OK.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CancelReason {
    InternalError,
    Timeout,
    UserCancel,
    MemoryLimitExceed,
    CallRpcError,
}

struct ReportFlags {
    is_report_success: AtomicBool,
    is_report_on_cancel: AtomicBool,
}

struct ReportThreadCtx {
    active: Mutex<bool>,
    started_cv: Condvar,
    stop_cv: Condvar,
}

#[derive(Clone)]
struct ReportParams {
    callback: ReportStatusCallback,
    status: Arc<Mutex<Status>>,
    profile: RuntimeProfile,
    flags: Arc<ReportFlags>,
    instance_id: UniqueId,
}

pub struct FragmentExecutor {
    exec_env: Arc<ExecEnv>,
    report_status_cb: Option<ReportStatusCallback>,
    query_id: UniqueId,
    runtime_state: Option<Arc<RuntimeState>>,
    plan: Option<ExecNode>,
    sink: Option<Box<dyn DataSink>>,
    chunk: Option<Chunk>,
    row_batch: Option<RowBatch>,
    query_statistics: QueryStatisticsRef,
    rows_produced_counter: Option<CounterRef>,
    fragment_cpu_timer: Option<CounterRef>,
    status: Arc<Mutex<Status>>,
    cancel_state: Arc<Mutex<Option<(CancelReason, String)>>>,
    report_flags: Arc<ReportFlags>,
    report_ctx: Arc<ReportThreadCtx>,
    report_thread: Mutex<Option<JoinHandle<()>>>,
    collect_statistics_with_every_batch: bool,
    is_vectorized: bool,
    prepared: bool,
    done: bool,
    closed: bool,
}

impl FragmentExecutor {
    pub fn new(exec_env: Arc<ExecEnv>, report_status_cb: Option<ReportStatusCallback>) -> Self {
        Self {
            exec_env,
            report_status_cb,
            query_id: UniqueId::new(0, 0),
            runtime_state: None,
            plan: None,
            sink: None,
            chunk: None,
            row_batch: None,
            query_statistics: QueryStatistics::new_shared(),
            rows_produced_counter: None,
            fragment_cpu_timer: None,
            status: Arc::new(Mutex::new(Status::ok())),
            cancel_state: Arc::new(Mutex::new(None)),
            report_flags: Arc::new(ReportFlags {
                is_report_success: AtomicBool::new(true),
                is_report_on_cancel: AtomicBool::new(true),
            }),
            report_ctx: Arc::new(ReportThreadCtx {
                active: Mutex::new(false),
                started_cv: Condvar::new(),
                stop_cv: Condvar::new(),
            }),
            report_thread: Mutex::new(None),
            collect_statistics_with_every_batch: false,
            is_vectorized: true,
            prepared: false,
            done: false,
            closed: false,
        }
    }

    /// Build the runtime state, plan tree, and optional sink from a
    /// submission request. Must be called exactly once; on success the
    /// instance is ready to open.
    pub fn prepare(
        &mut self,
        request: &ExecPlanFragmentParams,
        query_ctx: Option<&QueryFragmentsCtx>,
    ) -> Result<()> {
        if self.prepared {
            return Err(Status::internal_error("executor already prepared"));
        }
        self.query_id = request.query_id;
        let params = &request.params;
        info!(
            "FragmentExecutor::prepare: query_id={} instance_id={} backend_num={}",
            self.query_id, params.fragment_instance_id, request.backend_num
        );

        self.report_flags
            .is_report_success
            .store(request.query_options.is_report_success, Ordering::Release);
        self.is_vectorized = request.query_options.enable_vectorized;

        let query_globals = match query_ctx {
            Some(ctx) => ctx.query_globals().clone(),
            None => request.query_globals.clone(),
        };
        let mut state = RuntimeState::new(
            params,
            self.query_id,
            request.query_options.clone(),
            query_globals,
            Arc::clone(&self.exec_env),
        );
        state.set_backend_num(request.backend_num);
        if let Some(backend_id) = request.backend_id {
            state.set_backend_id(backend_id);
        }
        if let Some(label) = &request.import_label {
            state.set_import_label(label);
        }
        if let Some(db_name) = &request.db_name {
            state.set_db_name(db_name);
        }
        if let Some(load_job_id) = request.load_job_id {
            state.set_load_job_id(load_job_id);
        }
        state.init_mem_trackers(query_ctx.map(|ctx| ctx.mem_tracker()))?;

        // Descriptor table: borrowed from the query context when present,
        // otherwise materialized from the request.
        let desc_tbl = match query_ctx {
            Some(ctx) => ctx.desc_tbl(),
            None => DescriptorTbl::create(&request.desc_tbl)?,
        };
        state.set_desc_tbl(Arc::clone(&desc_tbl));
        state.set_per_fragment_instance_idx(params.sender_id);
        state.set_num_per_fragment_instances(params.num_senders);

        // From here on the state is shared; a failed prepare leaves it in
        // place so close() can still tear the sink down.
        let state = {
            self.runtime_state = Some(Arc::new(state));
            self.runtime_state.clone().expect("runtime state set")
        };

        let mut plan = ExecNode::create_tree(&request.fragment.plan, &desc_tbl)?;

        // The sink is set up before plan validation so that a failed
        // prepare can still close it with InternalError("prepare failed").
        if let Some(sink_desc) = &request.fragment.output_sink {
            let mut sink =
                sink::create_data_sink(sink_desc, &request.fragment.output_exprs, params)?;
            sink.prepare(&state)?;
            if let Some(profile) = sink.profile() {
                state.runtime_profile().add_child(profile.clone());
            }
            sink.set_query_statistics(Arc::clone(&self.query_statistics));
            self.collect_statistics_with_every_batch =
                params.send_query_statistics_with_every_batch;
            self.sink = Some(sink);
        }

        // Exchange nodes need their sender counts before prepare; a missing
        // entry in the coordinator map is a malformed request.
        plan.for_each_node_mut(&mut |base, kind| {
            if let ExecNodeKind::Exchange(exchange) = kind {
                let num_senders = params
                    .per_exch_num_senders
                    .get(&base.id())
                    .copied()
                    .unwrap_or(0);
                if num_senders <= 0 {
                    return Err(Status::invalid_argument(format!(
                        "exchange node {} has no sender count",
                        base.id()
                    )));
                }
                exchange.set_num_senders(num_senders as usize);
            }
            Ok(())
        })?;

        plan.prepare(&state)?;
        plan.try_do_aggregate_serde_improve();

        // Bind scan ranges; unassigned scan nodes get an empty list and
        // produce zero rows.
        plan.for_each_node_mut(&mut |base, kind| {
            if let ExecNodeKind::OlapScan(scan) = kind {
                let ranges = params
                    .per_node_scan_ranges
                    .get(&base.id())
                    .cloned()
                    .unwrap_or_default();
                debug!(
                    "scan node {}: {} scan ranges assigned",
                    base.id(),
                    ranges.len()
                );
                scan.set_scan_ranges(ranges);
            }
            Ok(())
        })?;

        state.runtime_profile().add_child(plan.runtime_profile().clone());
        self.rows_produced_counter = Some(
            state
                .runtime_profile()
                .add_counter("RowsProduced", CounterUnit::Unit),
        );
        self.fragment_cpu_timer = Some(state.runtime_profile().add_timer("FragmentCpuTime"));

        self.chunk = Some(Chunk::empty(plan.schema())?);
        self.row_batch = Some(RowBatch::new(state.batch_size()));

        if state.query_type() == QueryType::External {
            // External consumers pull through the result queue; create it
            // up front so status propagation always has a target.
            self.exec_env
                .result_queue_mgr()
                .create_queue(state.fragment_instance_id(), config::scratch_queue_capacity());
        }

        self.plan = Some(plan);
        self.prepared = true;
        Ok(())
    }

    /// Drive the instance. With a sink, pushes batches to completion and
    /// closes the sink exactly once; without one, opens the plan and leaves
    /// batch pulling to `get_next`.
    pub fn open(&mut self) -> Result<()> {
        if !self.prepared {
            return Err(Status::internal_error("open called before prepare succeeded"));
        }
        let state = self
            .runtime_state
            .clone()
            .ok_or_else(|| Status::internal_error("open called before prepare"))?;
        let mem_limit = state.query_mem_tracker()?.limit().unwrap_or(-1);
        info!(
            "FragmentExecutor::open: query_id={} instance_id={} mem_limit={}",
            self.query_id,
            state.fragment_instance_id(),
            mem_limit
        );

        // The reporter must be running before open proceeds, since the
        // drive loop may block; the startup handshake keeps stop_reporter
        // from racing reporter startup.
        if self.report_enabled() {
            self.start_report_thread(&state);
        }

        let mut result = self.open_internal(&state);

        if let Err(status) = &result {
            if !status.is_cancelled() && state.log_has_space() {
                // Queries that do not fetch results (e.g. loads) may only
                // see the error through the instance log.
                state.log_error(status.message());
            }
            if status.is_cancelled() {
                let recorded = self
                    .cancel_state
                    .lock()
                    .expect("executor cancel state lock")
                    .clone();
                if let Some((reason, msg)) = recorded {
                    match reason {
                        CancelReason::CallRpcError => {
                            result = Err(Status::runtime_error(msg));
                        }
                        CancelReason::MemoryLimitExceed => {
                            result = Err(Status::mem_limit_exceeded(msg));
                        }
                        _ => {}
                    }
                }
            }
        }

        self.update_status(&Status::from_result(&result));
        result
    }

    fn open_internal(&mut self, state: &Arc<RuntimeState>) -> Result<()> {
        {
            let _cpu = self.cpu_timer();
            let _total = state.runtime_profile().scoped_timer(TOTAL_TIME_COUNTER);
            self.plan_mut()?.open(state)?;
        }
        if self.sink.is_none() {
            return Ok(());
        }
        {
            let _cpu = self.cpu_timer();
            self.sink_mut()?.open(state)?;
        }

        loop {
            let has_chunk = {
                let _cpu = self.cpu_timer();
                self.get_next_chunk(state)?
            };
            if !has_chunk {
                break;
            }

            let _total = state.runtime_profile().scoped_timer(TOTAL_TIME_COUNTER);
            let _cpu = self.cpu_timer();
            if self.collect_statistics_with_every_batch {
                self.collect_query_statistics(state);
            }
            let chunk = self
                .chunk
                .as_ref()
                .ok_or_else(|| Status::internal_error("driver chunk released"))?;
            let send_result = match self.sink.as_mut() {
                Some(sink) => sink.send(state, chunk),
                None => return Err(Status::internal_error("sink released mid-drive")),
            };
            match send_result {
                Err(status) if status.is_end_of_file() => break,
                other => other?,
            }
        }

        {
            let _total = state.runtime_profile().scoped_timer(TOTAL_TIME_COUNTER);
            self.collect_query_statistics(state);
            let exec_status = self.status.lock().expect("executor status lock").clone();
            let close_result = match self.sink.as_mut() {
                Some(sink) => sink.close(state, exec_status),
                None => Ok(()),
            };
            // Dropping the handle ensures close() will not double-close it.
            self.sink = None;
            close_result?;
        }

        self.done = true;
        self.stop_report_thread();
        self.send_report(true);
        Ok(())
    }

    /// Pull mode: yield the next non-empty batch, or `None` at end of
    /// stream. Terminal actions (reporter stop, final report) run at EOS.
    pub fn get_next(&mut self) -> Result<Option<&RowBatch>> {
        let state = self
            .runtime_state
            .clone()
            .ok_or_else(|| Status::internal_error("get_next called before prepare"))?;
        if self.sink.is_some() {
            return Err(Status::internal_error(
                "get_next is only valid without an output sink",
            ));
        }

        let has_chunk = match self.get_next_chunk(&state) {
            Ok(has) => has,
            Err(status) => {
                self.update_status(&status);
                return Err(status);
            }
        };

        if !has_chunk {
            info!(
                "FragmentExecutor::get_next finished: query_id={} instance_id={}",
                self.query_id,
                state.fragment_instance_id()
            );
            self.update_status(&Status::ok());
            self.stop_report_thread();
            self.send_report(true);
            return Ok(None);
        }

        let chunk = self
            .chunk
            .as_ref()
            .ok_or_else(|| Status::internal_error("driver chunk released"))?;
        let row_batch = self
            .row_batch
            .as_mut()
            .ok_or_else(|| Status::internal_error("driver row batch released"))?;
        row_batch.reset();
        if let Err(status) = row_batch.fill_from_chunk(chunk) {
            self.update_status(&status);
            return Err(status);
        }
        self.update_status(&Status::ok());
        Ok(self.row_batch.as_ref())
    }

    /// Advance the plan until it yields a non-empty chunk into the
    /// driver-owned chunk, or end of stream.
    fn get_next_chunk(&mut self, state: &Arc<RuntimeState>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        let plan = self
            .plan
            .as_mut()
            .ok_or_else(|| Status::internal_error("plan not built"))?;
        let chunk = self
            .chunk
            .as_mut()
            .ok_or_else(|| Status::internal_error("driver chunk released"))?;
        while !self.done {
            chunk.reset();
            let mut eos = false;
            {
                let _total = state.runtime_profile().scoped_timer(TOTAL_TIME_COUNTER);
                plan.get_next(state, chunk, &mut eos)?;
            }
            if eos {
                self.done = true;
            }
            if !chunk.is_empty() {
                if let Some(counter) = self.rows_produced_counter.as_ref() {
                    counter.update(chunk.len() as i64);
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Single mutation point for the executor status slot. The first
    /// non-OK status wins; every non-OK update stops the reporter and emits
    /// a final report so the coordinator hears about every failed instance.
    pub fn update_status(&self, new_status: &Status) {
        if new_status.is_ok() {
            return;
        }
        {
            let mut guard = self.status.lock().expect("executor status lock");
            if guard.is_ok() {
                if let Some(state) = self.runtime_state.as_ref() {
                    if new_status.is_mem_limit_exceeded() {
                        state.set_mem_limit_exceeded(new_status.message());
                    }
                    if state.query_type() == QueryType::External {
                        self.exec_env
                            .result_queue_mgr()
                            .update_queue_status(state.fragment_instance_id(), new_status);
                    }
                }
                *guard = new_status.clone();
            }
        }
        self.stop_report_thread();
        self.send_report(true);
    }

    /// Cooperative cancellation; callable from any thread once prepared.
    /// Records the first reason/message while the status is still OK, sets
    /// the cancellation flag, and unblocks the stream-manager path plus, in
    /// non-vectorized mode, the result-sink path.
    pub fn cancel(&self, reason: CancelReason, msg: &str) {
        match self.cancel_handle() {
            Ok(handle) => handle.cancel(reason, msg),
            Err(_) => warn!("cancel before prepare: query_id={}", self.query_id),
        }
    }

    /// Detachable handle for cancelling from another thread while the
    /// driver thread sits inside `open` or `get_next`.
    pub fn cancel_handle(&self) -> Result<FragmentCancelHandle> {
        let state = self
            .runtime_state
            .clone()
            .ok_or_else(|| Status::internal_error("cancel handle before prepare"))?;
        Ok(FragmentCancelHandle {
            exec_env: Arc::clone(&self.exec_env),
            state,
            status: Arc::clone(&self.status),
            cancel_state: Arc::clone(&self.cancel_state),
            is_vectorized: self.is_vectorized,
            query_id: self.query_id,
        })
    }

    /// Mark the instance aborted before it ever ran.
    pub fn set_abort(&self) {
        self.update_status(&Status::aborted("Execution aborted before start"));
    }

    /// Idempotent teardown: batch pool before plan close (nodes may still
    /// reference batch memory), sink closed with the accumulated status,
    /// reporter joined before returning.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.row_batch = None;
        self.chunk = None;

        if let Some(state) = self.runtime_state.clone() {
            if let Some(plan) = self.plan.as_mut() {
                plan.close(&state);
            }
            if let Some(mut sink) = self.sink.take() {
                let close_status = if self.prepared {
                    self.status.lock().expect("executor status lock").clone()
                } else {
                    Status::internal_error("prepare failed")
                };
                if let Err(e) = sink.close(&state, close_status) {
                    warn!("sink close failed: {}", e);
                }
            }
            self.stop_report_thread();
            if self.report_flags.is_report_success.load(Ordering::Acquire) {
                let profile = state.runtime_profile();
                profile.compute_time_in_profile();
                info!("{}", profile.pretty_print());
            }
            info!(
                "FragmentExecutor::close: instance_id={}",
                state.fragment_instance_id()
            );
        } else {
            self.stop_report_thread();
        }
        self.closed = true;
    }

    pub fn status(&self) -> Status {
        self.status.lock().expect("executor status lock").clone()
    }

    pub fn runtime_state(&self) -> Option<&Arc<RuntimeState>> {
        self.runtime_state.as_ref()
    }

    pub fn profile(&self) -> Option<&RuntimeProfile> {
        self.runtime_state.as_ref().map(|s| s.runtime_profile())
    }

    pub fn query_statistics(&self) -> QueryStatisticsRef {
        Arc::clone(&self.query_statistics)
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancel_state
            .lock()
            .expect("executor cancel state lock")
            .as_ref()
            .map(|(reason, _)| *reason)
    }

    /// Suppress reports for internally-cancelled instances (e.g. a query
    /// limit was reached and cancellation is just cleanup).
    pub fn set_is_report_on_cancel(&self, enabled: bool) {
        self.report_flags
            .is_report_on_cancel
            .store(enabled, Ordering::Release);
    }

    fn plan_mut(&mut self) -> Result<&mut ExecNode> {
        self.plan
            .as_mut()
            .ok_or_else(|| Status::internal_error("plan not built"))
    }

    fn sink_mut(&mut self) -> Result<&mut Box<dyn DataSink>> {
        self.sink
            .as_mut()
            .ok_or_else(|| Status::internal_error("sink not present"))
    }

    fn cpu_timer(&self) -> Option<ScopedTimer> {
        self.fragment_cpu_timer.clone().map(ScopedTimer::new)
    }

    fn collect_query_statistics(&self, state: &RuntimeState) {
        let mut stats = self.query_statistics.lock().expect("query statistics lock");
        stats.clear();
        if let Some(plan) = self.plan.as_ref() {
            plan.collect_query_statistics(&mut stats);
        }
        let cpu_ns = self
            .fragment_cpu_timer
            .as_ref()
            .map(|c| c.value())
            .unwrap_or(0);
        stats.add_cpu_ms(cpu_ns / 1_000_000);
        if state.backend_id() != -1 {
            if let Ok(tracker) = state.instance_mem_tracker() {
                stats
                    .add_nodes_statistics(state.backend_id())
                    .add_peak_memory(tracker.peak());
            }
        }
    }

    fn report_enabled(&self) -> bool {
        self.report_flags.is_report_success.load(Ordering::Acquire)
            && self.report_status_cb.is_some()
            && config::status_report_interval() > 0
    }

    fn start_report_thread(&self, state: &Arc<RuntimeState>) {
        let Some(callback) = self.report_status_cb.as_ref() else {
            return;
        };
        let params = ReportParams {
            callback: Arc::clone(callback),
            status: Arc::clone(&self.status),
            profile: state.runtime_profile().clone(),
            flags: Arc::clone(&self.report_flags),
            instance_id: state.fragment_instance_id(),
        };
        let ctx = Arc::clone(&self.report_ctx);

        // Hold the reporter lock across spawn and wait for the startup
        // signal, so a later stop cannot race reporter startup.
        let mut active = self.report_ctx.active.lock().expect("report thread lock");
        let handle = std::thread::Builder::new()
            .name("fragment_report".to_string())
            .spawn(move || report_profile_loop(ctx, params))
            .expect("start report thread");
        *self
            .report_thread
            .lock()
            .expect("report thread handle lock") = Some(handle);
        while !*active {
            active = self
                .report_ctx
                .started_cv
                .wait(active)
                .expect("report thread lock");
        }
    }

    fn stop_report_thread(&self) {
        let handle = self
            .report_thread
            .lock()
            .expect("report thread handle lock")
            .take();
        let Some(handle) = handle else {
            return;
        };
        {
            let mut active = self.report_ctx.active.lock().expect("report thread lock");
            *active = false;
        }
        self.report_ctx.stop_cv.notify_one();
        let _ = handle.join();
    }

    fn send_report(&self, done: bool) {
        let Some(callback) = self.report_status_cb.as_ref() else {
            return;
        };
        let Some(state) = self.runtime_state.as_ref() else {
            return;
        };
        let params = ReportParams {
            callback: Arc::clone(callback),
            status: Arc::clone(&self.status),
            profile: state.runtime_profile().clone(),
            flags: Arc::clone(&self.report_flags),
            instance_id: state.fragment_instance_id(),
        };
        send_report_with(&params, done);
    }
}

impl Drop for FragmentExecutor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cloneable cancellation handle holding only shared executor state.
#[derive(Clone)]
pub struct FragmentCancelHandle {
    exec_env: Arc<ExecEnv>,
    state: Arc<RuntimeState>,
    status: Arc<Mutex<Status>>,
    cancel_state: Arc<Mutex<Option<(CancelReason, String)>>>,
    is_vectorized: bool,
    query_id: UniqueId,
}

impl FragmentCancelHandle {
    pub fn cancel(&self, reason: CancelReason, msg: &str) {
        info!(
            "FragmentExecutor::cancel: query_id={} instance_id={} reason={:?}",
            self.query_id,
            self.state.fragment_instance_id(),
            reason
        );
        {
            let status_guard = self.status.lock().expect("executor status lock");
            if status_guard.is_ok() {
                let mut cancel_guard = self
                    .cancel_state
                    .lock()
                    .expect("executor cancel state lock");
                if cancel_guard.is_none() {
                    *cancel_guard = Some((reason, msg.to_string()));
                }
            }
        }
        self.state.set_is_cancelled(true);

        // Unblock the known blocking points.
        let instance_id = self.state.fragment_instance_id();
        self.exec_env.stream_mgr().cancel(instance_id);
        if !self.is_vectorized {
            self.exec_env.result_mgr().cancel(instance_id);
        }
    }
}

/// Reporter thread body: signal startup, jitter the first wait, then emit
/// a non-final report per interval until deactivated. Reads only; never
/// mutates plan or status.
fn report_profile_loop(ctx: Arc<ReportThreadCtx>, params: ReportParams) {
    debug!("report thread started: instance_id={}", params.instance_id);
    let mut active = ctx.active.lock().expect("report thread lock");
    *active = true;
    ctx.started_cv.notify_one();

    let interval = config::status_report_interval();
    if interval <= 0 {
        warn!("status_report_interval is equal to or less than zero, exiting reporting thread");
        return;
    }

    // Jitter the first report by a random offset so the coordinator does
    // not receive the whole fleet's updates at once.
    let jitter = rand::thread_rng().gen_range(0..interval) as u64;
    let (guard, _) = ctx
        .stop_cv
        .wait_timeout(active, Duration::from_secs(jitter))
        .expect("report thread lock");
    active = guard;

    while *active {
        let (guard, _) = ctx
            .stop_cv
            .wait_timeout(active, Duration::from_secs(interval as u64))
            .expect("report thread lock");
        active = guard;
        // The wait can end on timeout or signal; the active flag, not the
        // wait result, decides whether to keep reporting.
        if !*active {
            break;
        }
        send_report_with(&params, false);
    }
    debug!("exiting report thread: instance_id={}", params.instance_id);
}

fn send_report_with(params: &ReportParams, done: bool) {
    let status = params.status.lock().expect("executor status lock").clone();
    let is_report_success = params.flags.is_report_success.load(Ordering::Acquire);
    let is_report_on_cancel = params.flags.is_report_on_cancel.load(Ordering::Acquire);

    // A successful completion with success-reporting disabled needs no
    // report; with cancel-reporting also disabled, nothing is sent at all.
    if !is_report_success && done && status.is_ok() {
        return;
    }
    if !is_report_success && !is_report_on_cancel {
        return;
    }

    let profile = if is_report_success {
        Some(&params.profile)
    } else {
        None
    };
    (params.callback)(&status, profile, done || !status.is_ok());
}
