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
//! Per-fragment-instance execution context.
//!
//! One `RuntimeState` is created by the executor during prepare, shared by
//! reference with every plan node and the sink, and destroyed when the
//! executor closes. The memory tracker hierarchy it owns (instance → query
//! → process) outlives every node and the sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::common::config;
use crate::common::status::{Result, Status};
use crate::common::types::UniqueId;
use crate::plan::{PlanFragmentExecParams, QueryGlobals, QueryOptions, QueryType};
use crate::runtime::descriptors::DescriptorTbl;
use crate::runtime::exec_env::ExecEnv;
use crate::runtime::mem_tracker::{self, MemTracker};
use crate::runtime::profile::RuntimeProfile;
use crate::runtime::sink_commit;

const ERROR_LOG_CAPACITY: usize = 100;

pub struct RuntimeState {
    query_id: UniqueId,
    fragment_instance_id: UniqueId,
    query_options: QueryOptions,
    query_globals: QueryGlobals,
    exec_env: Arc<ExecEnv>,
    backend_num: i32,
    backend_id: i64,
    per_fragment_instance_idx: i32,
    num_per_fragment_instances: i32,
    desc_tbl: Option<Arc<DescriptorTbl>>,
    query_mem_tracker: Option<Arc<MemTracker>>,
    instance_mem_tracker: Option<Arc<MemTracker>>,
    is_cancelled: AtomicBool,
    mem_limit_exceeded: AtomicBool,
    error_log: Mutex<Vec<String>>,
    profile: RuntimeProfile,
    import_label: Option<String>,
    db_name: Option<String>,
    load_job_id: Option<i64>,
}

impl RuntimeState {
    pub fn new(
        params: &PlanFragmentExecParams,
        query_id: UniqueId,
        query_options: QueryOptions,
        query_globals: QueryGlobals,
        exec_env: Arc<ExecEnv>,
    ) -> Self {
        let fragment_instance_id = params.fragment_instance_id;
        let profile = RuntimeProfile::new(format!("Fragment {}", fragment_instance_id));
        sink_commit::register(fragment_instance_id);
        Self {
            query_id,
            fragment_instance_id,
            query_options,
            query_globals,
            exec_env,
            backend_num: 0,
            backend_id: -1,
            per_fragment_instance_idx: 0,
            num_per_fragment_instances: 1,
            desc_tbl: None,
            query_mem_tracker: None,
            instance_mem_tracker: None,
            is_cancelled: AtomicBool::new(false),
            mem_limit_exceeded: AtomicBool::new(false),
            error_log: Mutex::new(Vec::new()),
            profile,
            import_label: None,
            db_name: None,
            load_job_id: None,
        }
    }

    /// Build the instance → query → process tracker chain. When the query
    /// context already owns a query-level tracker it is reused; otherwise a
    /// fresh one is created with the request's (or the configured) budget.
    pub fn init_mem_trackers(
        &mut self,
        query_mem_tracker: Option<Arc<MemTracker>>,
    ) -> Result<()> {
        let query_tracker = match query_mem_tracker {
            Some(tracker) => tracker,
            None => {
                let limit = if self.query_options.mem_limit > 0 {
                    self.query_options.mem_limit
                } else {
                    config::default_query_mem_limit()
                };
                let process = mem_tracker::process_mem_tracker();
                let label = format!("query_{:x}_{:x}", self.query_id.hi, self.query_id.lo);
                MemTracker::new_child_with_limit(label, limit, &process)
            }
        };
        let instance_label = format!(
            "fragment_{:x}_{:x}",
            self.fragment_instance_id.hi, self.fragment_instance_id.lo
        );
        self.instance_mem_tracker = Some(MemTracker::new_child(instance_label, &query_tracker));
        self.query_mem_tracker = Some(query_tracker);
        Ok(())
    }

    pub fn set_desc_tbl(&mut self, desc_tbl: Arc<DescriptorTbl>) {
        self.desc_tbl = Some(desc_tbl);
    }

    pub fn desc_tbl(&self) -> Result<&Arc<DescriptorTbl>> {
        self.desc_tbl
            .as_ref()
            .ok_or_else(|| Status::internal_error("descriptor table not set"))
    }

    pub fn set_backend_num(&mut self, backend_num: i32) {
        self.backend_num = backend_num;
    }

    pub fn set_backend_id(&mut self, backend_id: i64) {
        self.backend_id = backend_id;
    }

    pub fn set_import_label(&mut self, label: impl Into<String>) {
        self.import_label = Some(label.into());
    }

    pub fn set_db_name(&mut self, db_name: impl Into<String>) {
        self.db_name = Some(db_name.into());
    }

    pub fn set_load_job_id(&mut self, id: i64) {
        self.load_job_id = Some(id);
    }

    pub fn set_per_fragment_instance_idx(&mut self, idx: i32) {
        self.per_fragment_instance_idx = idx;
    }

    pub fn set_num_per_fragment_instances(&mut self, num: i32) {
        self.num_per_fragment_instances = num;
    }

    pub fn query_id(&self) -> UniqueId {
        self.query_id
    }

    pub fn fragment_instance_id(&self) -> UniqueId {
        self.fragment_instance_id
    }

    pub fn backend_num(&self) -> i32 {
        self.backend_num
    }

    pub fn backend_id(&self) -> i64 {
        self.backend_id
    }

    pub fn per_fragment_instance_idx(&self) -> i32 {
        self.per_fragment_instance_idx
    }

    pub fn num_per_fragment_instances(&self) -> i32 {
        self.num_per_fragment_instances
    }

    pub fn query_options(&self) -> &QueryOptions {
        &self.query_options
    }

    pub fn query_globals(&self) -> &QueryGlobals {
        &self.query_globals
    }

    pub fn timezone(&self) -> &str {
        &self.query_globals.time_zone
    }

    pub fn query_type(&self) -> QueryType {
        self.query_options.query_type
    }

    pub fn enable_vectorized(&self) -> bool {
        self.query_options.enable_vectorized
    }

    pub fn import_label(&self) -> Option<&str> {
        self.import_label.as_deref()
    }

    pub fn db_name(&self) -> Option<&str> {
        self.db_name.as_deref()
    }

    pub fn load_job_id(&self) -> Option<i64> {
        self.load_job_id
    }

    pub fn exec_env(&self) -> &Arc<ExecEnv> {
        &self.exec_env
    }

    pub fn runtime_profile(&self) -> &RuntimeProfile {
        &self.profile
    }

    pub fn query_mem_tracker(&self) -> Result<&Arc<MemTracker>> {
        self.query_mem_tracker
            .as_ref()
            .ok_or_else(|| Status::internal_error("query mem tracker not initialized"))
    }

    pub fn instance_mem_tracker(&self) -> Result<&Arc<MemTracker>> {
        self.instance_mem_tracker
            .as_ref()
            .ok_or_else(|| Status::internal_error("instance mem tracker not initialized"))
    }

    /// Maximum row count per chunk, from the request's `batch_size`.
    pub fn batch_size(&self) -> usize {
        let size = self.query_options.batch_size;
        if size > 0 { size as usize } else { 4096 }
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_cancelled.load(Ordering::Acquire)
    }

    pub fn set_is_cancelled(&self, cancelled: bool) {
        self.is_cancelled.store(cancelled, Ordering::Release);
    }

    /// Polled at every `get_next` boundary.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Status::cancelled("fragment instance cancelled"))
        } else {
            Ok(())
        }
    }

    pub fn set_mem_limit_exceeded(&self, msg: &str) {
        self.mem_limit_exceeded.store(true, Ordering::Release);
        self.log_error(msg);
    }

    pub fn mem_limit_exceeded(&self) -> bool {
        self.mem_limit_exceeded.load(Ordering::Acquire)
    }

    pub fn log_has_space(&self) -> bool {
        self.error_log.lock().expect("error log lock").len() < ERROR_LOG_CAPACITY
    }

    /// Record an error message for queries that do not fetch results
    /// directly (e.g. loads) and can only retrieve the log afterwards.
    pub fn log_error(&self, msg: &str) {
        let mut guard = self.error_log.lock().expect("error log lock");
        if guard.len() < ERROR_LOG_CAPACITY {
            guard.push(msg.to_string());
        }
    }

    pub fn error_log(&self) -> Vec<String> {
        self.error_log.lock().expect("error log lock").clone()
    }

    pub fn add_tablet_commit_info(&self, info: sink_commit::TabletCommitInfo) {
        sink_commit::add_tablet_commit_info(self.fragment_instance_id, info);
    }

    pub fn add_tablet_fail_info(&self, info: sink_commit::TabletFailInfo) {
        sink_commit::add_tablet_fail_info(self.fragment_instance_id, info);
    }

    pub fn add_sink_load_counters(&self, loaded_rows: i64, loaded_bytes: i64) {
        if loaded_rows <= 0 && loaded_bytes <= 0 {
            return;
        }
        sink_commit::add_load_counters(self.fragment_instance_id, loaded_rows, loaded_bytes);
    }
}

impl Drop for RuntimeState {
    fn drop(&mut self) {
        sink_commit::unregister(self.fragment_instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanFragmentDestination;
    use std::collections::HashMap;

    fn sample_params() -> PlanFragmentExecParams {
        PlanFragmentExecParams {
            fragment_instance_id: UniqueId::new(1, 2),
            sender_id: 0,
            num_senders: 1,
            per_exch_num_senders: HashMap::new(),
            per_node_scan_ranges: HashMap::new(),
            send_query_statistics_with_every_batch: false,
            destinations: Vec::<PlanFragmentDestination>::new(),
        }
    }

    fn sample_state() -> RuntimeState {
        RuntimeState::new(
            &sample_params(),
            UniqueId::new(1, 1),
            QueryOptions::default(),
            QueryGlobals::default(),
            ExecEnv::new(),
        )
    }

    #[test]
    fn cancellation_flag_trips_check() {
        let state = sample_state();
        assert!(state.check_cancelled().is_ok());
        state.set_is_cancelled(true);
        let err = state.check_cancelled().expect_err("cancelled");
        assert!(err.is_cancelled());
    }

    #[test]
    fn error_log_is_bounded() {
        let state = sample_state();
        for i in 0..(ERROR_LOG_CAPACITY + 10) {
            state.log_error(&format!("error {}", i));
        }
        assert_eq!(state.error_log().len(), ERROR_LOG_CAPACITY);
        assert!(!state.log_has_space());
    }

    #[test]
    fn mem_trackers_form_instance_query_chain() {
        let mut state = sample_state();
        state.init_mem_trackers(None).expect("init trackers");
        let instance = state.instance_mem_tracker().expect("instance tracker");
        instance.consume(123);
        let query = state.query_mem_tracker().expect("query tracker");
        assert_eq!(query.current(), 123);
        assert!(query.limit().expect("query budget") > 0);
    }
}
