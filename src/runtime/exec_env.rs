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
//! Process-wide execution environment shared by all fragment instances:
//! stream manager, result managers, and the tablet storage entry point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::common::status::{Result, Status};
use crate::exec::chunk::Chunk;
use crate::plan::ScanRangeParams;
use crate::runtime::result_buffer::{ResultBufferMgr, ResultQueueMgr};
use crate::runtime::stream_mgr::DataStreamMgr;

/// Scan-node contract to tablet storage. The execution core never sees
/// rowset metadata or segment files; it only pulls layout-tagged chunks
/// for an assigned scan range.
pub trait TabletSource: Send + Sync {
    fn tablet_chunks(&self, range: &ScanRangeParams) -> Result<Vec<Chunk>>;
}

/// In-memory tablet store, used by tests and embedded deployments.
#[derive(Default)]
pub struct InMemoryTabletSource {
    tablets: Mutex<HashMap<i64, Vec<Chunk>>>,
}

impl InMemoryTabletSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tablet(&self, tablet_id: i64, chunks: Vec<Chunk>) {
        self.tablets
            .lock()
            .expect("tablet source lock")
            .insert(tablet_id, chunks);
    }
}

impl TabletSource for InMemoryTabletSource {
    fn tablet_chunks(&self, range: &ScanRangeParams) -> Result<Vec<Chunk>> {
        self.tablets
            .lock()
            .expect("tablet source lock")
            .get(&range.tablet_id)
            .cloned()
            .ok_or_else(|| {
                Status::internal_error(format!("tablet {} not found", range.tablet_id))
            })
    }
}

pub struct ExecEnv {
    stream_mgr: Arc<DataStreamMgr>,
    result_mgr: Arc<ResultBufferMgr>,
    result_queue_mgr: Arc<ResultQueueMgr>,
    tablet_source: Arc<dyn TabletSource>,
}

impl ExecEnv {
    pub fn new() -> Arc<Self> {
        Self::with_tablet_source(Arc::new(InMemoryTabletSource::new()))
    }

    pub fn with_tablet_source(tablet_source: Arc<dyn TabletSource>) -> Arc<Self> {
        Arc::new(Self {
            stream_mgr: Arc::new(DataStreamMgr::new()),
            result_mgr: Arc::new(ResultBufferMgr::new()),
            result_queue_mgr: Arc::new(ResultQueueMgr::new()),
            tablet_source,
        })
    }

    pub fn stream_mgr(&self) -> &Arc<DataStreamMgr> {
        &self.stream_mgr
    }

    pub fn result_mgr(&self) -> &Arc<ResultBufferMgr> {
        &self.result_mgr
    }

    pub fn result_queue_mgr(&self) -> &Arc<ResultQueueMgr> {
        &self.result_queue_mgr
    }

    pub fn tablet_source(&self) -> &Arc<dyn TabletSource> {
        &self.tablet_source
    }
}
