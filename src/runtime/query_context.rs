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
use std::sync::Arc;

use crate::common::types::UniqueId;
use crate::plan::QueryGlobals;
use crate::runtime::descriptors::DescriptorTbl;
use crate::runtime::mem_tracker::{self, MemTracker};

/// Query-level context shared by the fragment instances of one statement on
/// this backend. When a submission carries it, instances borrow the
/// descriptor table and query globals instead of materializing their own.
pub struct QueryFragmentsCtx {
    query_id: UniqueId,
    query_globals: QueryGlobals,
    desc_tbl: Arc<DescriptorTbl>,
    mem_tracker: Arc<MemTracker>,
}

impl QueryFragmentsCtx {
    pub fn new(
        query_id: UniqueId,
        query_globals: QueryGlobals,
        desc_tbl: Arc<DescriptorTbl>,
    ) -> Self {
        let process = mem_tracker::process_mem_tracker();
        let label = format!("query_{:x}_{:x}", query_id.hi, query_id.lo);
        let mem_tracker = MemTracker::new_child(label, &process);
        Self {
            query_id,
            query_globals,
            desc_tbl,
            mem_tracker,
        }
    }

    pub fn query_id(&self) -> UniqueId {
        self.query_id
    }

    pub fn query_globals(&self) -> &QueryGlobals {
        &self.query_globals
    }

    pub fn desc_tbl(&self) -> Arc<DescriptorTbl> {
        Arc::clone(&self.desc_tbl)
    }

    pub fn mem_tracker(&self) -> Arc<MemTracker> {
        Arc::clone(&self.mem_tracker)
    }
}
