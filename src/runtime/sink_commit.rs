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
//! Publish/commit contract between ingest sinks and the transaction manager.
//!
//! Ingest sinks record per-tablet commit or fail info here during `close`;
//! the transaction layer collects it by fragment instance id when publishing
//! the load. The store is process-global because the transaction layer
//! outlives individual executors.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::common::types::UniqueId;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TabletCommitInfo {
    pub tablet_id: i64,
    pub backend_id: i64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TabletFailInfo {
    pub tablet_id: i64,
    pub backend_id: i64,
}

struct SinkCommitStore {
    mu: Mutex<HashMap<UniqueId, SinkCommitEntry>>,
}

#[derive(Default)]
struct SinkCommitEntry {
    tablet_commit_infos: Vec<TabletCommitInfo>,
    tablet_fail_infos: Vec<TabletFailInfo>,
    loaded_rows: i64,
    loaded_bytes: i64,
}

static STORE: OnceLock<SinkCommitStore> = OnceLock::new();

fn store() -> &'static SinkCommitStore {
    STORE.get_or_init(|| SinkCommitStore {
        mu: Mutex::new(HashMap::new()),
    })
}

pub fn register(finst_id: UniqueId) {
    let store = store();
    let mut guard = store.mu.lock().expect("sink commit store lock");
    guard.entry(finst_id).or_default();
}

pub fn unregister(finst_id: UniqueId) {
    let store = store();
    let mut guard = store.mu.lock().expect("sink commit store lock");
    guard.remove(&finst_id);
}

pub fn add_tablet_commit_info(finst_id: UniqueId, info: TabletCommitInfo) {
    let store = store();
    let mut guard = store.mu.lock().expect("sink commit store lock");
    let entry = guard.entry(finst_id).or_default();
    let already_exists = entry.tablet_commit_infos.iter().any(|current| {
        current.tablet_id == info.tablet_id && current.backend_id == info.backend_id
    });
    if !already_exists {
        entry.tablet_commit_infos.push(info);
    }
}

pub fn list_tablet_commit_infos(finst_id: UniqueId) -> Vec<TabletCommitInfo> {
    let store = store();
    let guard = store.mu.lock().expect("sink commit store lock");
    guard
        .get(&finst_id)
        .map(|entry| entry.tablet_commit_infos.clone())
        .unwrap_or_default()
}

pub fn add_tablet_fail_info(finst_id: UniqueId, info: TabletFailInfo) {
    let store = store();
    let mut guard = store.mu.lock().expect("sink commit store lock");
    let entry = guard.entry(finst_id).or_default();
    let already_exists = entry.tablet_fail_infos.iter().any(|current| {
        current.tablet_id == info.tablet_id && current.backend_id == info.backend_id
    });
    if !already_exists {
        entry.tablet_fail_infos.push(info);
    }
}

pub fn list_tablet_fail_infos(finst_id: UniqueId) -> Vec<TabletFailInfo> {
    let store = store();
    let guard = store.mu.lock().expect("sink commit store lock");
    guard
        .get(&finst_id)
        .map(|entry| entry.tablet_fail_infos.clone())
        .unwrap_or_default()
}

pub fn add_load_counters(finst_id: UniqueId, loaded_rows: i64, loaded_bytes: i64) {
    let store = store();
    let mut guard = store.mu.lock().expect("sink commit store lock");
    let entry = guard.entry(finst_id).or_default();
    entry.loaded_rows = entry.loaded_rows.saturating_add(loaded_rows.max(0));
    entry.loaded_bytes = entry.loaded_bytes.saturating_add(loaded_bytes.max(0));
}

pub fn load_counters(finst_id: UniqueId) -> (i64, i64) {
    let store = store();
    let guard = store.mu.lock().expect("sink commit store lock");
    guard
        .get(&finst_id)
        .map(|entry| (entry.loaded_rows, entry.loaded_bytes))
        .unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_info_is_deduplicated() {
        let finst = UniqueId::new(7, 7);
        register(finst);
        add_tablet_commit_info(finst, TabletCommitInfo {
            tablet_id: 1,
            backend_id: 100,
        });
        add_tablet_commit_info(finst, TabletCommitInfo {
            tablet_id: 1,
            backend_id: 100,
        });
        assert_eq!(list_tablet_commit_infos(finst).len(), 1);
        unregister(finst);
        assert!(list_tablet_commit_infos(finst).is_empty());
    }

    #[test]
    fn load_counters_accumulate() {
        let finst = UniqueId::new(8, 8);
        register(finst);
        add_load_counters(finst, 10, 1024);
        add_load_counters(finst, 5, 512);
        assert_eq!(load_counters(finst), (15, 1536));
        unregister(finst);
    }

    #[test]
    fn load_counters_ignore_negative_and_saturate() {
        let finst = UniqueId::new(9, 9);
        register(finst);
        // A negative half must not eat into the other counter.
        add_load_counters(finst, -3, 256);
        assert_eq!(load_counters(finst), (0, 256));
        add_load_counters(finst, i64::MAX, i64::MAX);
        add_load_counters(finst, 1, 1);
        assert_eq!(load_counters(finst), (i64::MAX, i64::MAX));
        unregister(finst);
    }
}
