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
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-backend execution statistics keyed by backend id.
#[derive(Clone, Debug, Default)]
pub struct NodeStatistics {
    peak_memory_bytes: i64,
}

impl NodeStatistics {
    pub fn add_peak_memory(&mut self, bytes: i64) {
        self.peak_memory_bytes = self.peak_memory_bytes.max(bytes);
    }

    pub fn peak_memory_bytes(&self) -> i64 {
        self.peak_memory_bytes
    }
}

/// Flat bag of statistics a fragment attaches to outgoing sink messages so
/// the parent fragment (and finally the coordinator) can aggregate work done
/// for the whole query.
#[derive(Clone, Debug, Default)]
pub struct QueryStatistics {
    scan_rows: i64,
    scan_bytes: i64,
    cpu_ms: i64,
    returned_rows: i64,
    nodes_statistics: HashMap<i64, NodeStatistics>,
}

/// Shared handle: the executor refreshes it, sinks read it while sending.
pub type QueryStatisticsRef = Arc<Mutex<QueryStatistics>>;

impl QueryStatistics {
    pub fn new_shared() -> QueryStatisticsRef {
        Arc::new(Mutex::new(QueryStatistics::default()))
    }

    pub fn clear(&mut self) {
        self.scan_rows = 0;
        self.scan_bytes = 0;
        self.cpu_ms = 0;
        self.returned_rows = 0;
        self.nodes_statistics.clear();
    }

    pub fn add_scan_rows(&mut self, rows: i64) {
        self.scan_rows += rows;
    }

    pub fn add_scan_bytes(&mut self, bytes: i64) {
        self.scan_bytes += bytes;
    }

    pub fn add_cpu_ms(&mut self, cpu_ms: i64) {
        self.cpu_ms += cpu_ms;
    }

    pub fn add_returned_rows(&mut self, rows: i64) {
        self.returned_rows += rows;
    }

    pub fn add_nodes_statistics(&mut self, backend_id: i64) -> &mut NodeStatistics {
        self.nodes_statistics.entry(backend_id).or_default()
    }

    pub fn scan_rows(&self) -> i64 {
        self.scan_rows
    }

    pub fn scan_bytes(&self) -> i64 {
        self.scan_bytes
    }

    pub fn cpu_ms(&self) -> i64 {
        self.cpu_ms
    }

    pub fn returned_rows(&self) -> i64 {
        self.returned_rows
    }

    pub fn nodes_statistics(&self, backend_id: i64) -> Option<&NodeStatistics> {
        self.nodes_statistics.get(&backend_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resets_everything() {
        let mut stats = QueryStatistics::default();
        stats.add_scan_rows(100);
        stats.add_scan_bytes(4096);
        stats.add_cpu_ms(12);
        stats.add_nodes_statistics(1).add_peak_memory(1 << 20);
        stats.clear();
        assert_eq!(stats.scan_rows(), 0);
        assert_eq!(stats.scan_bytes(), 0);
        assert_eq!(stats.cpu_ms(), 0);
        assert!(stats.nodes_statistics(1).is_none());
    }

    #[test]
    fn node_statistics_keep_max_peak() {
        let mut stats = QueryStatistics::default();
        stats.add_nodes_statistics(3).add_peak_memory(100);
        stats.add_nodes_statistics(3).add_peak_memory(50);
        assert_eq!(
            stats.nodes_statistics(3).expect("backend 3").peak_memory_bytes(),
            100
        );
    }
}
