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
//! Logical memory accounting for the instance → query → process chain.
//!
//! Trackers record only bytes the caller reports, not allocator state.
//! A tracker charges itself and every ancestor; the query-level tracker
//! usually carries the request's byte budget, and `try_consume` refuses a
//! charge that would push any budgeted tracker in the chain over it.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::common::status::{Result, Status};

#[derive(Debug)]
pub struct MemTracker {
    label: String,
    limit: Option<i64>,
    parent: Option<Arc<MemTracker>>,
    consumption: AtomicI64,
    peak: AtomicI64,
}

impl MemTracker {
    /// Root tracker with no parent and no budget.
    pub fn new_root(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            limit: None,
            parent: None,
            consumption: AtomicI64::new(0),
            peak: AtomicI64::new(0),
        })
    }

    /// Child tracker with no budget of its own.
    pub fn new_child(label: impl Into<String>, parent: &Arc<MemTracker>) -> Arc<Self> {
        Self::new_child_with_limit(label, -1, parent)
    }

    /// Child tracker with a byte budget; a negative limit means unbudgeted.
    pub fn new_child_with_limit(
        label: impl Into<String>,
        limit: i64,
        parent: &Arc<MemTracker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            limit: (limit >= 0).then_some(limit),
            parent: Some(Arc::clone(parent)),
            consumption: AtomicI64::new(0),
            peak: AtomicI64::new(0),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn current(&self) -> i64 {
        self.consumption.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Charge this tracker and all ancestors unconditionally.
    pub fn consume(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        let mut node = Some(self);
        while let Some(tracker) = node {
            let updated = tracker.consumption.fetch_add(bytes, Ordering::AcqRel) + bytes;
            tracker.peak.fetch_max(updated, Ordering::AcqRel);
            node = tracker.parent.as_deref();
        }
    }

    /// Charge the chain, refusing when this tracker or any ancestor would
    /// go over its budget. Nothing is recorded on refusal.
    pub fn try_consume(&self, bytes: i64) -> Result<()> {
        if bytes <= 0 {
            return Ok(());
        }
        let mut node = Some(self);
        while let Some(tracker) = node {
            if let Some(limit) = tracker.limit {
                if tracker.current() + bytes > limit {
                    return Err(Status::mem_limit_exceeded(format!(
                        "memory limit exceeded on tracker '{}': limit={} consumed={} requested={}",
                        tracker.label,
                        limit,
                        tracker.current(),
                        bytes
                    )));
                }
            }
            node = tracker.parent.as_deref();
        }
        self.consume(bytes);
        Ok(())
    }

    /// Return bytes to this tracker and all ancestors.
    pub fn release(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        let mut node = Some(self);
        while let Some(tracker) = node {
            tracker.consumption.fetch_sub(bytes, Ordering::AcqRel);
            node = tracker.parent.as_deref();
        }
    }
}

static PROCESS_TRACKER: OnceLock<Arc<MemTracker>> = OnceLock::new();

/// Global process-level logical memory tracker.
pub fn process_mem_tracker() -> Arc<MemTracker> {
    Arc::clone(PROCESS_TRACKER.get_or_init(|| MemTracker::new_root("process")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_propagates_to_ancestors() {
        let root = MemTracker::new_root("root");
        let child = MemTracker::new_child("child", &root);
        child.consume(100);
        assert_eq!(child.current(), 100);
        assert_eq!(root.current(), 100);
        child.release(40);
        assert_eq!(child.current(), 60);
        assert_eq!(root.current(), 60);
        assert_eq!(root.peak(), 100);
    }

    #[test]
    fn try_consume_enforces_ancestor_limit() {
        let root = MemTracker::new_root("root");
        let query = MemTracker::new_child_with_limit("query", 128, &root);
        let instance = MemTracker::new_child("instance", &query);
        assert!(instance.try_consume(100).is_ok());
        let err = instance.try_consume(100).expect_err("over budget");
        assert!(err.is_mem_limit_exceeded());
        // Nothing was recorded for the failed attempt.
        assert_eq!(instance.current(), 100);
        assert_eq!(query.current(), 100);
    }

    #[test]
    fn negative_limit_means_unbudgeted() {
        let root = MemTracker::new_root("root");
        let child = MemTracker::new_child_with_limit("child", -1, &root);
        assert!(child.limit().is_none());
        assert!(child.try_consume(i64::MAX / 2).is_ok());
    }
}
