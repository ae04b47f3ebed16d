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
//! Runtime profile tree: named counters and timers mirroring the plan.
//!
//! Writers are counter increments with relaxed-atomic semantics; readers
//! (the reporter thread, pretty printing) may run concurrently and observe
//! a monotonic approximation.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// Measurement unit of a profile counter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CounterUnit {
    Unit,
    Bytes,
    TimeNs,
}

/// Counter name every profile uses for its wall-clock activity.
pub const TOTAL_TIME_COUNTER: &str = "TotalTime";

#[derive(Clone, Debug)]
pub struct RuntimeProfile {
    inner: Arc<RuntimeProfileInner>,
}

#[derive(Debug)]
struct RuntimeProfileInner {
    name: RwLock<String>,
    counters: Mutex<HashMap<String, CounterRef>>,
    info_strings: Mutex<Vec<(String, String)>>,
    children: Mutex<Vec<RuntimeProfile>>,
    child_map: Mutex<HashMap<String, RuntimeProfile>>,
    /// Percent of root total time spent in this node excluding children,
    /// in basis points; filled by `compute_time_in_profile`.
    local_time_bp: AtomicI64,
}

impl RuntimeProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RuntimeProfileInner {
                name: RwLock::new(name.into()),
                counters: Mutex::new(HashMap::new()),
                info_strings: Mutex::new(Vec::new()),
                children: Mutex::new(Vec::new()),
                child_map: Mutex::new(HashMap::new()),
                local_time_bp: AtomicI64::new(0),
            }),
        }
    }

    pub fn name(&self) -> String {
        self.inner
            .name
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let mut guard = self.inner.name.write().unwrap_or_else(|e| e.into_inner());
        *guard = name.into();
    }

    pub fn get_child(&self, name: &str) -> Option<RuntimeProfile> {
        self.inner
            .child_map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn children(&self) -> Vec<RuntimeProfile> {
        self.inner
            .children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn add_child(&self, child: RuntimeProfile) {
        let child_name = child.name();
        {
            let mut map = self
                .inner
                .child_map
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if map.contains_key(&child_name) {
                return;
            }
            map.insert(child_name.clone(), child.clone());
        }
        let mut children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        children.push(child);
    }

    /// Return the named child, creating it when absent.
    pub fn child(&self, name: impl Into<String>) -> RuntimeProfile {
        let name = name.into();
        if let Some(existing) = self.get_child(&name) {
            return existing;
        }
        let child = RuntimeProfile::new(name);
        self.add_child(child.clone());
        child
    }

    pub fn add_info_string(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let mut guard = self
            .inner
            .info_strings
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for entry in guard.iter_mut() {
            if entry.0 == key {
                entry.1 = value;
                return;
            }
        }
        guard.push((key, value));
    }

    pub fn get_info_string(&self, key: &str) -> Option<String> {
        self.inner
            .info_strings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn add_counter(&self, name: impl Into<String>, unit: CounterUnit) -> CounterRef {
        let name = name.into();
        let mut guard = self
            .inner
            .counters
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(counter) = guard.get(&name) {
            return Arc::clone(counter);
        }
        let counter = Arc::new(Counter::new(name.clone(), unit));
        guard.insert(name, Arc::clone(&counter));
        counter
    }

    pub fn counter(&self, name: &str) -> Option<CounterRef> {
        self.inner
            .counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn counter_value(&self, name: &str) -> i64 {
        self.counter(name).map(|c| c.value()).unwrap_or(0)
    }

    pub fn add_timer(&self, name: impl Into<String>) -> CounterRef {
        self.add_counter(name, CounterUnit::TimeNs)
    }

    pub fn total_time_counter(&self) -> CounterRef {
        self.add_timer(TOTAL_TIME_COUNTER)
    }

    pub fn scoped_timer(&self, name: impl Into<String>) -> ScopedTimer {
        let counter = self.add_timer(name);
        ScopedTimer::new(counter)
    }

    /// Compute each node's non-child share of the root's total time before
    /// pretty printing, as a percentage of the whole profile.
    pub fn compute_time_in_profile(&self) {
        let total = self.total_time_counter().value();
        self.compute_time_recursive(total);
    }

    fn compute_time_recursive(&self, total: i64) {
        let children = self.children();
        let child_time: i64 = children
            .iter()
            .map(|c| c.total_time_counter().value())
            .sum();
        let local = (self.total_time_counter().value() - child_time).max(0);
        let bp = if total > 0 {
            (local as f64 / total as f64 * 10_000.0) as i64
        } else {
            0
        };
        self.inner.local_time_bp.store(bp, Ordering::Relaxed);
        for child in children {
            child.compute_time_recursive(total);
        }
    }

    /// Render the profile tree, counters indented under their node.
    pub fn pretty_print(&self) -> String {
        let mut out = String::new();
        self.pretty_print_recursive(&mut out, 0);
        out
    }

    fn pretty_print_recursive(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let total = self.total_time_counter().value();
        let bp = self.inner.local_time_bp.load(Ordering::Relaxed);
        let _ = writeln!(
            out,
            "{}{}:(Active: {}, non-child: {}.{:02}%)",
            indent,
            self.name(),
            format_counter_value(total, CounterUnit::TimeNs),
            bp / 100,
            bp % 100
        );

        let info_strings = self
            .inner
            .info_strings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for (key, value) in info_strings {
            let _ = writeln!(out, "{}   {}: {}", indent, key, value);
        }

        let mut counters: Vec<CounterRef> = self
            .inner
            .counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        counters.sort_by(|a, b| a.name().cmp(b.name()));
        for counter in counters {
            if counter.name() == TOTAL_TIME_COUNTER {
                continue;
            }
            let _ = writeln!(
                out,
                "{}   - {}: {}",
                indent,
                counter.name(),
                format_counter_value(counter.value(), counter.unit())
            );
        }

        for child in self.children() {
            child.pretty_print_recursive(out, depth + 1);
        }
    }
}

pub type CounterRef = Arc<Counter>;

#[derive(Debug)]
pub struct Counter {
    name: String,
    unit: CounterUnit,
    value: AtomicI64,
}

impl Counter {
    pub fn new(name: impl Into<String>, unit: CounterUnit) -> Self {
        Self {
            name: name.into(),
            unit,
            value: AtomicI64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> CounterUnit {
        self.unit
    }

    pub fn add(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Alias for [`add`](Self::add), matching counter-update call sites.
    pub fn update(&self, delta: i64) {
        self.add(delta);
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

pub struct ScopedTimer {
    counter: CounterRef,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(counter: CounterRef) -> Self {
        Self {
            counter,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed_ns = self.start.elapsed().as_nanos();
        self.counter.add(clamp_u128_to_i64(elapsed_ns));
    }
}

pub fn clamp_u128_to_i64(value: u128) -> i64 {
    if value > i64::MAX as u128 {
        i64::MAX
    } else {
        value as i64
    }
}

fn format_counter_value(value: i64, unit: CounterUnit) -> String {
    match unit {
        CounterUnit::Unit => value.to_string(),
        CounterUnit::Bytes => format_bytes(value),
        CounterUnit::TimeNs => format_time_ns(value),
    }
}

fn format_bytes(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let v = bytes as f64;
    if v.abs() >= GB {
        format!("{:.2} GB", v / GB)
    } else if v.abs() >= MB {
        format!("{:.2} MB", v / MB)
    } else if v.abs() >= KB {
        format!("{:.2} KB", v / KB)
    } else {
        format!("{} B", bytes)
    }
}

fn format_time_ns(ns: i64) -> String {
    const US: f64 = 1_000.0;
    const MS: f64 = 1_000_000.0;
    const S: f64 = 1_000_000_000.0;
    let v = ns as f64;
    if v.abs() >= S {
        format!("{:.3}s", v / S)
    } else if v.abs() >= MS {
        format!("{:.3}ms", v / MS)
    } else if v.abs() >= US {
        format!("{:.3}us", v / US)
    } else {
        format!("{}ns", ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_created_once() {
        let profile = RuntimeProfile::new("test");
        let a = profile.add_counter("Rows", CounterUnit::Unit);
        let b = profile.add_counter("Rows", CounterUnit::Unit);
        a.add(3);
        b.add(4);
        assert_eq!(profile.counter_value("Rows"), 7);
    }

    #[test]
    fn child_is_reused_by_name() {
        let profile = RuntimeProfile::new("parent");
        let a = profile.child("child");
        let b = profile.child("child");
        a.add_counter("X", CounterUnit::Unit).add(1);
        assert_eq!(b.counter_value("X"), 1);
        assert_eq!(profile.children().len(), 1);
    }

    #[test]
    fn compute_time_assigns_non_child_share() {
        let root = RuntimeProfile::new("root");
        let child = root.child("child");
        root.total_time_counter().set(1_000);
        child.total_time_counter().set(400);
        root.compute_time_in_profile();
        let printed = root.pretty_print();
        assert!(printed.contains("root:(Active: 1.000us, non-child: 60.00%)"));
        assert!(printed.contains("child:(Active: 400ns, non-child: 40.00%)"));
    }

    #[test]
    fn pretty_print_lists_counters() {
        let profile = RuntimeProfile::new("node");
        profile.add_counter("RowsProduced", CounterUnit::Unit).add(10);
        profile
            .add_counter("BytesRead", CounterUnit::Bytes)
            .add(4096);
        let printed = profile.pretty_print();
        assert!(printed.contains("- RowsProduced: 10"));
        assert!(printed.contains("- BytesRead: 4.00 KB"));
    }
}
