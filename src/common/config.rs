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
use crate::common::app_config;

pub(crate) fn status_report_interval() -> i64 {
    app_config::config().runtime.status_report_interval
}

pub(crate) fn exchange_wait_ms() -> u64 {
    app_config::config().runtime.exchange_wait_ms
}

pub(crate) fn result_buffer_capacity_rows() -> usize {
    app_config::config().runtime.result_buffer_capacity_rows
}

pub(crate) fn scratch_queue_capacity() -> usize {
    app_config::config().runtime.scratch_queue_capacity
}

pub(crate) fn default_query_mem_limit() -> i64 {
    app_config::config().runtime.default_query_mem_limit
}
