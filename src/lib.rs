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
//! Basalt: per-instance query fragment execution core of a distributed
//! analytic database backend.
//!
//! A coordinator slices a query plan into fragments and submits one
//! request per fragment instance; the [`FragmentExecutor`] prepares the
//! operator tree from it, drives it into a sink or yields batches to a
//! caller, handles cancellation and failure, and reports progress back.

pub mod common;
pub mod exec;
pub mod plan;
pub mod runtime;

pub use common::app_config as basalt_config;
pub use common::logging as basalt_logging;
pub use common::status::{Result, Status, StatusCode};
pub use common::types::UniqueId;
pub use runtime::exec_env::ExecEnv;
pub use runtime::fragment_executor::{CancelReason, FragmentExecutor, ReportStatusCallback};
