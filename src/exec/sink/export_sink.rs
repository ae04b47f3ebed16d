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
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::basalt_logging::warn;
use crate::common::status::{Result, Status};
use crate::exec::chunk::Chunk;
use crate::exec::expr::Expr;
use crate::exec::sink::{DataSink, render_rows};
use crate::plan::ExportSinkDesc;
use crate::runtime::profile::{CounterRef, CounterUnit, RuntimeProfile};
use crate::runtime::runtime_state::RuntimeState;

/// Writes the fragment's output as delimited text to a local file.
pub struct ExportSink {
    export_path: String,
    column_separator: String,
    line_delimiter: String,
    output_exprs: Vec<Expr>,
    writer: Option<BufWriter<File>>,
    profile: RuntimeProfile,
    rows_exported_counter: CounterRef,
}

impl ExportSink {
    pub fn new(desc: &ExportSinkDesc, output_exprs: Vec<Expr>) -> Self {
        let profile = RuntimeProfile::new("ExportSink");
        let rows_exported_counter = profile.add_counter("RowsExported", CounterUnit::Unit);
        Self {
            export_path: desc.export_path.clone(),
            column_separator: desc.column_separator.clone(),
            line_delimiter: desc.line_delimiter.clone(),
            output_exprs,
            writer: None,
            profile,
            rows_exported_counter,
        }
    }
}

impl DataSink for ExportSink {
    fn name(&self) -> &'static str {
        "ExportSink"
    }

    fn prepare(&mut self, _state: &RuntimeState) -> Result<()> {
        Ok(())
    }

    fn open(&mut self, _state: &RuntimeState) -> Result<()> {
        if let Some(parent) = Path::new(&self.export_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Status::internal_error(format!(
                    "create export directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let file = File::create(&self.export_path).map_err(|e| {
            Status::internal_error(format!("create export file {}: {}", self.export_path, e))
        })?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn send(&mut self, _state: &RuntimeState, chunk: &Chunk) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Status::internal_error("export sink not opened"))?;
        let rows = render_rows(chunk, &self.output_exprs, &self.column_separator)?;
        for row in &rows {
            writer
                .write_all(row.as_bytes())
                .and_then(|_| writer.write_all(self.line_delimiter.as_bytes()))
                .map_err(|e| {
                    Status::internal_error(format!("write export file {}: {}", self.export_path, e))
                })?;
        }
        self.rows_exported_counter.update(rows.len() as i64);
        Ok(())
    }

    fn close(&mut self, _state: &RuntimeState, exec_status: Status) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("flush export file {}: {}", self.export_path, e);
                return Err(Status::internal_error(format!(
                    "flush export file {}: {}",
                    self.export_path, e
                )));
            }
        }
        if !exec_status.is_ok() {
            // The partial file is left behind for the load layer to clean up.
            warn!(
                "export sink closed with status {}: {}",
                exec_status,
                self.export_path
            );
        }
        Ok(())
    }

    fn profile(&self) -> Option<&RuntimeProfile> {
        Some(&self.profile)
    }
}
