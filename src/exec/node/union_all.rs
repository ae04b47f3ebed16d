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
use crate::common::status::Result;
use crate::exec::chunk::Chunk;
use crate::exec::node::{ExecNode, ExecNodeBase};
use crate::runtime::runtime_state::RuntimeState;

/// Concatenates its children in order. Children share the output tuple
/// layout; chunks are re-shaped by slot id when a child's column order
/// differs.
pub struct UnionAllNode {
    child_idx: usize,
}

impl UnionAllNode {
    pub fn new() -> Self {
        Self { child_idx: 0 }
    }

    pub(crate) fn open(
        &mut self,
        state: &RuntimeState,
        _base: &mut ExecNodeBase,
        children: &mut [ExecNode],
    ) -> Result<()> {
        for child in children {
            child.open(state)?;
        }
        Ok(())
    }

    pub(crate) fn get_next(
        &mut self,
        state: &RuntimeState,
        base: &mut ExecNodeBase,
        children: &mut [ExecNode],
        chunk: &mut Chunk,
        eos: &mut bool,
    ) -> Result<()> {
        while self.child_idx < children.len() {
            let mut child_eos = false;
            chunk.reset();
            children[self.child_idx].get_next(state, chunk, &mut child_eos)?;
            if child_eos {
                self.child_idx += 1;
                continue;
            }
            if !chunk.is_empty() {
                if chunk.schema() != base.schema() {
                    *chunk = chunk.project_to_schema(base.schema())?;
                }
            }
            return Ok(());
        }
        chunk.reset();
        *eos = true;
        Ok(())
    }
}
