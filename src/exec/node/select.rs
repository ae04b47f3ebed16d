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

/// Pass-through node applying its conjuncts on top of an arbitrary child.
/// The conjunct filter itself runs in the shared node dispatch.
pub struct SelectNode {
    child_eos: bool,
}

impl SelectNode {
    pub fn new() -> Self {
        Self { child_eos: false }
    }

    pub(crate) fn open(
        &mut self,
        state: &RuntimeState,
        _base: &mut ExecNodeBase,
        children: &mut [ExecNode],
    ) -> Result<()> {
        children[0].open(state)
    }

    pub(crate) fn get_next(
        &mut self,
        state: &RuntimeState,
        _base: &mut ExecNodeBase,
        children: &mut [ExecNode],
        chunk: &mut Chunk,
        eos: &mut bool,
    ) -> Result<()> {
        if self.child_eos {
            chunk.reset();
            *eos = true;
            return Ok(());
        }
        children[0].get_next(state, chunk, &mut self.child_eos)?;
        if self.child_eos && chunk.is_empty() {
            *eos = true;
        }
        Ok(())
    }
}
