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
use crate::exec::node::ExecNodeBase;
use crate::runtime::runtime_state::RuntimeState;

/// Leaf that produces no rows; planners emit it for provably-empty inputs.
pub struct EmptySetNode;

impl EmptySetNode {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn open(&mut self, _state: &RuntimeState, _base: &mut ExecNodeBase) -> Result<()> {
        Ok(())
    }

    pub(crate) fn get_next(
        &mut self,
        _state: &RuntimeState,
        _base: &mut ExecNodeBase,
        chunk: &mut Chunk,
        eos: &mut bool,
    ) -> Result<()> {
        chunk.reset();
        *eos = true;
        Ok(())
    }
}
