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
use std::fmt;

use thiserror::Error;

/// Classification of an execution outcome.
///
/// `EndOfFile` is special: returned from a sink `send` it means graceful
/// early termination and is not treated as an error by the fragment driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StatusCode {
    Ok,
    Cancelled,
    MemLimitExceeded,
    RpcError,
    InternalError,
    EndOfFile,
    InvalidArgument,
    RuntimeError,
    Aborted,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "Cancelled",
            StatusCode::MemLimitExceeded => "MemoryLimitExceeded",
            StatusCode::RpcError => "RpcError",
            StatusCode::InternalError => "InternalError",
            StatusCode::EndOfFile => "EndOfFile",
            StatusCode::InvalidArgument => "InvalidArgument",
            StatusCode::RuntimeError => "RuntimeError",
            StatusCode::Aborted => "Aborted",
        };
        f.write_str(s)
    }
}

/// Execution status carried across the executor, plan nodes, and sinks.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct Status {
    code: StatusCode,
    message: String,
}

pub type Result<T> = std::result::Result<T, Status>;

impl Status {
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: String::new(),
        }
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Cancelled,
            message: msg.into(),
        }
    }

    pub fn mem_limit_exceeded(msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::MemLimitExceeded,
            message: msg.into(),
        }
    }

    pub fn rpc_error(msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::RpcError,
            message: msg.into(),
        }
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::InternalError,
            message: msg.into(),
        }
    }

    pub fn end_of_file(msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::EndOfFile,
            message: msg.into(),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::InvalidArgument,
            message: msg.into(),
        }
    }

    pub fn runtime_error(msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::RuntimeError,
            message: msg.into(),
        }
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Aborted,
            message: msg.into(),
        }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == StatusCode::Cancelled
    }

    pub fn is_mem_limit_exceeded(&self) -> bool {
        self.code == StatusCode::MemLimitExceeded
    }

    pub fn is_end_of_file(&self) -> bool {
        self.code == StatusCode::EndOfFile
    }

    /// Convert into a `Result`, mapping OK to `Ok(())`.
    pub fn into_result(self) -> Result<()> {
        if self.is_ok() { Ok(()) } else { Err(self) }
    }

    /// Status of a completed `Result`, mapping `Ok(())` to OK.
    pub fn from_result(result: &Result<()>) -> Self {
        match result {
            Ok(()) => Status::ok(),
            Err(status) => status.clone(),
        }
    }

    /// Prefix the message with the originating plan node, keeping the code.
    pub fn with_node(self, node_id: i32) -> Self {
        Self {
            code: self.code,
            message: format!("node {}: {}", node_id, self.message),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_is_ok() {
        assert!(Status::ok().is_ok());
        assert!(Status::ok().into_result().is_ok());
    }

    #[test]
    fn end_of_file_is_not_ok() {
        let st = Status::end_of_file("reached limit");
        assert!(!st.is_ok());
        assert!(st.is_end_of_file());
    }

    #[test]
    fn with_node_prefixes_message() {
        let st = Status::invalid_argument("bad tuple").with_node(3);
        assert_eq!(st.code(), StatusCode::InvalidArgument);
        assert_eq!(st.message(), "node 3: bad tuple");
    }

    #[test]
    fn display_includes_code_and_message() {
        let st = Status::cancelled("user abort");
        assert_eq!(st.to_string(), "Cancelled: user abort");
    }
}
