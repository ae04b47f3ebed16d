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
//! Predicate-evaluation contract of the execution core.
//!
//! The core only needs slot references, literals, and simple predicates for
//! conjuncts, join keys, and output exprs; richer expression machinery is an
//! external collaborator.

use crate::common::ids::SlotId;
use crate::common::status::{Result, Status};
use crate::exec::chunk::{Chunk, Datum};
use crate::plan::{BinaryPredOp, ExprDesc};

#[derive(Clone, Debug)]
pub enum Expr {
    SlotRef(SlotId),
    Literal(Datum),
    BinaryPred {
        op: BinaryPredOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IsNullPred {
        negated: bool,
        child: Box<Expr>,
    },
}

impl Expr {
    pub fn from_desc(desc: &ExprDesc) -> Result<Expr> {
        let expr = match desc {
            ExprDesc::SlotRef { slot_id } => {
                Expr::SlotRef(SlotId::try_from(*slot_id).map_err(Status::invalid_argument)?)
            }
            ExprDesc::IntLiteral { value } => Expr::Literal(Datum::Int(*value)),
            ExprDesc::FloatLiteral { value } => Expr::Literal(Datum::Float(*value)),
            ExprDesc::StringLiteral { value } => Expr::Literal(Datum::String(value.clone())),
            ExprDesc::BoolLiteral { value } => Expr::Literal(Datum::Bool(*value)),
            ExprDesc::NullLiteral => Expr::Literal(Datum::Null),
            ExprDesc::BinaryPred { op, left, right } => Expr::BinaryPred {
                op: *op,
                left: Box::new(Expr::from_desc(left)?),
                right: Box::new(Expr::from_desc(right)?),
            },
            ExprDesc::IsNullPred { negated, child } => Expr::IsNullPred {
                negated: *negated,
                child: Box::new(Expr::from_desc(child)?),
            },
        };
        Ok(expr)
    }

    pub fn from_descs(descs: &[ExprDesc]) -> Result<Vec<Expr>> {
        descs.iter().map(Expr::from_desc).collect()
    }

    /// Evaluate against one row of a chunk.
    pub fn evaluate(&self, chunk: &Chunk, row: usize) -> Result<Datum> {
        match self {
            Expr::SlotRef(slot_id) => chunk.datum_by_slot_id(*slot_id, row),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::BinaryPred { op, left, right } => {
                let lhs = left.evaluate(chunk, row)?;
                let rhs = right.evaluate(chunk, row)?;
                // SQL comparison: null operand yields null.
                if lhs.is_null() || rhs.is_null() {
                    return Ok(Datum::Null);
                }
                let ord = lhs.cmp(&rhs);
                let result = match op {
                    BinaryPredOp::Eq => ord.is_eq(),
                    BinaryPredOp::Ne => ord.is_ne(),
                    BinaryPredOp::Lt => ord.is_lt(),
                    BinaryPredOp::Le => ord.is_le(),
                    BinaryPredOp::Gt => ord.is_gt(),
                    BinaryPredOp::Ge => ord.is_ge(),
                };
                Ok(Datum::Bool(result))
            }
            Expr::IsNullPred { negated, child } => {
                let value = child.evaluate(chunk, row)?;
                Ok(Datum::Bool(value.is_null() != *negated))
            }
        }
    }

    /// Evaluate as a predicate; null counts as false.
    pub fn evaluate_predicate(&self, chunk: &Chunk, row: usize) -> Result<bool> {
        match self.evaluate(chunk, row)? {
            Datum::Bool(v) => Ok(v),
            Datum::Null => Ok(false),
            other => Err(Status::invalid_argument(format!(
                "predicate produced non-boolean datum {:?}",
                other
            ))),
        }
    }
}

/// True when the row passes every conjunct.
pub fn eval_conjuncts(conjuncts: &[Expr], chunk: &Chunk, row: usize) -> Result<bool> {
    for conjunct in conjuncts {
        if !conjunct.evaluate_predicate(chunk, row)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Filter a chunk down to the rows passing every conjunct.
pub fn filter_chunk(conjuncts: &[Expr], chunk: &Chunk) -> Result<Chunk> {
    if conjuncts.is_empty() {
        return Ok(chunk.clone());
    }
    let mut keep = Vec::with_capacity(chunk.len());
    for row in 0..chunk.len() {
        if eval_conjuncts(conjuncts, chunk, row)? {
            keep.push(row as u32);
        }
    }
    if keep.len() == chunk.len() {
        return Ok(chunk.clone());
    }
    chunk.take(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan;

    fn chunk_with_ints() -> Chunk {
        use crate::runtime::descriptors::SLOT_ID_METADATA_KEY;
        use arrow::datatypes::{DataType, Field, Schema};
        use std::collections::HashMap;
        use std::sync::Arc;

        let schema = Arc::new(Schema::new(vec![
            Field::new("x", DataType::Int64, true).with_metadata(HashMap::from([(
                SLOT_ID_METADATA_KEY.to_string(),
                "0".to_string(),
            )])),
        ]));
        Chunk::from_rows(schema, &[
            vec![Datum::Int(1)],
            vec![Datum::Int(5)],
            vec![Datum::Null],
        ])
        .expect("build chunk")
    }

    #[test]
    fn binary_pred_filters_rows() {
        let chunk = chunk_with_ints();
        let expr = Expr::from_desc(&plan::ExprDesc::BinaryPred {
            op: plan::BinaryPredOp::Ge,
            left: Box::new(plan::ExprDesc::SlotRef { slot_id: 0 }),
            right: Box::new(plan::ExprDesc::IntLiteral { value: 2 }),
        })
        .expect("lower expr");
        let filtered = filter_chunk(&[expr], &chunk).expect("filter");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.datum(0, 0).expect("datum"), Datum::Int(5));
    }

    #[test]
    fn null_comparison_is_false() {
        let chunk = chunk_with_ints();
        let expr = Expr::from_desc(&plan::ExprDesc::BinaryPred {
            op: plan::BinaryPredOp::Eq,
            left: Box::new(plan::ExprDesc::SlotRef { slot_id: 0 }),
            right: Box::new(plan::ExprDesc::NullLiteral),
        })
        .expect("lower expr");
        for row in 0..chunk.len() {
            assert!(!expr.evaluate_predicate(&chunk, row).expect("eval"));
        }
    }

    #[test]
    fn is_null_pred_matches_nulls() {
        let chunk = chunk_with_ints();
        let expr = Expr::from_desc(&plan::ExprDesc::IsNullPred {
            negated: false,
            child: Box::new(plan::ExprDesc::SlotRef { slot_id: 0 }),
        })
        .expect("lower expr");
        let filtered = filter_chunk(&[expr], &chunk).expect("filter");
        assert_eq!(filtered.len(), 1);
        assert!(filtered.datum(0, 0).expect("datum").is_null());
    }
}
