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
//! Columnar and row-oriented carriers of inter-operator data.
//!
//! A [`Chunk`] wraps an arrow `RecordBatch` whose fields carry slot ids in
//! their metadata, so operators can address columns by slot regardless of
//! position. A [`RowBatch`] is the row-oriented rendition materialized at
//! the executor boundary for pull-mode consumers and row-serializing sinks.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, RecordBatch, StringArray, StringBuilder, UInt32Array,
};
use arrow::compute;
use arrow::datatypes::{DataType, SchemaRef};

use crate::common::ids::SlotId;
use crate::common::status::{Result, Status};
use crate::runtime::descriptors::SLOT_ID_METADATA_KEY;

/// One value of a row, used for keys, predicates, and row materialization.
///
/// Equality and ordering are total: nulls sort first and floats compare by
/// their IEEE total order, so datums can serve as hash-map and sort keys.
#[derive(Clone, Debug)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    fn type_rank(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Bool(_) => 1,
            Datum::Int(_) => 2,
            Datum::Float(_) => 3,
            Datum::String(_) => 4,
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Datum::Null => 0u8.hash(state),
            Datum::Bool(v) => {
                1u8.hash(state);
                v.hash(state);
            }
            Datum::Int(v) => {
                2u8.hash(state);
                v.hash(state);
            }
            Datum::Float(v) => {
                3u8.hash(state);
                v.to_bits().hash(state);
            }
            Datum::String(v) => {
                4u8.hash(state);
                v.hash(state);
            }
        }
    }
}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Datum::Bool(a), Datum::Bool(b)) => a.cmp(b),
            (Datum::Int(a), Datum::Int(b)) => a.cmp(b),
            (Datum::Float(a), Datum::Float(b)) => a.total_cmp(b),
            (Datum::Int(a), Datum::Float(b)) => (*a as f64).total_cmp(b),
            (Datum::Float(a), Datum::Int(b)) => a.total_cmp(&(*b as f64)),
            (Datum::String(a), Datum::String(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("\\N"),
            Datum::Bool(v) => write!(f, "{}", v),
            Datum::Int(v) => write!(f, "{}", v),
            Datum::Float(v) => write!(f, "{}", v),
            Datum::String(v) => f.write_str(v),
        }
    }
}

fn slot_id_to_index_from_schema(schema: &SchemaRef) -> Result<HashMap<SlotId, usize>> {
    let mut map = HashMap::with_capacity(schema.fields().len());
    for (index, field) in schema.fields().iter().enumerate() {
        let Some(raw) = field.metadata().get(SLOT_ID_METADATA_KEY) else {
            continue;
        };
        let slot_id: SlotId = raw.parse().map_err(Status::internal_error)?;
        if map.insert(slot_id, index).is_some() {
            return Err(Status::internal_error(format!(
                "duplicate slot id {} in chunk schema",
                slot_id
            )));
        }
    }
    Ok(map)
}

/// A chunk of rows held as an arrow `RecordBatch`.
#[derive(Clone, Debug)]
pub struct Chunk {
    batch: RecordBatch,
    slot_id_to_index: Arc<HashMap<SlotId, usize>>,
}

impl Chunk {
    pub fn try_new(batch: RecordBatch) -> Result<Self> {
        let slot_id_to_index = slot_id_to_index_from_schema(&batch.schema())?;
        Ok(Self {
            batch,
            slot_id_to_index: Arc::new(slot_id_to_index),
        })
    }

    /// Zero-row chunk with the given layout.
    pub fn empty(schema: SchemaRef) -> Result<Self> {
        Self::try_new(RecordBatch::new_empty(schema))
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// Drop all rows, keeping the layout. The chunk object is reused across
    /// `get_next` calls; backing buffers are released here.
    pub fn reset(&mut self) {
        self.batch = RecordBatch::new_empty(self.batch.schema());
    }

    pub fn column(&self, index: usize) -> Result<&ArrayRef> {
        self.batch
            .columns()
            .get(index)
            .ok_or_else(|| Status::internal_error(format!("column index {} out of range", index)))
    }

    pub fn column_index_by_slot_id(&self, slot_id: SlotId) -> Option<usize> {
        self.slot_id_to_index.get(&slot_id).copied()
    }

    pub fn column_by_slot_id(&self, slot_id: SlotId) -> Result<&ArrayRef> {
        let index = self.column_index_by_slot_id(slot_id).ok_or_else(|| {
            Status::internal_error(format!("slot id {} not found in chunk", slot_id))
        })?;
        self.column(index)
    }

    /// Logical memory footprint of the backing arrays.
    pub fn memory_usage(&self) -> usize {
        self.batch.get_array_memory_size()
    }

    /// Keep only the first `len` rows (zero-copy slice).
    pub fn truncate(&mut self, len: usize) {
        if len < self.batch.num_rows() {
            self.batch = self.batch.slice(0, len);
        }
    }

    /// Read one cell as a datum.
    pub fn datum(&self, column: usize, row: usize) -> Result<Datum> {
        let array = self.column(column)?;
        datum_at(array, row)
    }

    pub fn datum_by_slot_id(&self, slot_id: SlotId, row: usize) -> Result<Datum> {
        let array = self.column_by_slot_id(slot_id)?;
        datum_at(array, row)
    }

    /// Materialize one row across all columns.
    pub fn row_datums(&self, row: usize) -> Result<Vec<Datum>> {
        let mut out = Vec::with_capacity(self.num_columns());
        for column in self.batch.columns() {
            out.push(datum_at(column, row)?);
        }
        Ok(out)
    }

    /// Gather the given rows into a new chunk with the same layout.
    pub fn take(&self, row_indices: &[u32]) -> Result<Chunk> {
        let indices = UInt32Array::from(row_indices.to_vec());
        let mut columns = Vec::with_capacity(self.num_columns());
        for column in self.batch.columns() {
            let taken = compute::take(column.as_ref(), &indices, None)
                .map_err(|e| Status::internal_error(format!("take rows: {}", e)))?;
            columns.push(taken);
        }
        let batch = RecordBatch::try_new(self.batch.schema(), columns)
            .map_err(|e| Status::internal_error(format!("rebuild record batch: {}", e)))?;
        Chunk::try_new(batch)
    }

    /// Re-shape to a target layout by resolving each target field's slot id
    /// against this chunk. Storage readers hand back chunks in tablet order;
    /// this projects them into the scan node's tuple order.
    pub fn project_to_schema(&self, schema: SchemaRef) -> Result<Chunk> {
        let mut columns = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let raw = field.metadata().get(SLOT_ID_METADATA_KEY).ok_or_else(|| {
                Status::internal_error(format!("field '{}' carries no slot id", field.name()))
            })?;
            let slot_id: SlotId = raw.parse().map_err(Status::internal_error)?;
            let column = self.column_by_slot_id(slot_id)?;
            if column.data_type() != field.data_type() {
                return Err(Status::internal_error(format!(
                    "slot {} type mismatch: chunk has {}, layout wants {}",
                    slot_id,
                    column.data_type(),
                    field.data_type()
                )));
            }
            columns.push(Arc::clone(column));
        }
        let batch = RecordBatch::try_new(schema, columns)
            .map_err(|e| Status::internal_error(format!("project chunk: {}", e)))?;
        Chunk::try_new(batch)
    }

    /// Build a chunk from materialized rows, one datum per schema field.
    pub fn from_rows(schema: SchemaRef, rows: &[Vec<Datum>]) -> Result<Chunk> {
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
        for (index, field) in schema.fields().iter().enumerate() {
            let column = match field.data_type() {
                DataType::Boolean => {
                    let mut builder = BooleanBuilder::with_capacity(rows.len());
                    for row in rows {
                        match row.get(index) {
                            Some(Datum::Bool(v)) => builder.append_value(*v),
                            Some(Datum::Null) | None => builder.append_null(),
                            Some(other) => {
                                return Err(type_mismatch(field.name(), "BOOLEAN", other));
                            }
                        }
                    }
                    Arc::new(builder.finish()) as ArrayRef
                }
                DataType::Int64 => {
                    let mut builder = Int64Builder::with_capacity(rows.len());
                    for row in rows {
                        match row.get(index) {
                            Some(Datum::Int(v)) => builder.append_value(*v),
                            Some(Datum::Null) | None => builder.append_null(),
                            Some(other) => {
                                return Err(type_mismatch(field.name(), "BIGINT", other));
                            }
                        }
                    }
                    Arc::new(builder.finish()) as ArrayRef
                }
                DataType::Float64 => {
                    let mut builder = Float64Builder::with_capacity(rows.len());
                    for row in rows {
                        match row.get(index) {
                            Some(Datum::Float(v)) => builder.append_value(*v),
                            Some(Datum::Int(v)) => builder.append_value(*v as f64),
                            Some(Datum::Null) | None => builder.append_null(),
                            Some(other) => {
                                return Err(type_mismatch(field.name(), "DOUBLE", other));
                            }
                        }
                    }
                    Arc::new(builder.finish()) as ArrayRef
                }
                DataType::Utf8 => {
                    let mut builder = StringBuilder::new();
                    for row in rows {
                        match row.get(index) {
                            Some(Datum::String(v)) => builder.append_value(v),
                            Some(Datum::Null) | None => builder.append_null(),
                            Some(other) => {
                                return Err(type_mismatch(field.name(), "VARCHAR", other));
                            }
                        }
                    }
                    Arc::new(builder.finish()) as ArrayRef
                }
                other => {
                    return Err(Status::internal_error(format!(
                        "unsupported column type {} for field '{}'",
                        other,
                        field.name()
                    )));
                }
            };
            columns.push(column);
        }
        let batch = RecordBatch::try_new(schema, columns)
            .map_err(|e| Status::internal_error(format!("build record batch: {}", e)))?;
        Chunk::try_new(batch)
    }

    /// Assemble a chunk for a composite layout by resolving each field's
    /// slot id against a list of equal-length source chunks, first match
    /// wins. Joins use this to stitch probe-side and build-side columns.
    pub fn compose(schema: SchemaRef, parts: &[&Chunk]) -> Result<Chunk> {
        let mut columns = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let raw = field.metadata().get(SLOT_ID_METADATA_KEY).ok_or_else(|| {
                Status::internal_error(format!("field '{}' carries no slot id", field.name()))
            })?;
            let slot_id: SlotId = raw.parse().map_err(Status::internal_error)?;
            let column = parts
                .iter()
                .find_map(|part| {
                    part.column_index_by_slot_id(slot_id)
                        .and_then(|index| part.batch.columns().get(index).cloned())
                })
                .ok_or_else(|| {
                    Status::internal_error(format!(
                        "slot {} not found in any composed part",
                        slot_id
                    ))
                })?;
            columns.push(column);
        }
        let batch = RecordBatch::try_new(schema, columns)
            .map_err(|e| Status::internal_error(format!("compose chunk: {}", e)))?;
        Chunk::try_new(batch)
    }
}

fn type_mismatch(field: &str, expected: &str, got: &Datum) -> Status {
    Status::internal_error(format!(
        "field '{}' expects {}, got datum {:?}",
        field, expected, got
    ))
}

fn datum_at(array: &ArrayRef, row: usize) -> Result<Datum> {
    if row >= array.len() {
        return Err(Status::internal_error(format!(
            "row index {} out of range ({} rows)",
            row,
            array.len()
        )));
    }
    if array.is_null(row) {
        return Ok(Datum::Null);
    }
    let datum = match array.data_type() {
        DataType::Boolean => {
            let typed = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| Status::internal_error("boolean column downcast failed"))?;
            Datum::Bool(typed.value(row))
        }
        DataType::Int64 => {
            let typed = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| Status::internal_error("int64 column downcast failed"))?;
            Datum::Int(typed.value(row))
        }
        DataType::Float64 => {
            let typed = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| Status::internal_error("float64 column downcast failed"))?;
            Datum::Float(typed.value(row))
        }
        DataType::Utf8 => {
            let typed = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| Status::internal_error("string column downcast failed"))?;
            Datum::String(typed.value(row).to_string())
        }
        other => {
            return Err(Status::internal_error(format!(
                "unsupported column type {}",
                other
            )));
        }
    };
    Ok(datum)
}

/// Row-oriented carrier reused across `get_next` calls at the executor
/// boundary. Reset at the top of each call, freed in close.
#[derive(Clone, Debug)]
pub struct RowBatch {
    capacity: usize,
    rows: Vec<Vec<Datum>>,
}

impl RowBatch {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rows: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Datum>] {
        &self.rows
    }

    pub fn reset(&mut self) {
        self.rows.clear();
    }

    /// Replace contents with the rows of a chunk.
    pub fn fill_from_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        self.rows.clear();
        self.rows.reserve(chunk.len());
        for row in 0..chunk.len() {
            self.rows.push(chunk.row_datums(row)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, Schema};

    fn test_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("k", DataType::Int64, false).with_metadata(HashMap::from([(
                SLOT_ID_METADATA_KEY.to_string(),
                "0".to_string(),
            )])),
            Field::new("v", DataType::Utf8, true).with_metadata(HashMap::from([(
                SLOT_ID_METADATA_KEY.to_string(),
                "1".to_string(),
            )])),
        ]))
    }

    fn test_chunk() -> Chunk {
        Chunk::from_rows(test_schema(), &[
            vec![Datum::Int(1), Datum::String("a".to_string())],
            vec![Datum::Int(2), Datum::Null],
            vec![Datum::Int(3), Datum::String("c".to_string())],
        ])
        .expect("build chunk")
    }

    #[test]
    fn from_rows_round_trips_datums() {
        let chunk = test_chunk();
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.datum(0, 1).expect("datum"), Datum::Int(2));
        assert_eq!(chunk.datum(1, 1).expect("datum"), Datum::Null);
        assert_eq!(
            chunk.datum_by_slot_id(SlotId::new(1), 2).expect("datum"),
            Datum::String("c".to_string())
        );
    }

    #[test]
    fn take_gathers_rows() {
        let chunk = test_chunk();
        let taken = chunk.take(&[2, 0]).expect("take");
        assert_eq!(taken.len(), 2);
        assert_eq!(taken.datum(0, 0).expect("datum"), Datum::Int(3));
        assert_eq!(taken.datum(0, 1).expect("datum"), Datum::Int(1));
    }

    #[test]
    fn reset_keeps_layout() {
        let mut chunk = test_chunk();
        chunk.reset();
        assert!(chunk.is_empty());
        assert_eq!(chunk.num_columns(), 2);
        assert!(chunk.column_index_by_slot_id(SlotId::new(1)).is_some());
    }

    #[test]
    fn datum_ordering_sorts_nulls_first() {
        let mut values = vec![Datum::Int(3), Datum::Null, Datum::Int(1)];
        values.sort();
        assert_eq!(values, vec![Datum::Null, Datum::Int(1), Datum::Int(3)]);
    }

    #[test]
    fn row_batch_fills_from_chunk() {
        let chunk = test_chunk();
        let mut batch = RowBatch::new(1024);
        batch.fill_from_chunk(&chunk).expect("fill");
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.rows()[0][0], Datum::Int(1));
        batch.reset();
        assert!(batch.is_empty());
    }
}
