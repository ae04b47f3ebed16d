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
//! Immutable tuple and column layout metadata for one fragment.
//!
//! The descriptor table is materialized once from the coordinator request
//! (or borrowed from the query context) and shared read-only by every plan
//! node and sink of the instance.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::common::ids::{SlotId, TupleId};
use crate::common::status::{Result, Status};
use crate::plan;

/// Metadata key carrying the slot id on arrow schema fields.
pub const SLOT_ID_METADATA_KEY: &str = "slot_id";

#[derive(Clone, Debug)]
pub struct SlotDescriptor {
    pub id: SlotId,
    pub parent: TupleId,
    pub col_name: String,
    pub col_type: plan::ColumnType,
    pub nullable: bool,
}

impl SlotDescriptor {
    pub fn arrow_type(&self) -> DataType {
        match self.col_type {
            plan::ColumnType::Boolean => DataType::Boolean,
            plan::ColumnType::Bigint => DataType::Int64,
            plan::ColumnType::Double => DataType::Float64,
            plan::ColumnType::Varchar => DataType::Utf8,
        }
    }

    pub fn arrow_field(&self) -> Field {
        Field::new(self.col_name.clone(), self.arrow_type(), self.nullable).with_metadata(
            HashMap::from([(SLOT_ID_METADATA_KEY.to_string(), self.id.to_string())]),
        )
    }
}

#[derive(Clone, Debug)]
pub struct TupleDescriptor {
    pub id: TupleId,
    /// Slots in coordinator order.
    pub slots: Vec<SlotDescriptor>,
}

/// Descriptor table shared by all nodes of one fragment instance.
#[derive(Clone, Debug, Default)]
pub struct DescriptorTbl {
    tuples: HashMap<TupleId, TupleDescriptor>,
    slots: HashMap<SlotId, SlotDescriptor>,
}

impl DescriptorTbl {
    pub fn create(desc: &plan::DescriptorTable) -> Result<Arc<Self>> {
        let mut tuples: HashMap<TupleId, TupleDescriptor> = HashMap::new();
        for tuple in &desc.tuple_descriptors {
            let id = TupleId::try_from(tuple.id).map_err(Status::invalid_argument)?;
            if tuples
                .insert(id, TupleDescriptor {
                    id,
                    slots: Vec::new(),
                })
                .is_some()
            {
                return Err(Status::invalid_argument(format!(
                    "duplicate tuple descriptor {}",
                    tuple.id
                )));
            }
        }

        let mut slots: HashMap<SlotId, SlotDescriptor> = HashMap::new();
        for slot in &desc.slot_descriptors {
            let id = SlotId::try_from(slot.id).map_err(Status::invalid_argument)?;
            let parent = TupleId::try_from(slot.parent).map_err(Status::invalid_argument)?;
            let descriptor = SlotDescriptor {
                id,
                parent,
                col_name: slot.col_name.clone(),
                col_type: slot.col_type,
                nullable: slot.nullable,
            };
            let tuple = tuples.get_mut(&parent).ok_or_else(|| {
                Status::invalid_argument(format!(
                    "slot {} references unknown tuple {}",
                    slot.id, slot.parent
                ))
            })?;
            tuple.slots.push(descriptor.clone());
            if slots.insert(id, descriptor).is_some() {
                return Err(Status::invalid_argument(format!(
                    "duplicate slot descriptor {}",
                    slot.id
                )));
            }
        }

        Ok(Arc::new(Self { tuples, slots }))
    }

    pub fn tuple_descriptor(&self, id: TupleId) -> Option<&TupleDescriptor> {
        self.tuples.get(&id)
    }

    pub fn slot_descriptor(&self, id: SlotId) -> Option<&SlotDescriptor> {
        self.slots.get(&id)
    }
}

/// Ordered tuple layout of the rows an operator produces.
#[derive(Clone, Debug, Default)]
pub struct RowDescriptor {
    tuple_ids: Vec<TupleId>,
}

impl RowDescriptor {
    pub fn new(tuple_ids: Vec<TupleId>) -> Self {
        Self { tuple_ids }
    }

    pub fn from_wire(row_tuples: &[i32]) -> Result<Self> {
        let mut tuple_ids = Vec::with_capacity(row_tuples.len());
        for id in row_tuples {
            tuple_ids.push(TupleId::try_from(*id).map_err(Status::invalid_argument)?);
        }
        Ok(Self { tuple_ids })
    }

    pub fn tuple_ids(&self) -> &[TupleId] {
        &self.tuple_ids
    }

    /// Arrow schema of the row: tuple slot columns in coordinator order,
    /// each field tagged with its slot id.
    pub fn arrow_schema(&self, desc_tbl: &DescriptorTbl) -> Result<SchemaRef> {
        let mut fields = Vec::new();
        for tuple_id in &self.tuple_ids {
            let tuple = desc_tbl.tuple_descriptor(*tuple_id).ok_or_else(|| {
                Status::invalid_argument(format!("row references unknown tuple {}", tuple_id))
            })?;
            for slot in &tuple.slots {
                fields.push(slot.arrow_field());
            }
        }
        Ok(Arc::new(Schema::new(fields)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> plan::DescriptorTable {
        plan::DescriptorTable {
            tuple_descriptors: vec![plan::TupleDescriptorDesc { id: 0 }],
            slot_descriptors: vec![
                plan::SlotDescriptorDesc {
                    id: 0,
                    parent: 0,
                    col_name: "k".to_string(),
                    col_type: plan::ColumnType::Bigint,
                    nullable: false,
                },
                plan::SlotDescriptorDesc {
                    id: 1,
                    parent: 0,
                    col_name: "v".to_string(),
                    col_type: plan::ColumnType::Varchar,
                    nullable: true,
                },
            ],
        }
    }

    #[test]
    fn create_builds_tuple_and_slot_maps() {
        let tbl = DescriptorTbl::create(&sample_table()).expect("create descriptor table");
        let tuple = tbl.tuple_descriptor(TupleId::new(0)).expect("tuple 0");
        assert_eq!(tuple.slots.len(), 2);
        assert_eq!(
            tbl.slot_descriptor(SlotId::new(1)).expect("slot 1").col_name,
            "v"
        );
    }

    #[test]
    fn row_descriptor_schema_carries_slot_ids() {
        let tbl = DescriptorTbl::create(&sample_table()).expect("create descriptor table");
        let row_desc = RowDescriptor::new(vec![TupleId::new(0)]);
        let schema = row_desc.arrow_schema(&tbl).expect("schema");
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(
            schema.field(0).metadata().get(SLOT_ID_METADATA_KEY),
            Some(&"0".to_string())
        );
    }

    #[test]
    fn unknown_tuple_is_invalid_argument() {
        let tbl = DescriptorTbl::create(&sample_table()).expect("create descriptor table");
        let row_desc = RowDescriptor::new(vec![TupleId::new(9)]);
        let err = row_desc.arrow_schema(&tbl).expect_err("unknown tuple");
        assert_eq!(
            err.code(),
            crate::common::status::StatusCode::InvalidArgument
        );
    }
}
