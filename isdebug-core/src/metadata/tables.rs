//! The `#~` tables stream (ECMA-335 II.24.2.6).
//!
//! Only the tables up to and including `CustomAttribute` are laid out; every table
//! before it has to be sized to find where it starts, and nothing after it is read.

use crate::error::DecodeError;
use crate::reader::ReadAt;

pub const MODULE: u8 = 0x00;
pub const TYPE_REF: u8 = 0x01;
pub const TYPE_DEF: u8 = 0x02;
pub const FIELD_PTR: u8 = 0x03;
pub const FIELD: u8 = 0x04;
pub const METHOD_PTR: u8 = 0x05;
pub const METHOD_DEF: u8 = 0x06;
pub const PARAM_PTR: u8 = 0x07;
pub const PARAM: u8 = 0x08;
pub const INTERFACE_IMPL: u8 = 0x09;
pub const MEMBER_REF: u8 = 0x0a;
pub const CONSTANT: u8 = 0x0b;
pub const CUSTOM_ATTRIBUTE: u8 = 0x0c;
pub const DECL_SECURITY: u8 = 0x0e;
pub const STAND_ALONE_SIG: u8 = 0x11;
pub const EVENT: u8 = 0x14;
pub const PROPERTY: u8 = 0x17;
pub const MODULE_REF: u8 = 0x1a;
pub const TYPE_SPEC: u8 = 0x1b;
pub const ASSEMBLY: u8 = 0x20;
pub const ASSEMBLY_REF: u8 = 0x23;
pub const FILE: u8 = 0x26;
pub const EXPORTED_TYPE: u8 = 0x27;
pub const MANIFEST_RESOURCE: u8 = 0x28;
pub const GENERIC_PARAM: u8 = 0x2a;
pub const METHOD_SPEC: u8 = 0x2b;
pub const GENERIC_PARAM_CONSTRAINT: u8 = 0x2c;

const HEAP_STRINGS_WIDE: u8 = 0x01;
const HEAP_GUID_WIDE: u8 = 0x02;
const HEAP_BLOB_WIDE: u8 = 0x04;
const HEAP_EXTRA_DATA: u8 = 0x40;

/// A coded index: a tag selecting one of `tables` in the low bits, a row above them.
#[derive(Debug)]
pub struct CodedIndex {
    pub tag_bits: u32,
    pub tables: &'static [Option<u8>],
}

pub const TYPE_DEF_OR_REF: CodedIndex = CodedIndex {
    tag_bits: 2,
    tables: &[Some(TYPE_DEF), Some(TYPE_REF), Some(TYPE_SPEC)],
};

pub const HAS_CONSTANT: CodedIndex = CodedIndex {
    tag_bits: 2,
    tables: &[Some(FIELD), Some(PARAM), Some(PROPERTY)],
};

pub const HAS_CUSTOM_ATTRIBUTE: CodedIndex = CodedIndex {
    tag_bits: 5,
    tables: &[
        Some(METHOD_DEF),
        Some(FIELD),
        Some(TYPE_REF),
        Some(TYPE_DEF),
        Some(PARAM),
        Some(INTERFACE_IMPL),
        Some(MEMBER_REF),
        Some(MODULE),
        Some(DECL_SECURITY),
        Some(PROPERTY),
        Some(EVENT),
        Some(STAND_ALONE_SIG),
        Some(MODULE_REF),
        Some(TYPE_SPEC),
        Some(ASSEMBLY),
        Some(ASSEMBLY_REF),
        Some(FILE),
        Some(EXPORTED_TYPE),
        Some(MANIFEST_RESOURCE),
        Some(GENERIC_PARAM),
        Some(GENERIC_PARAM_CONSTRAINT),
        Some(METHOD_SPEC),
    ],
};

pub const MEMBER_REF_PARENT: CodedIndex = CodedIndex {
    tag_bits: 3,
    tables: &[
        Some(TYPE_DEF),
        Some(TYPE_REF),
        Some(MODULE_REF),
        Some(METHOD_DEF),
        Some(TYPE_SPEC),
    ],
};

pub const RESOLUTION_SCOPE: CodedIndex = CodedIndex {
    tag_bits: 2,
    tables: &[
        Some(MODULE),
        Some(MODULE_REF),
        Some(ASSEMBLY_REF),
        Some(TYPE_REF),
    ],
};

pub const CUSTOM_ATTRIBUTE_TYPE: CodedIndex = CodedIndex {
    tag_bits: 3,
    tables: &[None, None, Some(METHOD_DEF), Some(MEMBER_REF), None],
};

impl CodedIndex {
    /// Splits a raw value into `(table, row)`; `None` for unused tags.
    pub fn decode(&self, value: u32) -> Option<(u8, u32)> {
        let tag = value & ((1 << self.tag_bits) - 1);
        let table = (*self.tables.get(tag as usize)?)?;
        Some((table, value >> self.tag_bits))
    }
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Fixed(usize),
    Str,
    Guid,
    Blob,
    Index(u8),
    Coded(&'static CodedIndex),
}

use Column::*;

/// Column layouts for tables `0x00..=0x0c`.
const SCHEMAS: [&[Column]; 13] = [
    // Module: Generation, Name, Mvid, EncId, EncBaseId
    &[Fixed(2), Str, Guid, Guid, Guid],
    // TypeRef: ResolutionScope, TypeName, TypeNamespace
    &[Coded(&RESOLUTION_SCOPE), Str, Str],
    // TypeDef: Flags, TypeName, TypeNamespace, Extends, FieldList, MethodList
    &[Fixed(4), Str, Str, Coded(&TYPE_DEF_OR_REF), Index(FIELD), Index(METHOD_DEF)],
    // FieldPtr
    &[Index(FIELD)],
    // Field: Flags, Name, Signature
    &[Fixed(2), Str, Blob],
    // MethodPtr
    &[Index(METHOD_DEF)],
    // MethodDef: RVA, ImplFlags, Flags, Name, Signature, ParamList
    &[Fixed(4), Fixed(2), Fixed(2), Str, Blob, Index(PARAM)],
    // ParamPtr
    &[Index(PARAM)],
    // Param: Flags, Sequence, Name
    &[Fixed(2), Fixed(2), Str],
    // InterfaceImpl: Class, Interface
    &[Index(TYPE_DEF), Coded(&TYPE_DEF_OR_REF)],
    // MemberRef: Class, Name, Signature
    &[Coded(&MEMBER_REF_PARENT), Str, Blob],
    // Constant: Type + padding, Parent, Value
    &[Fixed(2), Coded(&HAS_CONSTANT), Blob],
    // CustomAttribute: Parent, Type, Value
    &[Coded(&HAS_CUSTOM_ATTRIBUTE), Coded(&CUSTOM_ATTRIBUTE_TYPE), Blob],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRefRow {
    pub resolution_scope: u32,
    pub name: u32,
    pub namespace: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDefRow {
    pub flags: u32,
    pub name: u32,
    pub namespace: u32,
    pub extends: u32,
    pub field_list: u32,
    pub method_list: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDefRow {
    pub rva: u32,
    pub name: u32,
    pub signature: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRefRow {
    pub class: u32,
    pub name: u32,
    pub signature: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomAttributeRow {
    pub parent: u32,
    pub constructor: u32,
    pub value: u32,
}

/// Row counts and layout of the tables stream.
#[derive(Debug, Clone)]
pub struct Tables<'a> {
    data: &'a [u8],
    pub major_version: u8,
    pub minor_version: u8,
    heap_sizes: u8,
    rows: [u32; 64],
    /// Offset into `data` of each laid-out table.
    offsets: [usize; SCHEMAS.len()],
    row_sizes: [usize; SCHEMAS.len()],
}

impl<'a> Tables<'a> {
    pub fn parse(stream: &'a [u8]) -> Result<Self, DecodeError> {
        let major_version = stream.u8_at(4)?;
        let minor_version = stream.u8_at(5)?;
        let heap_sizes = stream.u8_at(6)?;
        let valid = stream.u64_at(8)?;

        let mut rows = [0u32; 64];
        let mut pos = 24;
        for (id, count) in rows.iter_mut().enumerate() {
            if valid & (1u64 << id) != 0 {
                *count = stream.u32_at(pos)?;
                pos += 4;
            }
        }
        if heap_sizes & HEAP_EXTRA_DATA != 0 {
            pos += 4;
        }

        let data = stream.get(pos..).ok_or(DecodeError::OutOfRange {
            offset: pos as u64,
            len: 0,
            available: stream.len(),
        })?;

        let mut tables = Self {
            data,
            major_version,
            minor_version,
            heap_sizes,
            rows,
            offsets: [0; SCHEMAS.len()],
            row_sizes: [0; SCHEMAS.len()],
        };

        let mut offset = 0usize;
        for (id, schema) in SCHEMAS.iter().enumerate() {
            let row_size: usize = schema.iter().map(|c| tables.column_width(*c)).sum();
            tables.offsets[id] = offset;
            tables.row_sizes[id] = row_size;
            offset = (tables.rows[id] as usize)
                .checked_mul(row_size)
                .and_then(|len| offset.checked_add(len))
                .ok_or_else(|| DecodeError::Metadata(format!("table {id:#04x} overflows")))?;
        }

        Ok(tables)
    }

    pub fn row_count(&self, table: u8) -> u32 {
        self.rows.get(table as usize).copied().unwrap_or(0)
    }

    fn coded_width(&self, index: &CodedIndex) -> usize {
        let max_rows = index
            .tables
            .iter()
            .flatten()
            .map(|&t| self.row_count(t))
            .max()
            .unwrap_or(0);
        if max_rows < (1 << (16 - index.tag_bits)) {
            2
        } else {
            4
        }
    }

    fn column_width(&self, column: Column) -> usize {
        let wide_heap = |flag: u8| if self.heap_sizes & flag != 0 { 4 } else { 2 };
        match column {
            Fixed(n) => n,
            Str => wide_heap(HEAP_STRINGS_WIDE),
            Guid => wide_heap(HEAP_GUID_WIDE),
            Blob => wide_heap(HEAP_BLOB_WIDE),
            Index(t) => {
                if self.row_count(t) < 0x1_0000 {
                    2
                } else {
                    4
                }
            }
            Coded(index) => self.coded_width(index),
        }
    }

    /// Reads every column of row `rid` (1-based) of `table`, widened to `u32`.
    fn row(&self, table: u8, rid: u32) -> Result<Vec<u32>, DecodeError> {
        let id = table as usize;
        let schema = SCHEMAS
            .get(id)
            .ok_or_else(|| DecodeError::Metadata(format!("table {table:#04x} is not laid out")))?;
        if rid == 0 || rid > self.rows[id] {
            return Err(DecodeError::Metadata(format!(
                "row {rid} of table {table:#04x} (has {})",
                self.rows[id]
            )));
        }

        let mut pos = self.offsets[id] + (rid as usize - 1) * self.row_sizes[id];
        let mut values = Vec::with_capacity(schema.len());
        for &column in schema.iter() {
            let width = self.column_width(column);
            values.push(self.data.index_at(pos, width == 4)?);
            pos += width;
        }
        Ok(values)
    }

    pub fn type_ref(&self, rid: u32) -> Result<TypeRefRow, DecodeError> {
        let r = self.row(TYPE_REF, rid)?;
        Ok(TypeRefRow {
            resolution_scope: r[0],
            name: r[1],
            namespace: r[2],
        })
    }

    pub fn type_def(&self, rid: u32) -> Result<TypeDefRow, DecodeError> {
        let r = self.row(TYPE_DEF, rid)?;
        Ok(TypeDefRow {
            flags: r[0],
            name: r[1],
            namespace: r[2],
            extends: r[3],
            field_list: r[4],
            method_list: r[5],
        })
    }

    pub fn method_def(&self, rid: u32) -> Result<MethodDefRow, DecodeError> {
        let r = self.row(METHOD_DEF, rid)?;
        Ok(MethodDefRow {
            rva: r[0],
            name: r[3],
            signature: r[4],
        })
    }

    pub fn member_ref(&self, rid: u32) -> Result<MemberRefRow, DecodeError> {
        let r = self.row(MEMBER_REF, rid)?;
        Ok(MemberRefRow {
            class: r[0],
            name: r[1],
            signature: r[2],
        })
    }

    pub fn custom_attribute(&self, rid: u32) -> Result<CustomAttributeRow, DecodeError> {
        let r = self.row(CUSTOM_ATTRIBUTE, rid)?;
        Ok(CustomAttributeRow {
            parent: r[0],
            constructor: r[1],
            value: r[2],
        })
    }

    /// The `TypeDef` whose method list contains method `rid`.
    ///
    /// Method lists are runs: a type owns methods from its `MethodList` up to the next
    /// type's `MethodList`.
    pub fn method_owner(&self, rid: u32) -> Result<Option<u32>, DecodeError> {
        let mut owner = None;
        for type_rid in 1..=self.row_count(TYPE_DEF) {
            let start = self.type_def(type_rid)?.method_list;
            if start > rid {
                break;
            }
            if start != 0 {
                owner = Some(type_rid);
            }
        }
        Ok(owner)
    }
}
