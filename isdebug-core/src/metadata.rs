pub mod attribute;
pub mod heaps;
pub mod root;
pub mod tables;

pub use attribute::*;

use crate::error::DecodeError;
use heaps::{BlobHeap, StringsHeap};
use root::MetadataRoot;
use tables::Tables;

/// A parsed ECMA-335 metadata blob: root, heaps and tables.
#[derive(Debug, Clone)]
pub struct Metadata<'a> {
    pub root: MetadataRoot<'a>,
    pub tables: Tables<'a>,
    pub strings: StringsHeap<'a>,
    pub blobs: BlobHeap<'a>,
}

/// Namespace and name of a resolved type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeName<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
}

impl<'a> Metadata<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        let root = MetadataRoot::parse(data)?;

        // "#-" is the uncompressed (edit-and-continue) layout of the same tables.
        let tables = match root.stream("#~")? {
            Some(stream) => stream,
            None => root
                .stream("#-")?
                .ok_or_else(|| DecodeError::Metadata("no tables stream".into()))?,
        };
        let tables = Tables::parse(tables)?;
        let strings = StringsHeap(root.stream("#Strings")?.unwrap_or_default());
        let blobs = BlobHeap(root.stream("#Blob")?.unwrap_or_default());

        Ok(Self {
            root,
            tables,
            strings,
            blobs,
        })
    }

    fn type_def_name(&self, rid: u32) -> Result<TypeName<'a>, DecodeError> {
        let row = self.tables.type_def(rid)?;
        Ok(TypeName {
            namespace: self.strings.get(row.namespace)?,
            name: self.strings.get(row.name)?,
        })
    }

    fn type_ref_name(&self, rid: u32) -> Result<TypeName<'a>, DecodeError> {
        let row = self.tables.type_ref(rid)?;
        Ok(TypeName {
            namespace: self.strings.get(row.namespace)?,
            name: self.strings.get(row.name)?,
        })
    }

    /// Resolves a `CustomAttributeType` coded index to the attribute's type and the
    /// constructor's signature blob.
    ///
    /// Returns `None` for constructors whose declaring type isn't a plain type (e.g.
    /// generic instantiations through `TypeSpec`).
    pub fn attribute_constructor(
        &self,
        constructor: u32,
    ) -> Result<Option<(TypeName<'a>, &'a [u8])>, DecodeError> {
        let Some((table, rid)) = tables::CUSTOM_ATTRIBUTE_TYPE.decode(constructor) else {
            return Err(DecodeError::Metadata(format!(
                "custom attribute type {constructor:#x}"
            )));
        };

        match table {
            tables::MEMBER_REF => {
                let member = self.tables.member_ref(rid)?;
                let signature = self.blobs.get(member.signature)?;
                let ty = match tables::MEMBER_REF_PARENT.decode(member.class) {
                    Some((tables::TYPE_REF, class)) => self.type_ref_name(class)?,
                    Some((tables::TYPE_DEF, class)) => self.type_def_name(class)?,
                    _ => return Ok(None),
                };
                Ok(Some((ty, signature)))
            }
            tables::METHOD_DEF => {
                let method = self.tables.method_def(rid)?;
                let signature = self.blobs.get(method.signature)?;
                match self.tables.method_owner(rid)? {
                    Some(owner) => Ok(Some((self.type_def_name(owner)?, signature))),
                    None => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    /// Every `DebuggableAttribute` on the assembly or module, in table order.
    pub fn debuggable_attributes(&self) -> Result<Vec<DebugConfiguration>, DecodeError> {
        let mut found = Vec::new();
        for rid in 1..=self.tables.row_count(tables::CUSTOM_ATTRIBUTE) {
            let row = self.tables.custom_attribute(rid)?;
            match tables::HAS_CUSTOM_ATTRIBUTE.decode(row.parent) {
                Some((tables::ASSEMBLY, _)) | Some((tables::MODULE, _)) => {}
                _ => continue,
            }

            let Some((ty, signature)) = self.attribute_constructor(row.constructor)? else {
                continue;
            };
            if ty.namespace != DEBUGGABLE_NAMESPACE || ty.name != DEBUGGABLE_NAME {
                continue;
            }

            let config = DebugConfiguration::decode(signature, self.blobs.get(row.value)?)?;
            log::debug!(
                "custom attribute #{rid}: {DEBUGGABLE_NAME}({:#x})",
                config.debugging_modes.bits()
            );
            found.push(config);
        }
        Ok(found)
    }
}
