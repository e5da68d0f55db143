//! # Type System
//!
//! 16-bit encoded type ids plus the registry that deduplicates compound
//! types. The low 11 bits of a [`Type`] are a base type id (4096 unique
//! types); the high 5 bits flag vector/pointer/array/struct/function.
//!
//! Primitive types occupy the first base ids and need no registry entry.
//! Compound types ([`TypeData`]) are registered once and reused: structurally
//! equal descriptors always produce the same id. Recursive types are broken
//! with [`TypeRegistry::reserve_type_id`] / [`TypeRegistry::complete_type`].

use crate::foundation::error::{IrError, IrResult};
use crate::foundation::strings::StrId;
use rustc_hash::FxHashMap;

/// Encoded 16-bit type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(pub u16);

impl Default for Type {
    fn default() -> Self {
        Type::VOID
    }
}

const BASE_MASK: u16 = 0x07FF;
const FLAG_VECTOR: u16 = 1 << 11;
const FLAG_POINTER: u16 = 1 << 12;
const FLAG_ARRAY: u16 = 1 << 13;
const FLAG_STRUCT: u16 = 1 << 14;
const FLAG_FUNCTION: u16 = 1 << 15;

impl Type {
    pub const VOID: Type = Type(0);
    pub const BOOL: Type = Type(1);
    pub const I8: Type = Type(2);
    pub const I16: Type = Type(3);
    pub const I32: Type = Type(4);
    pub const I64: Type = Type(5);
    pub const U8: Type = Type(6);
    pub const U16: Type = Type(7);
    pub const U32: Type = Type(8);
    pub const U64: Type = Type(9);
    pub const F32: Type = Type(10);
    pub const F64: Type = Type(11);
    pub const STRING: Type = Type(12);

    /// First base id available for registered compound types.
    pub(crate) const FIRST_EXTENDED: u16 = 13;

    /// The base type id with all flag bits stripped.
    pub fn base_id(self) -> u16 {
        self.0 & BASE_MASK
    }

    pub fn is_primitive(self) -> bool {
        self.0 < Self::FIRST_EXTENDED
    }

    pub fn is_pointer(self) -> bool {
        self.0 & FLAG_POINTER != 0
    }

    pub fn is_array(self) -> bool {
        self.0 & FLAG_ARRAY != 0
    }

    pub fn is_struct(self) -> bool {
        self.0 & FLAG_STRUCT != 0
    }

    pub fn is_function(self) -> bool {
        self.0 & FLAG_FUNCTION != 0
    }

    pub fn is_vector(self) -> bool {
        self.0 & FLAG_VECTOR != 0
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Type::I8
                | Type::I16
                | Type::I32
                | Type::I64
                | Type::U8
                | Type::U16
                | Type::U32
                | Type::U64
        )
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }
}

/// Descriptor of a registered compound type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeData {
    Pointer {
        pointee: Type,
        addr_space: u32,
    },
    Array {
        elem: Type,
        count: u64,
    },
    Struct {
        /// Ordered (name, type) fields
        fields: Vec<(StrId, Type)>,
        size: u32,
        align: u32,
    },
    Function {
        ret: Type,
        params: Vec<Type>,
        is_vararg: bool,
    },
    Vector {
        elem: Type,
        count: u32,
    },
    /// Placeholder produced by `reserve_type_id`, awaiting completion.
    Opaque,
}

impl TypeData {
    fn flag_bits(&self) -> u16 {
        match self {
            TypeData::Pointer { .. } => FLAG_POINTER,
            TypeData::Array { .. } => FLAG_ARRAY,
            TypeData::Struct { .. } => FLAG_STRUCT,
            TypeData::Function { .. } => FLAG_FUNCTION,
            TypeData::Vector { .. } => FLAG_VECTOR,
            TypeData::Opaque => 0,
        }
    }
}

/// Registry for deduplicating compound types.
///
/// Structural equality decides identity: registering the same descriptor
/// twice returns the same id both times.
#[derive(Debug)]
pub struct TypeRegistry {
    descriptors: FxHashMap<u16, TypeData>,
    lookup: FxHashMap<TypeData, Type>,
    next_id: u16,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry {
            descriptors: FxHashMap::default(),
            lookup: FxHashMap::default(),
            next_id: Type::FIRST_EXTENDED,
        }
    }

    /// Register a compound type, returning the existing id if a structurally
    /// equal descriptor was registered before.
    pub fn register_type(&mut self, data: TypeData) -> IrResult<Type> {
        if let Some(&ty) = self.lookup.get(&data) {
            return Ok(ty);
        }

        let base = self.allocate_base_id()?;
        let ty = Type(base | data.flag_bits());
        self.descriptors.insert(base, data.clone());
        self.lookup.insert(data, ty);
        Ok(ty)
    }

    pub fn create_pointer_type(&mut self, pointee: Type, addr_space: u32) -> IrResult<Type> {
        self.register_type(TypeData::Pointer { pointee, addr_space })
    }

    pub fn create_array_type(&mut self, elem: Type, count: u64) -> IrResult<Type> {
        self.register_type(TypeData::Array { elem, count })
    }

    pub fn create_struct_type(
        &mut self,
        fields: Vec<(StrId, Type)>,
        size: u32,
        align: u32,
    ) -> IrResult<Type> {
        self.register_type(TypeData::Struct { fields, size, align })
    }

    pub fn create_function_type(
        &mut self,
        ret: Type,
        params: Vec<Type>,
        is_vararg: bool,
    ) -> IrResult<Type> {
        self.register_type(TypeData::Function { ret, params, is_vararg })
    }

    pub fn create_vector_type(&mut self, elem: Type, count: u32) -> IrResult<Type> {
        self.register_type(TypeData::Vector { elem, count })
    }

    /// Look up the descriptor behind a compound type id.
    pub fn get_type(&self, ty: Type) -> IrResult<&TypeData> {
        self.descriptors
            .get(&ty.base_id())
            .ok_or(IrError::UnknownType(ty.0))
    }

    /// Reserve an id for a forward-declared type. The returned id carries no
    /// flag bits until completed.
    pub fn reserve_type_id(&mut self) -> IrResult<Type> {
        let base = self.allocate_base_id()?;
        self.descriptors.insert(base, TypeData::Opaque);
        Ok(Type(base))
    }

    /// Complete a previously reserved type by pointing it at the descriptor
    /// of an already-registered type.
    pub fn complete_type(&mut self, placeholder: Type, actual: Type) -> IrResult<()> {
        match self.descriptors.get(&placeholder.base_id()) {
            Some(TypeData::Opaque) => {}
            Some(_) | None => return Err(IrError::NotReserved(placeholder.0)),
        }

        let data = self.get_type(actual)?.clone();
        self.descriptors.insert(placeholder.base_id(), data);
        Ok(())
    }

    /// Size in bytes of a type, or 0 when unknown.
    pub fn size_of(&self, ty: Type) -> u64 {
        match ty {
            Type::VOID => 0,
            Type::BOOL | Type::I8 | Type::U8 => 1,
            Type::I16 | Type::U16 => 2,
            Type::I32 | Type::U32 | Type::F32 => 4,
            Type::I64 | Type::U64 | Type::F64 => 8,
            Type::STRING => 8,
            _ => match self.descriptors.get(&ty.base_id()) {
                Some(TypeData::Pointer { .. }) => 8,
                Some(TypeData::Array { elem, count }) => self.size_of(*elem) * count,
                Some(TypeData::Struct { size, .. }) => u64::from(*size),
                Some(TypeData::Vector { elem, count }) => {
                    self.size_of(*elem) * u64::from(*count)
                }
                Some(TypeData::Function { .. } | TypeData::Opaque) | None => 0,
            },
        }
    }

    /// Byte offsets of each struct field under natural alignment: every
    /// field is aligned to its own size.
    pub fn field_offsets(&self, fields: &[(StrId, Type)]) -> Vec<u64> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0u64;
        for (_, field_ty) in fields {
            let size = self.size_of(*field_ty).max(1);
            let align = size.min(8);
            offset = offset.div_ceil(align) * align;
            offsets.push(offset);
            offset += size;
        }
        offsets
    }

    fn allocate_base_id(&mut self) -> IrResult<u16> {
        if self.next_id > BASE_MASK {
            return Err(IrError::TypeSpaceExhausted);
        }
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }
}
