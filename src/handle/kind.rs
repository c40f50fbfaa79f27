//! Handle kinds and their ownership classes

use crate::variant::VariantType;

/// How an engine handle is owned and released
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// One word, unique owner (packed arrays)
    Solo,
    /// Two words released together (callable, signal)
    Pair,
    /// One word, engine reference-counted (string, array, dictionary)
    Half,
    /// Three words, the dynamic variant with its tag inline
    Trio,
}

impl Ownership {
    /// Width of the handle in machine words
    #[inline]
    pub const fn words(self) -> usize {
        match self {
            Ownership::Solo | Ownership::Half => 1,
            Ownership::Pair => 2,
            Ownership::Trio => 3,
        }
    }

    /// Copying takes a new engine reference
    #[inline]
    pub const fn is_shared(self) -> bool {
        matches!(self, Ownership::Half)
    }
}

/// Engine resource kinds whose lifetime the host manages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleKind {
    String,
    Array,
    Dictionary,
    Callable,
    Signal,
    Variant,
    PackedByteArray,
    PackedInt32Array,
    PackedInt64Array,
    PackedFloat32Array,
    PackedFloat64Array,
    PackedStringArray,
    PackedVector2Array,
    PackedVector3Array,
    PackedVector4Array,
    PackedColorArray,
}

impl HandleKind {
    pub const fn ownership(self) -> Ownership {
        use HandleKind::*;
        match self {
            String | Array | Dictionary => Ownership::Half,
            Callable | Signal => Ownership::Pair,
            Variant => Ownership::Trio,
            PackedByteArray | PackedInt32Array | PackedInt64Array | PackedFloat32Array
            | PackedFloat64Array | PackedStringArray | PackedVector2Array
            | PackedVector3Array | PackedVector4Array | PackedColorArray => Ownership::Solo,
        }
    }

    #[inline]
    pub const fn words(self) -> usize {
        self.ownership().words()
    }

    /// Size in bytes of one element of a plain packed kind
    pub const fn element_size(self) -> Option<usize> {
        use HandleKind::*;
        match self {
            PackedByteArray => Some(1),
            PackedInt32Array | PackedFloat32Array => Some(4),
            PackedInt64Array | PackedFloat64Array => Some(8),
            PackedVector2Array => Some(8),
            PackedVector3Array => Some(12),
            PackedVector4Array | PackedColorArray => Some(16),
            _ => None,
        }
    }

    pub const fn variant_type(self) -> VariantType {
        use HandleKind::*;
        match self {
            String => VariantType::String,
            Array => VariantType::Array,
            Dictionary => VariantType::Dictionary,
            Callable => VariantType::Callable,
            Signal => VariantType::Signal,
            Variant => VariantType::Nil,
            PackedByteArray => VariantType::PackedByteArray,
            PackedInt32Array => VariantType::PackedInt32Array,
            PackedInt64Array => VariantType::PackedInt64Array,
            PackedFloat32Array => VariantType::PackedFloat32Array,
            PackedFloat64Array => VariantType::PackedFloat64Array,
            PackedStringArray => VariantType::PackedStringArray,
            PackedVector2Array => VariantType::PackedVector2Array,
            PackedVector3Array => VariantType::PackedVector3Array,
            PackedVector4Array => VariantType::PackedVector4Array,
            PackedColorArray => VariantType::PackedColorArray,
        }
    }

    /// Handle kind carried by a variant payload, if any
    pub const fn of_variant(ty: VariantType) -> Option<HandleKind> {
        use VariantType as V;
        Some(match ty {
            V::String => HandleKind::String,
            V::Array => HandleKind::Array,
            V::Dictionary => HandleKind::Dictionary,
            V::Callable => HandleKind::Callable,
            V::Signal => HandleKind::Signal,
            V::PackedByteArray => HandleKind::PackedByteArray,
            V::PackedInt32Array => HandleKind::PackedInt32Array,
            V::PackedInt64Array => HandleKind::PackedInt64Array,
            V::PackedFloat32Array => HandleKind::PackedFloat32Array,
            V::PackedFloat64Array => HandleKind::PackedFloat64Array,
            V::PackedStringArray => HandleKind::PackedStringArray,
            V::PackedVector2Array => HandleKind::PackedVector2Array,
            V::PackedVector3Array => HandleKind::PackedVector3Array,
            V::PackedVector4Array => HandleKind::PackedVector4Array,
            V::PackedColorArray => HandleKind::PackedColorArray,
            _ => return None,
        })
    }
}
