//! Scalar kinds, type shapes and literal conversion.
//!
//! Values live in data memory and on the evaluation stack packed into
//! 32-bit data elements; matrices are addressed indirectly, so a matrix
//! occupies a single element on the stack regardless of its dimensions.

use std::fmt;

use smallvec::SmallVec;

/// Identity of a scalar value type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum ScalarKind {
    /// Not yet determined. Discovery assigns this to every variable the
    /// caller has not typed; the compiler resolves or rejects it.
    #[default]
    Void,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

impl ScalarKind {
    /// Every concrete numeric kind, in width order.
    pub const ALL_NUMERIC: [ScalarKind; 10] = [
        ScalarKind::Int8,
        ScalarKind::Int16,
        ScalarKind::Int32,
        ScalarKind::Int64,
        ScalarKind::Uint8,
        ScalarKind::Uint16,
        ScalarKind::Uint32,
        ScalarKind::Uint64,
        ScalarKind::Float32,
        ScalarKind::Float64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Void => "void",
            ScalarKind::Int8 => "int8",
            ScalarKind::Int16 => "int16",
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::Uint8 => "uint8",
            ScalarKind::Uint16 => "uint16",
            ScalarKind::Uint32 => "uint32",
            ScalarKind::Uint64 => "uint64",
            ScalarKind::Float32 => "float32",
            ScalarKind::Float64 => "float64",
        }
    }

    pub fn parse(text: &str) -> Option<ScalarKind> {
        let kind = match text {
            "void" => ScalarKind::Void,
            "int8" => ScalarKind::Int8,
            "int16" => ScalarKind::Int16,
            "int32" => ScalarKind::Int32,
            "int64" => ScalarKind::Int64,
            "uint8" => ScalarKind::Uint8,
            "uint16" => ScalarKind::Uint16,
            "uint32" => ScalarKind::Uint32,
            "uint64" => ScalarKind::Uint64,
            "float32" => ScalarKind::Float32,
            "float64" => ScalarKind::Float64,
            _ => return None,
        };
        Some(kind)
    }

    pub fn byte_size(self) -> usize {
        match self {
            ScalarKind::Void => 0,
            ScalarKind::Int8 | ScalarKind::Uint8 => 1,
            ScalarKind::Int16 | ScalarKind::Uint16 => 2,
            ScalarKind::Int32 | ScalarKind::Uint32 | ScalarKind::Float32 => 4,
            ScalarKind::Int64 | ScalarKind::Uint64 | ScalarKind::Float64 => 8,
        }
    }

    /// Number of 32-bit data elements a value of this kind occupies.
    pub fn word_count(self) -> usize {
        self.byte_size().div_ceil(4)
    }

    pub fn is_numeric(self) -> bool {
        self != ScalarKind::Void
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::Float32 | ScalarKind::Float64)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar kind with an optional 2-D shape attachment.
///
/// Shapes are meaningful only for the float kinds; `parse` rejects
/// matrix syntax on any other kind.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeShape {
    Scalar(ScalarKind),
    Matrix { kind: ScalarKind, rows: u32, cols: u32 },
}

impl TypeShape {
    pub const VOID: TypeShape = TypeShape::Scalar(ScalarKind::Void);

    pub fn kind(self) -> ScalarKind {
        match self {
            TypeShape::Scalar(kind) => kind,
            TypeShape::Matrix { kind, .. } => kind,
        }
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, TypeShape::Matrix { .. })
    }

    pub fn is_void(self) -> bool {
        self == TypeShape::VOID
    }

    pub fn is_numeric(self) -> bool {
        self.kind().is_numeric()
    }

    pub fn matrix_dims(self) -> Option<(u32, u32)> {
        match self {
            TypeShape::Matrix { rows, cols, .. } => Some((rows, cols)),
            TypeShape::Scalar(_) => None,
        }
    }

    /// Parse `"float32"` or `"float64[2,3]"`.
    pub fn parse(text: &str) -> Option<TypeShape> {
        match text.split_once('[') {
            None => ScalarKind::parse(text).map(TypeShape::Scalar),
            Some((base, dims)) => {
                let kind = ScalarKind::parse(base)?;
                if !kind.is_float() {
                    return None;
                }
                let dims = dims.strip_suffix(']')?;
                let (rows, cols) = dims.split_once(',')?;
                let rows: u32 = rows.trim().parse().ok()?;
                let cols: u32 = cols.trim().parse().ok()?;
                if rows == 0 || cols == 0 {
                    return None;
                }
                Some(TypeShape::Matrix { kind, rows, cols })
            }
        }
    }

    pub fn byte_size(self) -> usize {
        match self {
            TypeShape::Scalar(kind) => kind.byte_size(),
            TypeShape::Matrix { kind, rows, cols } => {
                kind.byte_size() * (rows as usize) * (cols as usize)
            }
        }
    }

    /// Data elements this value occupies on the evaluation stack. A
    /// matrix is represented by its data-memory address, one element.
    pub fn stack_words(self) -> usize {
        match self {
            TypeShape::Scalar(kind) => kind.word_count(),
            TypeShape::Matrix { .. } => 1,
        }
    }

    /// Structural match used by signature resolution: same scalar kind
    /// and same scalar/matrix classification. Matrix dimensions are not
    /// compared; conformability is the job of per-operator stack hooks.
    pub fn matches(self, other: TypeShape) -> bool {
        self.kind() == other.kind() && self.is_matrix() == other.is_matrix()
    }
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeShape::Scalar(kind) => write!(f, "{}", kind),
            TypeShape::Matrix { kind, rows, cols } => write!(f, "{}[{},{}]", kind, rows, cols),
        }
    }
}

/// Parse a literal into the kind's native binary representation, packed
/// into 32-bit data elements, low element first.
pub fn parse_literal(kind: ScalarKind, text: &str) -> Option<SmallVec<[u32; 2]>> {
    fn one(word: u32) -> SmallVec<[u32; 2]> {
        SmallVec::from_slice(&[word])
    }
    fn two(value: u64) -> SmallVec<[u32; 2]> {
        SmallVec::from_slice(&[value as u32, (value >> 32) as u32])
    }
    let words = match kind {
        ScalarKind::Void => return None,
        ScalarKind::Int8 => one(text.parse::<i8>().ok()? as i32 as u32),
        ScalarKind::Int16 => one(text.parse::<i16>().ok()? as i32 as u32),
        ScalarKind::Int32 => one(text.parse::<i32>().ok()? as u32),
        ScalarKind::Int64 => two(text.parse::<i64>().ok()? as u64),
        ScalarKind::Uint8 => one(text.parse::<u8>().ok()? as u32),
        ScalarKind::Uint16 => one(text.parse::<u16>().ok()? as u32),
        ScalarKind::Uint32 => one(text.parse::<u32>().ok()?),
        ScalarKind::Uint64 => two(text.parse::<u64>().ok()?),
        ScalarKind::Float32 => one(text.parse::<f32>().ok()?.to_bits()),
        ScalarKind::Float64 => two(text.parse::<f64>().ok()?.to_bits()),
    };
    Some(words)
}

/// Render a packed binary value back to literal text.
pub fn render_words(kind: ScalarKind, words: &[u32]) -> Option<String> {
    if words.len() < kind.word_count() {
        return None;
    }
    let wide = || (words[0] as u64) | ((words[1] as u64) << 32);
    let text = match kind {
        ScalarKind::Void => return None,
        ScalarKind::Int8 => (words[0] as i8).to_string(),
        ScalarKind::Int16 => (words[0] as i16).to_string(),
        ScalarKind::Int32 => (words[0] as i32).to_string(),
        ScalarKind::Int64 => (wide() as i64).to_string(),
        ScalarKind::Uint8 => (words[0] as u8).to_string(),
        ScalarKind::Uint16 => (words[0] as u16).to_string(),
        ScalarKind::Uint32 => words[0].to_string(),
        ScalarKind::Uint64 => wide().to_string(),
        ScalarKind::Float32 => f32::from_bits(words[0]).to_string(),
        ScalarKind::Float64 => f64::from_bits(wide()).to_string(),
    };
    Some(text)
}
