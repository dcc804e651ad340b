//! Data memory: constants, variables and matrix buffers.
//!
//! Every variable occupies one slot, addressed by the 16-bit index the
//! compiler embeds in the bytecode. A slot is either inline storage in
//! the word pool, a foreign pointer to caller-owned memory, or a matrix
//! buffer. All reinterpretation of raw memory is confined to this
//! module; accessors validate the requested kind against the slot's
//! recorded layout before touching bytes.
//!
//! Foreign pointers carry a documented precondition: the caller must
//! guarantee the bound memory outlives every execution. Nothing here
//! can check that.

use rtexpr_core::{ScalarKind, TypeShape};
use thiserror::Error;

use crate::scalar::Scalar;

/// Slot access errors. These surface as `FatalError` faults at runtime
/// since the compiler only emits validated addresses.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("no slot at address {0}")]
    BadAddress(u16),
    #[error("slot {addr} holds {found}, requested {requested}")]
    KindMismatch {
        addr: u16,
        found: ScalarKind,
        requested: ScalarKind,
    },
    #[error("slot {0} is not a matrix")]
    NotMatrix(u16),
    #[error("slot {0} is not a scalar")]
    NotScalar(u16),
    #[error("matrix buffer {0} is detached")]
    Detached(u16),
}

/// Backing store for one matrix variable.
///
/// `Detached` is the placeholder left while an executor operates on a
/// buffer taken out of the pool.
#[derive(Debug, Default)]
pub enum MatrixData {
    #[default]
    Detached,
    OwnedF32(Vec<f32>),
    OwnedF64(Vec<f64>),
    Foreign(*mut u8),
}

#[derive(Debug, Default)]
pub struct MatrixBuffer {
    pub kind: ScalarKind,
    pub rows: u32,
    pub cols: u32,
    pub data: MatrixData,
}

impl MatrixBuffer {
    pub fn owned(kind: ScalarKind, rows: u32, cols: u32) -> Self {
        let len = (rows as usize) * (cols as usize);
        let data = match kind {
            ScalarKind::Float64 => MatrixData::OwnedF64(vec![0.0; len]),
            _ => MatrixData::OwnedF32(vec![0.0; len]),
        };
        Self {
            kind,
            rows,
            cols,
            data,
        }
    }

    pub fn foreign(kind: ScalarKind, rows: u32, cols: u32, ptr: *mut u8) -> Self {
        Self {
            kind,
            rows,
            cols,
            data: MatrixData::Foreign(ptr),
        }
    }

    pub fn len(&self) -> usize {
        (self.rows as usize) * (self.cols as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn same_shape(&self, other: &MatrixBuffer) -> bool {
        self.kind == other.kind && self.rows == other.rows && self.cols == other.cols
    }

    pub fn elements<T: MatrixElem>(&self) -> Option<&[T]> {
        T::elements(self)
    }

    pub fn elements_mut<T: MatrixElem>(&mut self) -> Option<&mut [T]> {
        T::elements_mut(self)
    }

    /// Base pointer of the element storage.
    pub fn base_ptr(&mut self) -> Option<*mut u8> {
        match &mut self.data {
            MatrixData::Detached => None,
            MatrixData::OwnedF32(v) => Some(v.as_mut_ptr().cast()),
            MatrixData::OwnedF64(v) => Some(v.as_mut_ptr().cast()),
            MatrixData::Foreign(p) => Some(*p),
        }
    }
}

/// Element access for the two matrix kinds.
pub trait MatrixElem: Scalar {
    fn elements(buffer: &MatrixBuffer) -> Option<&[Self]>;
    fn elements_mut(buffer: &mut MatrixBuffer) -> Option<&mut [Self]>;
}

impl MatrixElem for f32 {
    fn elements(buffer: &MatrixBuffer) -> Option<&[f32]> {
        if buffer.kind != ScalarKind::Float32 {
            return None;
        }
        match &buffer.data {
            MatrixData::OwnedF32(v) => Some(v),
            // precondition: bound memory holds rows*cols elements
            MatrixData::Foreign(p) => {
                Some(unsafe { std::slice::from_raw_parts(p.cast(), buffer.len()) })
            }
            _ => None,
        }
    }

    fn elements_mut(buffer: &mut MatrixBuffer) -> Option<&mut [f32]> {
        if buffer.kind != ScalarKind::Float32 {
            return None;
        }
        let len = buffer.len();
        match &mut buffer.data {
            MatrixData::OwnedF32(v) => Some(v),
            MatrixData::Foreign(p) => {
                Some(unsafe { std::slice::from_raw_parts_mut(p.cast(), len) })
            }
            _ => None,
        }
    }
}

impl MatrixElem for f64 {
    fn elements(buffer: &MatrixBuffer) -> Option<&[f64]> {
        if buffer.kind != ScalarKind::Float64 {
            return None;
        }
        match &buffer.data {
            MatrixData::OwnedF64(v) => Some(v),
            MatrixData::Foreign(p) => {
                Some(unsafe { std::slice::from_raw_parts(p.cast(), buffer.len()) })
            }
            _ => None,
        }
    }

    fn elements_mut(buffer: &mut MatrixBuffer) -> Option<&mut [f64]> {
        if buffer.kind != ScalarKind::Float64 {
            return None;
        }
        let len = buffer.len();
        match &mut buffer.data {
            MatrixData::OwnedF64(v) => Some(v),
            MatrixData::Foreign(p) => {
                Some(unsafe { std::slice::from_raw_parts_mut(p.cast(), len) })
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Storage {
    Inline { offset: usize },
    Foreign(*mut u8),
    Matrix(usize),
}

#[derive(Debug)]
struct Slot {
    shape: TypeShape,
    storage: Storage,
}

/// The data-memory pool of one compiled program.
#[derive(Debug, Default)]
pub struct DataMemory {
    slots: Vec<Slot>,
    words: Vec<u32>,
    matrices: Vec<MatrixBuffer>,
}

impl DataMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn shape(&self, addr: u16) -> Result<TypeShape, MemoryError> {
        Ok(self.slot(addr)?.shape)
    }

    pub fn is_foreign(&self, addr: u16) -> bool {
        match self.slot(addr) {
            Ok(slot) => match &slot.storage {
                Storage::Foreign(_) => true,
                Storage::Matrix(index) => matches!(
                    self.matrices.get(*index),
                    Some(MatrixBuffer {
                        data: MatrixData::Foreign(_),
                        ..
                    })
                ),
                Storage::Inline { .. } => false,
            },
            Err(_) => false,
        }
    }

    pub fn alloc_scalar(&mut self, kind: ScalarKind) -> u16 {
        let offset = self.words.len();
        self.words.resize(offset + kind.word_count(), 0);
        self.add_slot(TypeShape::Scalar(kind), Storage::Inline { offset })
    }

    pub fn bind_scalar(&mut self, kind: ScalarKind, ptr: *mut u8) -> u16 {
        self.add_slot(TypeShape::Scalar(kind), Storage::Foreign(ptr))
    }

    pub fn alloc_matrix(&mut self, kind: ScalarKind, rows: u32, cols: u32) -> u16 {
        let index = self.matrices.len();
        self.matrices.push(MatrixBuffer::owned(kind, rows, cols));
        self.add_slot(TypeShape::Matrix { kind, rows, cols }, Storage::Matrix(index))
    }

    pub fn bind_matrix(&mut self, kind: ScalarKind, rows: u32, cols: u32, ptr: *mut u8) -> u16 {
        let index = self.matrices.len();
        self.matrices
            .push(MatrixBuffer::foreign(kind, rows, cols, ptr));
        self.add_slot(TypeShape::Matrix { kind, rows, cols }, Storage::Matrix(index))
    }

    pub fn read_scalar<T: Scalar>(&self, addr: u16) -> Result<T, MemoryError> {
        let slot = self.slot(addr)?;
        Self::check_kind::<T>(addr, slot)?;
        match &slot.storage {
            Storage::Inline { offset } => {
                Ok(T::load(&self.words[*offset..*offset + T::WORDS]))
            }
            // precondition: bound memory outlives the execution
            Storage::Foreign(ptr) => Ok(unsafe { std::ptr::read_unaligned(ptr.cast::<T>()) }),
            Storage::Matrix(_) => Err(MemoryError::NotScalar(addr)),
        }
    }

    pub fn write_scalar<T: Scalar>(&mut self, addr: u16, value: T) -> Result<(), MemoryError> {
        let slot = self.slot(addr)?;
        Self::check_kind::<T>(addr, slot)?;
        match slot.storage {
            Storage::Inline { offset } => {
                value.store(&mut self.words[offset..offset + T::WORDS]);
                Ok(())
            }
            Storage::Foreign(ptr) => {
                // precondition: bound memory outlives the execution
                unsafe { std::ptr::write_unaligned(ptr.cast::<T>(), value) };
                Ok(())
            }
            Storage::Matrix(_) => Err(MemoryError::NotScalar(addr)),
        }
    }

    /// Raw bits of an inline scalar slot, for diagnostics rendering.
    pub fn read_words(&self, addr: u16, out: &mut [u32]) -> Result<(), MemoryError> {
        let slot = self.slot(addr)?;
        match &slot.storage {
            Storage::Inline { offset } => {
                let count = out.len().min(slot.shape.stack_words());
                out[..count].copy_from_slice(&self.words[*offset..*offset + count]);
                Ok(())
            }
            Storage::Foreign(_) | Storage::Matrix(_) => Err(MemoryError::NotScalar(addr)),
        }
    }

    /// Write pre-packed words into an inline slot. Used by the compiler
    /// to load constant literals.
    pub fn write_words(&mut self, addr: u16, words: &[u32]) -> Result<(), MemoryError> {
        let slot = self.slot(addr)?;
        match slot.storage {
            Storage::Inline { offset } => {
                let count = words.len().min(slot.shape.stack_words());
                self.words[offset..offset + count].copy_from_slice(&words[..count]);
                Ok(())
            }
            Storage::Foreign(_) | Storage::Matrix(_) => Err(MemoryError::NotScalar(addr)),
        }
    }

    pub fn matrix(&self, addr: u16) -> Result<&MatrixBuffer, MemoryError> {
        match &self.slot(addr)?.storage {
            Storage::Matrix(index) => Ok(&self.matrices[*index]),
            _ => Err(MemoryError::NotMatrix(addr)),
        }
    }

    pub fn matrix_mut(&mut self, addr: u16) -> Result<&mut MatrixBuffer, MemoryError> {
        match self.slot(addr)?.storage {
            Storage::Matrix(index) => Ok(&mut self.matrices[index]),
            _ => Err(MemoryError::NotMatrix(addr)),
        }
    }

    /// Move a matrix buffer out of the pool, leaving a detached
    /// placeholder. Lets an executor hold the destination mutably while
    /// reading other matrices from the pool.
    pub fn take_matrix(&mut self, addr: u16) -> Result<MatrixBuffer, MemoryError> {
        let buffer = std::mem::take(self.matrix_mut(addr)?);
        if matches!(buffer.data, MatrixData::Detached) {
            return Err(MemoryError::Detached(addr));
        }
        Ok(buffer)
    }

    pub fn put_matrix(&mut self, addr: u16, buffer: MatrixBuffer) -> Result<(), MemoryError> {
        *self.matrix_mut(addr)? = buffer;
        Ok(())
    }

    /// Pointer to a slot's storage, for the caller-facing memory
    /// accessors. Foreign slots return the bound pointer.
    pub fn slot_ptr(&mut self, addr: u16) -> Result<*mut u8, MemoryError> {
        match self.slot(addr)?.storage {
            Storage::Inline { offset } => Ok((&mut self.words[offset] as *mut u32).cast()),
            Storage::Foreign(ptr) => Ok(ptr),
            Storage::Matrix(index) => self.matrices[index]
                .base_ptr()
                .ok_or(MemoryError::Detached(addr)),
        }
    }

    fn add_slot(&mut self, shape: TypeShape, storage: Storage) -> u16 {
        self.slots.push(Slot { shape, storage });
        (self.slots.len() - 1) as u16
    }

    fn slot(&self, addr: u16) -> Result<&Slot, MemoryError> {
        self.slots
            .get(addr as usize)
            .ok_or(MemoryError::BadAddress(addr))
    }

    fn check_kind<T: Scalar>(addr: u16, slot: &Slot) -> Result<(), MemoryError> {
        if slot.shape.is_matrix() {
            return Err(MemoryError::NotScalar(addr));
        }
        if slot.shape.kind() != T::KIND {
            return Err(MemoryError::KindMismatch {
                addr,
                found: slot.shape.kind(),
                requested: T::KIND,
            });
        }
        Ok(())
    }
}
