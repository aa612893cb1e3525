use std::sync::atomic::{AtomicU64, Ordering};

use foundation::math::precision::OriginRelative;
use tracing::debug;

use crate::context::{BufferHandle, GpuBackend, GpuError};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    PartialRecord { expected: usize, got: usize },
    OutOfBounds { offset_bytes: usize, len_bytes: usize },
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::PartialRecord { expected, got } => {
                write!(f, "record has {got} floats, stride is {expected}")
            }
            BufferError::OutOfBounds {
                offset_bytes,
                len_bytes,
            } => write!(f, "record at byte {offset_bytes} is outside a {len_bytes}-byte buffer"),
        }
    }
}

impl std::error::Error for BufferError {}

/// Interleaved fixed-stride `f32` vertex data.
///
/// Invariant: `len() % stride() == 0` at all times; records are only ever
/// appended or overwritten whole.
///
/// Every construction or mutation takes a fresh process-wide generation, so a
/// generation match means byte-identical contents for upload purposes.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedBuffer {
    data: Vec<f32>,
    stride: usize,
    generation: u64,
    origin: OriginRelative,
}

impl PackedBuffer {
    pub fn new(stride: usize, origin: OriginRelative) -> Self {
        Self::with_capacity(stride, origin, 0)
    }

    pub fn with_capacity(stride: usize, origin: OriginRelative, records: usize) -> Self {
        Self {
            data: Vec::with_capacity(stride * records),
            stride,
            generation: next_generation(),
            origin,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn stride_bytes(&self) -> usize {
        self.stride * std::mem::size_of::<f32>()
    }

    pub fn origin(&self) -> OriginRelative {
        self.origin
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of floats.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn record_count(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.data.len() / self.stride
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Appends one record; returns its byte offset.
    pub fn push_record(&mut self, record: &[f32]) -> Result<usize, BufferError> {
        if record.len() != self.stride {
            return Err(BufferError::PartialRecord {
                expected: self.stride,
                got: record.len(),
            });
        }
        let offset_bytes = self.data.len() * std::mem::size_of::<f32>();
        self.data.extend_from_slice(record);
        self.generation = next_generation();
        Ok(offset_bytes)
    }

    /// Overwrites whole records starting at `offset_bytes`.
    pub fn write_records_at(&mut self, offset_bytes: usize, records: &[f32]) -> Result<(), BufferError> {
        if self.stride == 0 || records.len() % self.stride != 0 {
            return Err(BufferError::PartialRecord {
                expected: self.stride,
                got: records.len(),
            });
        }
        let float_size = std::mem::size_of::<f32>();
        let start = offset_bytes / float_size;
        let out_of_bounds = BufferError::OutOfBounds {
            offset_bytes,
            len_bytes: self.data.len() * float_size,
        };
        if offset_bytes % self.stride_bytes() != 0 {
            return Err(out_of_bounds);
        }
        let Some(slot) = self.data.get_mut(start..start + records.len()) else {
            return Err(out_of_bounds);
        };
        slot.copy_from_slice(records);
        self.generation = next_generation();
        Ok(())
    }

    pub fn record(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.stride)?;
        self.data.get(start..start + self.stride)
    }
}

/// GPU-side copy of a `PackedBuffer`, re-uploaded only when its generation
/// changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSlot {
    pub handle: BufferHandle,
    uploaded_generation: Option<u64>,
}

impl BufferSlot {
    pub fn create(backend: &mut dyn GpuBackend) -> Result<Self, GpuError> {
        Ok(Self {
            handle: backend.create_buffer()?,
            uploaded_generation: None,
        })
    }

    /// Binds the buffer, uploading first when stale. Returns `true` on upload.
    pub fn sync(&mut self, backend: &mut dyn GpuBackend, buffer: &PackedBuffer) -> Result<bool, GpuError> {
        backend.bind_buffer(self.handle)?;
        if self.uploaded_generation == Some(buffer.generation()) {
            return Ok(false);
        }
        debug!(
            handle = self.handle.0,
            bytes = buffer.as_bytes().len(),
            generation = buffer.generation(),
            "uploading vertex buffer"
        );
        backend.upload_buffer(self.handle, buffer.as_bytes())?;
        self.uploaded_generation = Some(buffer.generation());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{BufferError, PackedBuffer};
    use foundation::math::precision::OriginRelative;

    #[test]
    fn push_rejects_partial_records() {
        let mut buf = PackedBuffer::new(3, OriginRelative::default());
        assert_eq!(buf.push_record(&[1.0, 2.0, 3.0]), Ok(0));
        assert_eq!(buf.push_record(&[4.0, 5.0, 6.0]), Ok(12));
        assert_eq!(
            buf.push_record(&[7.0]),
            Err(BufferError::PartialRecord {
                expected: 3,
                got: 1
            })
        );
        assert_eq!(buf.len() % buf.stride(), 0);
        assert_eq!(buf.record_count(), 2);
        assert_eq!(buf.as_bytes().len(), 24);
    }

    #[test]
    fn every_mutation_takes_a_new_generation() {
        let mut buf = PackedBuffer::new(2, OriginRelative::default());
        let g0 = buf.generation();
        buf.push_record(&[1.0, 2.0]).expect("push");
        let g1 = buf.generation();
        assert_ne!(g0, g1);
        buf.write_records_at(0, &[3.0, 4.0]).expect("write");
        assert_ne!(g1, buf.generation());
        assert_eq!(buf.record(0), Some(&[3.0, 4.0][..]));
    }

    #[test]
    fn write_rejects_misaligned_or_out_of_range_offsets() {
        let mut buf = PackedBuffer::new(2, OriginRelative::default());
        buf.push_record(&[1.0, 2.0]).expect("push");
        assert!(matches!(
            buf.write_records_at(4, &[0.0, 0.0]),
            Err(BufferError::OutOfBounds { .. })
        ));
        assert!(matches!(
            buf.write_records_at(8, &[0.0, 0.0]),
            Err(BufferError::OutOfBounds { .. })
        ));
        assert!(matches!(
            buf.write_records_at(0, &[0.0]),
            Err(BufferError::PartialRecord { .. })
        ));
    }
}
