use crate::errors::CodecError;
use byteordered::byteorder::{ByteOrder, LE};

/// Little-endian fixed-width access to a byte buffer at absolute offsets.
/// Every access is bounds-checked and reports the offending offset.
pub struct ByteView<B> {
    data: B,
}

impl<B: AsRef<[u8]>> ByteView<B> {
    pub fn new(data: B) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.as_ref().len()
    }

    pub fn bytes(&self, offset: usize, width: usize) -> Result<&[u8], CodecError> {
        let data = self.data.as_ref();
        offset
            .checked_add(width)
            .and_then(|end| data.get(offset..end))
            .ok_or(CodecError::OutOfBounds {
                offset,
                width,
                len: data.len(),
            })
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16, CodecError> {
        Ok(LE::read_u16(self.bytes(offset, 2)?))
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32, CodecError> {
        Ok(LE::read_u32(self.bytes(offset, 4)?))
    }

    pub fn read_f32(&self, offset: usize) -> Result<f32, CodecError> {
        Ok(LE::read_f32(self.bytes(offset, 4)?))
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> ByteView<B> {
    pub fn bytes_mut(&mut self, offset: usize, width: usize) -> Result<&mut [u8], CodecError> {
        let len = self.len();
        offset
            .checked_add(width)
            .and_then(|end| self.data.as_mut().get_mut(offset..end))
            .ok_or(CodecError::OutOfBounds { offset, width, len })
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) -> Result<(), CodecError> {
        LE::write_u16(self.bytes_mut(offset, 2)?, value);
        Ok(())
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), CodecError> {
        LE::write_u32(self.bytes_mut(offset, 4)?, value);
        Ok(())
    }

    pub fn write_bytes(&mut self, offset: usize, src: &[u8]) -> Result<(), CodecError> {
        self.bytes_mut(offset, src.len())?.copy_from_slice(src);
        Ok(())
    }
}
