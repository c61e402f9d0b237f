use bytes::BytesMut;

use super::WireError;

pub const ENCODING_MAJOR: u8 = 1;
pub const ENCODING_MINOR: u8 = 0;
/// `[size: i32][major: u8][minor: u8]`
pub const ENCAPS_HEADER_SIZE: usize = 6;

const SIZE_MARKER: u8 = 255;

#[derive(Debug, Clone, Copy)]
struct ReadEncaps {
    start: usize,
    size: usize,
}

/// Cursor-based binary reader/writer.
///
/// The same buffer serves reading and writing. Writes at a cursor below the end overwrite
/// bytes in place, which is how a previously reserved byte (for example the reply status)
/// gets patched without re-encoding what follows it.
#[derive(Debug, Default)]
pub struct WireStream {
    buf: BytesMut,
    pos: usize,
    read_encaps: Vec<ReadEncaps>,
    write_encaps: Vec<usize>,
}

impl WireStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        WireStream {
            buf: BytesMut::with_capacity(capacity),
            ..Default::default()
        }
    }

    /// Build a stream positioned at the start of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut stream = Self::with_capacity(data.len());
        stream.load(data);
        stream
    }

    /// Replace the contents with `data`, keeping the allocation, and rewind.
    pub fn load(&mut self, data: &[u8]) {
        self.reset();
        self.buf.extend_from_slice(data);
    }

    /// Forget contents and cursor state. Capacity is kept.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.read_encaps.clear();
        self.write_encaps.clear();
    }

    /// Release the buffer. Safe to call more than once.
    pub fn destroy(&mut self) {
        self.buf = BytesMut::new();
        self.pos = 0;
        self.read_encaps = Vec::new();
        self.write_encaps = Vec::new();
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Move the cursor. Positions past the end are clamped to the end.
    #[inline]
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..]
    }

    /// Truncate or zero-extend to `size` and move the cursor there.
    ///
    /// Write encapsulations opened at or after `size` are discarded. With `shrink_only`
    /// a `size` beyond the current end leaves the stream untouched.
    pub fn resize(&mut self, size: usize, shrink_only: bool) {
        if shrink_only && size > self.buf.len() {
            return;
        }
        self.buf.resize(size, 0);
        self.pos = size;
        self.write_encaps.retain(|start| *start < size);
        self.read_encaps.retain(|e| e.start < size);
    }

    fn put(&mut self, data: &[u8]) {
        let end = self.pos + data.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
    }

    fn take(&mut self, n: usize) -> Result<&[u8], WireError> {
        if n > self.remaining() {
            return Err(WireError::OutOfBounds {
                pos: self.pos,
                needed: n,
                len: self.buf.len(),
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..self.pos])
    }

    pub fn write_byte(&mut self, v: u8) {
        self.put(&[v]);
    }

    pub fn read_byte(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_byte(v as u8);
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_byte()? != 0)
    }

    pub fn write_int(&mut self, v: i32) {
        self.put(&v.to_le_bytes());
    }

    pub fn read_int(&mut self) -> Result<i32, WireError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn write_long(&mut self, v: i64) {
        self.put(&v.to_le_bytes());
    }

    pub fn read_long(&mut self) -> Result<i64, WireError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(i64::from_le_bytes(raw))
    }

    /// Raw bytes, no length prefix.
    pub fn write_blob(&mut self, data: &[u8]) {
        self.put(data);
    }

    pub fn read_blob(&mut self, n: usize) -> Result<Vec<u8>, WireError> {
        self.take(n).map(<[u8]>::to_vec)
    }

    pub fn write_size(&mut self, v: usize) {
        debug_assert!(v <= i32::MAX as usize);
        if v < SIZE_MARKER as usize {
            self.write_byte(v as u8);
        } else {
            self.write_byte(SIZE_MARKER);
            self.write_int(v as i32);
        }
    }

    pub fn read_size(&mut self) -> Result<usize, WireError> {
        match self.read_byte()? {
            SIZE_MARKER => {
                let v = self.read_int()?;
                if v < 0 {
                    return Err(WireError::NegativeSize(v));
                }
                Ok(v as usize)
            }
            v => Ok(v as usize),
        }
    }

    pub fn write_string(&mut self, v: &str) {
        self.write_size(v.len());
        self.put(v.as_bytes());
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_size()?;
        if len == 0 {
            return Ok(String::new());
        }
        let raw = self.take(len)?;
        Ok(std::str::from_utf8(raw)?.to_owned())
    }

    pub fn write_string_seq<S: AsRef<str>>(&mut self, v: &[S]) {
        self.write_size(v.len());
        for s in v {
            self.write_string(s.as_ref());
        }
    }

    pub fn read_string_seq(&mut self) -> Result<Vec<String>, WireError> {
        let len = self.read_size()?;
        // every element takes at least its size byte
        if len > self.remaining() {
            return Err(WireError::OutOfBounds {
                pos: self.pos,
                needed: len,
                len: self.buf.len(),
            });
        }
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_string()?);
        }
        Ok(out)
    }

    /// Open a write encapsulation; its size is filled in by [`end_write_encaps`].
    ///
    /// [`end_write_encaps`]: WireStream::end_write_encaps
    pub fn start_write_encaps(&mut self) {
        self.write_encaps.push(self.pos);
        self.write_int(0);
        self.write_byte(ENCODING_MAJOR);
        self.write_byte(ENCODING_MINOR);
    }

    pub fn end_write_encaps(&mut self) -> Result<(), WireError> {
        let start = self.write_encaps.pop().ok_or(WireError::NoEncapsulation)?;
        let end = self.pos;
        if end < start + ENCAPS_HEADER_SIZE {
            return Err(WireError::EncapsulationUnderflow { start, end });
        }
        self.pos = start;
        self.write_int((end - start) as i32);
        self.pos = end;
        Ok(())
    }

    pub fn start_read_encaps(&mut self) -> Result<(), WireError> {
        let start = self.pos;
        let size = self.read_int()?;
        if size < ENCAPS_HEADER_SIZE as i32 || start + size as usize > self.buf.len() {
            self.pos = start;
            return Err(WireError::EncapsulationSize { pos: start, size });
        }
        let major = self.read_byte()?;
        let minor = self.read_byte()?;
        if major != ENCODING_MAJOR || minor > ENCODING_MINOR {
            self.pos = start;
            return Err(WireError::UnsupportedEncoding { major, minor });
        }
        self.read_encaps.push(ReadEncaps {
            start,
            size: size as usize,
        });
        Ok(())
    }

    /// Close the innermost read encapsulation, skipping whatever was left unread in it.
    pub fn end_read_encaps(&mut self) -> Result<(), WireError> {
        let encaps = self.read_encaps.pop().ok_or(WireError::NoEncapsulation)?;
        self.pos = encaps.start + encaps.size;
        Ok(())
    }

    #[inline]
    pub fn read_encaps_depth(&self) -> usize {
        self.read_encaps.len()
    }

    /// Bytes left in the innermost read encapsulation.
    pub fn encaps_remaining(&self) -> Option<usize> {
        self.read_encaps
            .last()
            .map(|e| (e.start + e.size).saturating_sub(self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_encoding_boundary() {
        let mut os = WireStream::new();
        os.write_size(254);
        assert_eq!(os.size(), 1);
        os.write_size(255);
        assert_eq!(os.size(), 1 + 5);
        assert_eq!(&os.as_bytes()[1..], &[255, 255, 0, 0, 0]);

        let mut is = WireStream::from_bytes(os.as_bytes());
        assert_eq!(is.read_size().unwrap(), 254);
        assert_eq!(is.read_size().unwrap(), 255);
        assert_eq!(is.remaining(), 0);
    }

    #[test]
    fn test_negative_size_rejected() {
        let mut is = WireStream::from_bytes(&[255, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(is.read_size(), Err(WireError::NegativeSize(-1)));
    }

    #[test]
    fn test_strings_and_sequences() {
        let mut os = WireStream::new();
        os.write_string("hello");
        os.write_string("");
        os.write_string_seq(&["a", "bc"]);
        os.write_string_seq::<&str>(&[]);

        let mut is = WireStream::from_bytes(os.as_bytes());
        assert_eq!(is.read_string().unwrap(), "hello");
        assert_eq!(is.read_string().unwrap(), "");
        assert_eq!(is.read_string_seq().unwrap(), vec!["a", "bc"]);
        assert!(is.read_string_seq().unwrap().is_empty());
        assert_eq!(is.remaining(), 0);
    }

    #[test]
    fn test_truncated_reads_fail() {
        let mut is = WireStream::from_bytes(&[5, b'a', b'b']);
        assert!(matches!(
            is.read_string(),
            Err(WireError::OutOfBounds { needed: 5, .. })
        ));
        let mut is = WireStream::from_bytes(&[1, 2]);
        assert!(is.read_int().is_err());
        let mut is = WireStream::from_bytes(&[0xff, 0xfe]);
        assert!(matches!(is.read_string(), Err(WireError::OutOfBounds { .. })));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut is = WireStream::from_bytes(&[2, 0xc3, 0x28]);
        assert!(matches!(is.read_string(), Err(WireError::InvalidUtf8(_))));
    }

    #[test]
    fn test_end_read_encaps_skips_unread_payload() {
        let mut os = WireStream::new();
        os.start_write_encaps();
        os.write_int(1);
        os.write_string("unread");
        os.end_write_encaps().unwrap();
        os.write_string("next");

        let mut is = WireStream::from_bytes(os.as_bytes());
        is.start_read_encaps().unwrap();
        assert_eq!(is.read_int().unwrap(), 1);
        assert_eq!(is.encaps_remaining(), Some(7));
        is.end_read_encaps().unwrap();
        assert_eq!(is.read_string().unwrap(), "next");
    }

    #[test]
    fn test_nested_encaps() {
        let mut os = WireStream::new();
        os.start_write_encaps();
        os.write_byte(7);
        os.start_write_encaps();
        os.write_int(42);
        os.end_write_encaps().unwrap();
        os.end_write_encaps().unwrap();
        assert_eq!(os.size(), 6 + 1 + 6 + 4);
        assert_eq!(&os.as_bytes()[..4], &17i32.to_le_bytes());

        let mut is = WireStream::from_bytes(os.as_bytes());
        is.start_read_encaps().unwrap();
        assert_eq!(is.read_byte().unwrap(), 7);
        is.start_read_encaps().unwrap();
        assert_eq!(is.read_encaps_depth(), 2);
        is.end_read_encaps().unwrap();
        is.end_read_encaps().unwrap();
        assert_eq!(is.remaining(), 0);
        assert_eq!(is.end_read_encaps(), Err(WireError::NoEncapsulation));
    }

    #[test]
    fn test_encaps_header_validation() {
        let mut os = WireStream::new();
        os.write_int(6);
        os.write_byte(2);
        os.write_byte(0);
        let mut is = WireStream::from_bytes(os.as_bytes());
        assert_eq!(
            is.start_read_encaps(),
            Err(WireError::UnsupportedEncoding { major: 2, minor: 0 })
        );

        let mut is = WireStream::from_bytes(&[100, 0, 0, 0, 1, 0]);
        assert!(matches!(
            is.start_read_encaps(),
            Err(WireError::EncapsulationSize { size: 100, .. })
        ));
        assert_eq!(is.pos(), 0);
    }

    #[test]
    fn test_patch_byte_in_place() {
        let mut os = WireStream::new();
        os.write_int(9);
        let slot = os.pos();
        os.write_byte(0);
        os.write_string("body");
        let end = os.pos();

        os.set_pos(slot);
        os.write_byte(3);
        os.set_pos(end);
        assert_eq!(os.as_bytes()[slot], 3);
        assert_eq!(os.size(), end);
    }

    #[test]
    fn test_resize_discards_open_encaps() {
        let mut os = WireStream::new();
        os.write_byte(1);
        os.start_write_encaps();
        os.write_string("partial");
        os.resize(1, false);
        assert_eq!(os.size(), 1);
        assert_eq!(os.pos(), 1);
        assert_eq!(os.end_write_encaps(), Err(WireError::NoEncapsulation));

        os.resize(10, true);
        assert_eq!(os.size(), 1);
        os.resize(3, false);
        assert_eq!(os.as_bytes(), &[1, 0, 0]);
    }

    #[test]
    fn test_end_write_encaps_with_cursor_before_start() {
        let mut os = WireStream::new();
        os.write_int(7);
        os.start_write_encaps();
        os.write_int(1);
        os.set_pos(2);
        assert_eq!(
            os.end_write_encaps(),
            Err(WireError::EncapsulationUnderflow { start: 4, end: 2 })
        );
        // nothing was patched
        assert_eq!(&os.as_bytes()[..4], &7i32.to_le_bytes());
    }

    #[test]
    fn test_reset_keeps_capacity_and_destroy_releases() {
        let mut os = WireStream::with_capacity(256);
        os.write_string("payload");
        let capacity = os.capacity();
        os.reset();
        assert_eq!(os.size(), 0);
        assert_eq!(os.pos(), 0);
        assert!(os.capacity() >= capacity);

        os.destroy();
        os.destroy();
        assert_eq!(os.capacity(), 0);
    }
}
