//! Brotli compression of the WOFF2 table stream.

use core::ops;

use brotli::enc::{backward_references::BrotliEncoderMode, BrotliEncoderParams};

use super::FontWriter;

/// Streams table data to the compressor in the table directory order, skipping the alignment padding.
struct TableStream<'a> {
    writer: &'a FontWriter,
    data_offset: u32,
    table_idx: usize,
    pos_in_table: usize,
}

impl<'a> TableStream<'a> {
    fn new(writer: &'a FontWriter) -> Self {
        debug_assert!(
            writer
                .tables
                .windows(2)
                .all(|pair| pair[0].offset + pair[0].length <= pair[1].offset),
            "table records must be ordered by offset"
        );
        let data_offset = writer.tables.first().map_or(0, |record| record.offset);
        Self {
            writer,
            data_offset,
            table_idx: 0,
            pos_in_table: 0,
        }
    }

    /// Copies as much of `range` as fits into `out`. Returns the number of copied bytes
    /// and the unfilled part of `out`, if the range was exhausted.
    fn copy_range<'out>(
        &self,
        range: ops::Range<usize>,
        out: &'out mut [u8],
    ) -> (usize, Option<&'out mut [u8]>) {
        let table_data = &self.writer.table_data[range];
        if table_data.len() < out.len() {
            let (head, tail) = out.split_at_mut(table_data.len());
            head.copy_from_slice(table_data);
            (table_data.len(), Some(tail))
        } else {
            out.copy_from_slice(&table_data[..out.len()]);
            (out.len(), None)
        }
    }
}

impl brotli::CustomRead<()> for TableStream<'_> {
    fn read(&mut self, mut out: &mut [u8]) -> Result<usize, ()> {
        let mut total_read = 0;
        while let Some(record) = self.writer.tables.get(self.table_idx) {
            let table_start = (record.offset - self.data_offset) as usize;
            let range =
                table_start + self.pos_in_table..table_start + record.length as usize;
            let (read, rest) = self.copy_range(range, out);
            total_read += read;

            let Some(rest) = rest else {
                self.pos_in_table += read;
                return Ok(total_read);
            };
            self.table_idx += 1;
            self.pos_in_table = 0;
            out = rest;
        }
        Ok(total_read)
    }
}

#[derive(Default)]
struct Buffer(Vec<u8>);

impl brotli::CustomWrite<()> for Buffer {
    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        self.0.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct BoxedSlice<T>(Box<[T]>);

impl<T> Default for BoxedSlice<T> {
    fn default() -> Self {
        Self(Box::default())
    }
}

impl<T> brotli::SliceWrapper<T> for BoxedSlice<T> {
    fn slice(&self) -> &[T] {
        &self.0
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

impl<T> brotli::SliceWrapperMut<T> for BoxedSlice<T> {
    fn slice_mut(&mut self) -> &mut [T] {
        &mut self.0
    }
}

#[derive(Debug)]
struct HeapAlloc;

impl<T: Clone + Default> brotli::enc::Allocator<T> for HeapAlloc {
    type AllocatedMemory = BoxedSlice<T>;

    fn alloc_cell(&mut self, len: usize) -> Self::AllocatedMemory {
        BoxedSlice(vec![T::default(); len].into())
    }

    fn free_cell(&mut self, data: Self::AllocatedMemory) {
        drop(data);
    }
}

impl brotli::enc::BrotliAlloc for HeapAlloc {}

impl FontWriter {
    const MAX_QUALITY: u8 = 11;

    /// Compresses all table data as a single brotli stream.
    pub(super) fn compress_data(&self, quality: u8) -> Vec<u8> {
        let uncompressed_len = self
            .tables
            .iter()
            .map(|record| record.length as usize)
            .sum();
        let params = BrotliEncoderParams {
            quality: i32::from(quality.min(Self::MAX_QUALITY)),
            mode: BrotliEncoderMode::BROTLI_MODE_FONT,
            size_hint: uncompressed_len,
            ..BrotliEncoderParams::default()
        };

        let mut buffer = Buffer::default();
        brotli::BrotliCompressCustomIo(
            &mut TableStream::new(self),
            &mut buffer,
            &mut [0_u8; 4_096],
            &mut [0_u8; 4_096],
            &params,
            HeapAlloc,
            &mut |_, _, _, _| { /* no metablock inspection */ },
            (),
        )
        .expect("writing to `Vec` never fails");

        tracing::trace!(
            quality,
            uncompressed_len,
            compressed_len = buffer.0.len(),
            "compressed WOFF2 table data"
        );
        buffer.0
    }
}
