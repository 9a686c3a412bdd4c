use std::ops::Range;

/// Contiguous slice of the candidate sequence owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub id: usize,
    pub start: usize,
    pub len: usize,
}

impl Chunk {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Partition `start..start + total_len` into chunks of at most `chunk_size`.
///
/// Ids continue from `first_id` so chunks built for separate phases of one
/// run stay distinct.
pub fn build_chunks(first_id: usize, start: usize, total_len: usize, chunk_size: usize) -> Vec<Chunk> {
    if chunk_size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::with_capacity(chunk_count(total_len, chunk_size));
    let mut offset = 0usize;
    let mut id = first_id;

    while offset < total_len {
        let len = (total_len - offset).min(chunk_size);
        chunks.push(Chunk {
            id,
            start: start + offset,
            len,
        });
        offset += len;
        id += 1;
    }

    chunks
}

pub fn chunk_count(total_len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    total_len.div_ceil(chunk_size)
}
