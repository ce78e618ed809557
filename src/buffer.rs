/*
 * Copyright (C) 2025 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

// don't bother shifting out a consumed prefix smaller than this
const COMPACT_MIN: usize = 4096;

/// Returns the position of the first occurrence of `marker` in `buf`.
///
/// Markers are expected to be short fixed byte strings, so a simple scan
/// is sufficient.
pub fn find_marker(buf: &[u8], marker: &[u8]) -> Option<usize> {
    if marker.is_empty() {
        return Some(0);
    }

    if buf.len() < marker.len() {
        return None;
    }

    for pos in 0..=(buf.len() - marker.len()) {
        if &buf[pos..(pos + marker.len())] == marker {
            return Some(pos);
        }
    }

    None
}

/// Growable byte buffer supporting appends at the tail and amortized O(1)
/// removal of a consumed prefix.
///
/// Consumed bytes are tracked with a start index rather than removed
/// immediately. The backing store is compacted on append once the dead
/// prefix dominates, so total cost over a stream is linear in the bytes
/// fed.
pub struct StreamBuffer {
    buf: Vec<u8>,
    start: usize,
}

#[allow(clippy::new_without_default)]
impl StreamBuffer {
    pub fn new() -> StreamBuffer {
        StreamBuffer {
            buf: Vec::new(),
            start: 0,
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.start = 0;
    }

    pub fn read_avail(&self) -> usize {
        self.buf.len() - self.start
    }

    pub fn read_buf(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    pub fn read_commit(&mut self, amount: usize) {
        assert!(self.start + amount <= self.buf.len());

        self.start += amount;
    }

    pub fn write(&mut self, src: &[u8]) {
        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        } else if self.start >= COMPACT_MIN && self.start * 2 >= self.buf.len() {
            self.buf.copy_within(self.start.., 0);

            let len = self.buf.len() - self.start;
            self.buf.truncate(len);
            self.start = 0;
        }

        self.buf.extend_from_slice(src);
    }
}
