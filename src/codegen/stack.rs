/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

#[derive(Debug, Copy, Clone)]
struct StackSegment {
    cap: u32,
    end_index: u32,
}

// Per-procedure stack frame. Slots are handed out as rbp-relative
// offsets; a segment is reused for a new variable once the previous
// occupant's live interval has ended. `max_size` becomes the frame
// reservation in the prologue.
#[derive(Debug, Default)]
pub struct StackFrame {
    segments: Vec<StackSegment>,
    pub max_size: u32,
}

impl StackFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rbp-relative offset of a slot of `cap` bytes live over
    /// `[begin_index, end_index]`.
    pub fn alloc(&mut self, cap: u32, begin_index: u32, end_index: u32) -> u32 {
        let mut offset = 0;

        for segment in &mut self.segments {
            offset += segment.cap;
            if segment.cap >= cap && segment.end_index < begin_index {
                segment.end_index = end_index;
                return offset;
            }
        }

        self.segments.push(StackSegment { cap, end_index });
        self.max_size += cap;

        offset + cap
    }
}
