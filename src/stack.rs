//! `FOR`/`NEXT` and `GOSUB`/`RETURN` runtime stacks (spec §3, §4.6).
//!
//! The reference dialect keeps both on one combined stack so a `GOSUB`
//! inside a `FOR` loop (or vice versa) nests correctly. We keep the
//! teacher's separate-`Vec` shape but record each `GOSUB` frame's
//! `for_depth` so `RETURN` can still truncate `FOR` frames opened since,
//! matching the combined-stack ordering without merging the two `Vec`s.

use crate::error::BasicError;

/// Real C64 BASIC's stack is bounded by the 6502 hardware stack; 256
/// frames is the conventional depth used to detect runaway recursion.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub struct ForFrame {
    pub var_name: String,
    pub step: f64,
    pub limit: f64,
    /// Where `NEXT` resumes: the line and byte offset just past the
    /// `FOR` statement's token stream.
    pub resume_line: u16,
    pub resume_offset: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct GosubFrame {
    pub resume_line: u16,
    pub resume_offset: usize,
    /// How many `FOR` frames were open when this `GOSUB` was pushed, so
    /// `RETURN` can discard any opened inside the subroutine (spec §4.5:
    /// "discarding FOR frames above it").
    for_depth: usize,
}

#[derive(Default)]
pub struct RuntimeStack {
    for_frames: Vec<ForFrame>,
    gosub_frames: Vec<GosubFrame>,
}

impl RuntimeStack {
    pub fn new() -> Self {
        RuntimeStack {
            for_frames: Vec::new(),
            gosub_frames: Vec::new(),
        }
    }

    pub fn push_for(&mut self, frame: ForFrame) -> Result<(), BasicError> {
        if self.for_frames.len() >= MAX_DEPTH {
            return Err(BasicError::OutOfMemory);
        }
        self.for_frames.push(frame);
        Ok(())
    }

    pub fn push_gosub(&mut self, resume_line: u16, resume_offset: usize) -> Result<(), BasicError> {
        if self.gosub_frames.len() >= MAX_DEPTH {
            return Err(BasicError::OutOfMemory);
        }
        self.gosub_frames.push(GosubFrame {
            resume_line,
            resume_offset,
            for_depth: self.for_frames.len(),
        });
        Ok(())
    }

    /// Pop the most recent `GOSUB` frame, discarding any `FOR` frames
    /// opened since it was pushed (spec §4.5).
    pub fn pop_gosub(&mut self) -> Result<GosubFrame, BasicError> {
        let frame = self.gosub_frames.pop().ok_or(BasicError::ReturnWithoutGosub)?;
        self.for_frames.truncate(frame.for_depth);
        Ok(frame)
    }

    /// `NEXT` with no variable name binds to the innermost open loop.
    /// `NEXT X` pops every loop opened after `X`'s, then `X`'s own frame,
    /// matching the reference dialect's tolerance for `NEXT` naming an
    /// outer loop while skipping the ones nested inside it (spec §4.6).
    pub fn find_for(&mut self, var_name: Option<&str>) -> Result<&ForFrame, BasicError> {
        match var_name {
            None => self.for_frames.last().ok_or(BasicError::NextWithoutFor),
            Some(name) => {
                let key = crate::vars::canonical_name(name);
                if let Some(pos) = self
                    .for_frames
                    .iter()
                    .rposition(|f| f.var_name == key)
                {
                    self.for_frames.truncate(pos + 1);
                    Ok(&self.for_frames[pos])
                } else {
                    Err(BasicError::NextWithoutFor)
                }
            }
        }
    }

    pub fn pop_for(&mut self) -> Option<ForFrame> {
        self.for_frames.pop()
    }

    pub fn for_depth(&self) -> usize {
        self.for_frames.len()
    }

    pub fn gosub_depth(&self) -> usize {
        self.gosub_frames.len()
    }

    pub fn clear(&mut self) {
        self.for_frames.clear();
        self.gosub_frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str, line: u16) -> ForFrame {
        ForFrame {
            var_name: name.to_string(),
            step: 1.0,
            limit: 10.0,
            resume_line: line,
            resume_offset: 0,
        }
    }

    #[test]
    fn next_without_for_errors_on_empty_stack() {
        let mut stack = RuntimeStack::new();
        assert_eq!(stack.find_for(None).unwrap_err(), BasicError::NextWithoutFor);
    }

    #[test]
    fn bare_next_binds_to_innermost_loop() {
        let mut stack = RuntimeStack::new();
        stack.push_for(frame("I", 10)).unwrap();
        stack.push_for(frame("J", 20)).unwrap();
        assert_eq!(stack.find_for(None).unwrap().var_name, "J");
    }

    #[test]
    fn next_naming_an_outer_loop_closes_the_inner_ones_too() {
        let mut stack = RuntimeStack::new();
        stack.push_for(frame("I", 10)).unwrap();
        stack.push_for(frame("J", 20)).unwrap();
        stack.push_for(frame("K", 30)).unwrap();
        stack.find_for(Some("I")).unwrap();
        assert_eq!(stack.for_depth(), 1);
    }

    #[test]
    fn return_without_gosub_errors() {
        let mut stack = RuntimeStack::new();
        assert_eq!(stack.pop_gosub().unwrap_err(), BasicError::ReturnWithoutGosub);
    }

    #[test]
    fn gosub_stack_overflow_is_out_of_memory() {
        let mut stack = RuntimeStack::new();
        for _ in 0..MAX_DEPTH {
            stack.push_gosub(1, 0).unwrap();
        }
        assert_eq!(stack.push_gosub(1, 0).unwrap_err(), BasicError::OutOfMemory);
    }

    #[test]
    fn return_discards_for_frames_opened_inside_the_subroutine() {
        let mut stack = RuntimeStack::new();
        stack.push_for(frame("I", 10)).unwrap();
        stack.push_gosub(20, 5).unwrap();
        stack.push_for(frame("J", 30)).unwrap();
        stack.push_for(frame("K", 40)).unwrap();
        stack.pop_gosub().unwrap();
        assert_eq!(stack.for_depth(), 1);
        assert_eq!(stack.find_for(None).unwrap().var_name, "I");
    }
}
