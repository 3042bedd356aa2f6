mod tests_two_level;

use crate::error::Result;
use crate::iterator::Iter;

/// Vector-backed cursor used to drive the composition tests.
pub struct VecIter {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: Option<usize>,
}

impl VecIter {
    pub fn new(mut entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        VecIter { entries, pos: None }
    }
}

impl Iter for VecIter {
    fn valid(&self) -> bool {
        self.pos.is_some_and(|p| p < self.entries.len())
    }

    fn seek_to_first(&mut self) {
        self.pos = if self.entries.is_empty() { None } else { Some(0) };
    }

    fn seek_to_last(&mut self) {
        self.pos = self.entries.len().checked_sub(1);
    }

    fn seek(&mut self, target: &[u8]) {
        let idx = self.entries.partition_point(|(k, _)| k.as_slice() < target);
        self.pos = if idx < self.entries.len() { Some(idx) } else { None };
    }

    fn next(&mut self) {
        if let Some(p) = self.pos {
            self.pos = if p + 1 < self.entries.len() { Some(p + 1) } else { None };
        }
    }

    fn prev(&mut self) {
        self.pos = match self.pos {
            Some(p) => p.checked_sub(1),
            None => None,
        };
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.pos.unwrap()].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos.unwrap()].1
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
