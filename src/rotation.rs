// src/rotation.rs
//! Round-robin topic batches: a long topic list is swept a slice at a time
//! across cycles instead of burning the whole budget window every cycle.

use std::sync::Mutex;

pub struct TopicRotation {
    topics: Vec<String>,
    batch_size: usize,
    cursor: Mutex<usize>,
}

impl TopicRotation {
    pub fn new(topics: Vec<String>, batch_size: usize) -> Self {
        Self {
            topics,
            batch_size: batch_size.max(1),
            cursor: Mutex::new(0),
        }
    }

    /// The active slice, wrapping around the end of the list.
    pub fn current_batch(&self) -> Vec<String> {
        let len = self.topics.len();
        if len == 0 {
            return Vec::new();
        }
        let cursor = *self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        (0..self.batch_size.min(len))
            .map(|i| self.topics[(cursor + i) % len].clone())
            .collect()
    }

    pub fn advance(&self) {
        let len = self.topics.len();
        if len == 0 {
            return;
        }
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        *cursor = (*cursor + self.batch_size) % len;
    }

    /// Current batch, then move on.
    pub fn next_batch(&self) -> Vec<String> {
        let batch = self.current_batch();
        self.advance();
        batch
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
