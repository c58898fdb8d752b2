use crate::error::MalformationError;
use crate::types::TypeKey;

/// Left-to-right cursor over the generic slots of container values.
///
/// One cursor is shared by a whole extraction or assembly tree, so every
/// slot is consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCursor {
    slots: Vec<TypeKey>,
    position: usize,
}

impl SignatureCursor {
    pub fn new(slots: &[TypeKey]) -> Self {
        Self {
            slots: slots.to_vec(),
            position: 0,
        }
    }

    /// Consumes the next slot.
    pub fn next_slot(&mut self) -> Result<TypeKey, MalformationError> {
        self.require(1)?;
        let slot = self.slots[self.position];
        self.position += 1;
        Ok(slot)
    }

    /// Fails unless at least `count` slots remain.
    pub fn require(&self, count: usize) -> Result<(), MalformationError> {
        if self.remaining() < count {
            return Err(MalformationError::UncompletedSignature {
                required: count,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    /// Independent cursor at the current position.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.slots.len() - self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Moves to the position reached by `other`, a fork of this cursor.
    pub(crate) fn catch_up(&mut self, other: &SignatureCursor) {
        self.position = other.position;
    }
}
