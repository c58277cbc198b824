use crate::Word;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Slot {
    Empty,
    /// Offered this tick, not yet visible to the reader.
    Pending(Word),
    /// Visible and unclaimed.
    Ready(Word),
    /// Claimed this tick; the writer learns about it after the commit.
    Claimed,
    /// Claim committed, waiting for the writer to acknowledge.
    Delivered,
}

/// One direction of a link between two ports. Holds at most one value.
///
/// Values move through `offer` -> `step` -> `try_claim` -> `step` ->
/// `take_delivery`. `step` is the commit phase of a tick, so a value offered in
/// tick N can first be claimed in tick N+1, and the writer learns about a claim
/// made in tick N in tick N+1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pipe {
    slot: Slot,
}

impl Pipe {
    pub const fn new() -> Self {
        Self { slot: Slot::Empty }
    }

    /// Offer `value`. Refused while a previous value is still in flight.
    pub fn offer(&mut self, value: Word) -> bool {
        if self.slot != Slot::Empty {
            return false;
        }
        self.slot = Slot::Pending(value);
        true
    }

    pub fn try_claim(&mut self) -> Option<Word> {
        let Slot::Ready(value) = self.slot else {
            return None;
        };
        self.slot = Slot::Claimed;
        Some(value)
    }

    /// Commit phase.
    pub fn step(&mut self) {
        self.slot = match self.slot {
            Slot::Pending(value) => Slot::Ready(value),
            Slot::Claimed => Slot::Delivered,
            other => other,
        };
    }

    /// Writer side: true once, after a claim has been committed.
    pub fn take_delivery(&mut self) -> bool {
        if self.slot != Slot::Delivered {
            return false;
        }
        self.slot = Slot::Empty;
        true
    }

    /// Writer side: drop an offer nobody has claimed yet.
    pub fn withdraw(&mut self) {
        if matches!(self.slot, Slot::Pending(_) | Slot::Ready(_)) {
            self.slot = Slot::Empty;
        }
    }

    /// Forget everything, including a claim the writer has not seen.
    pub fn reset(&mut self) {
        self.slot = Slot::Empty;
    }

    pub fn is_empty(&self) -> bool {
        self.slot == Slot::Empty
    }

    /// True while a claim is in flight or awaiting acknowledgement.
    pub fn is_claimed(&self) -> bool {
        matches!(self.slot, Slot::Claimed | Slot::Delivered)
    }

    /// The value a reader could claim right now.
    pub fn peek(&self) -> Option<Word> {
        match self.slot {
            Slot::Ready(value) => Some(value),
            _ => None,
        }
    }
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn offer_is_invisible_until_committed() {
        let mut pipe = Pipe::new();
        assert!(pipe.offer(7));
        assert_eq!(pipe.try_claim(), None);
        pipe.step();
        assert_eq!(pipe.peek(), Some(7));
        assert_eq!(pipe.try_claim(), Some(7));
        assert_eq!(pipe.try_claim(), None);
    }

    #[test]
    fn unclaimed_value_is_not_overwritten() {
        let mut pipe = Pipe::new();
        assert!(pipe.offer(1));
        assert!(!pipe.offer(2));
        pipe.step();
        assert!(!pipe.offer(3));
        assert_eq!(pipe.try_claim(), Some(1));
        assert!(!pipe.offer(4));
    }

    #[test]
    fn writer_sees_claim_after_commit() {
        let mut pipe = Pipe::new();
        pipe.offer(5);
        pipe.step();
        pipe.try_claim();
        assert!(pipe.is_claimed());
        assert!(!pipe.take_delivery());
        pipe.step();
        assert!(pipe.take_delivery());
        assert!(pipe.is_empty());
        assert!(!pipe.take_delivery());
    }

    #[test]
    fn withdraw_keeps_claims() {
        let mut pipe = Pipe::new();
        pipe.offer(5);
        pipe.withdraw();
        assert!(pipe.is_empty());

        pipe.offer(6);
        pipe.step();
        pipe.try_claim();
        pipe.withdraw();
        assert!(pipe.is_claimed());
        pipe.reset();
        assert!(pipe.is_empty());
    }
}
