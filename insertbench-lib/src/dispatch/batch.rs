use std::num::NonZeroUsize;

use super::{Batch, Event};

/// Groups events into [`Batch`]es of at most `size` events.
///
/// A batch is flushed as soon as it is full, the remainder
/// is flushed as a final, smaller batch once the events run out.
#[derive(Debug)]
pub struct Batches<I> {
    events: I,
    size: NonZeroUsize,
}

impl<I> Batches<I>
where
    I: Iterator<Item = Event>,
{
    pub fn new(events: I, size: NonZeroUsize) -> Self {
        Self { events, size }
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = Event>,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        let events: Vec<_> = self.events.by_ref().take(self.size.get()).collect();
        Batch::try_new(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::BTreeMap,
        time::{Duration, UNIX_EPOCH},
    };

    fn events(n: u64) -> impl Iterator<Item = Event> {
        (0..n).map(|i| {
            Event::new(
                "carol".to_owned(),
                BTreeMap::new(),
                UNIX_EPOCH + Duration::from_secs(i),
            )
        })
    }

    #[test]
    fn test_batches_flush_on_size_and_tail() {
        let sizes: Vec<_> = Batches::new(events(7), NonZeroUsize::new(3).unwrap())
            .map(|batch| batch.len())
            .collect();
        assert_eq!(sizes, [3, 3, 1]);

        let sizes: Vec<_> = Batches::new(events(4), NonZeroUsize::new(2).unwrap())
            .map(|batch| batch.len())
            .collect();
        assert_eq!(sizes, [2, 2]);
    }

    #[test]
    fn test_batches_keep_event_order() {
        let stamps: Vec<_> = Batches::new(events(5), NonZeroUsize::new(2).unwrap())
            .flat_map(|batch| {
                batch
                    .events()
                    .iter()
                    .map(Event::timestamp)
                    .collect::<Vec<_>>()
            })
            .collect();
        let expected: Vec<_> = events(5).map(|e| e.timestamp()).collect();
        assert_eq!(stamps, expected);
    }

    #[test]
    fn test_batches_of_nothing() {
        assert_eq!(
            Batches::new(events(0), NonZeroUsize::new(2).unwrap()).count(),
            0
        );
    }
}
