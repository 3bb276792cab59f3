//! Binary heap merger.

use std::cmp::Ordering;
use std::mem;

use crate::heap;

/// Heap element: a sorted source together with its current item.
struct Cursor<T, I> {
    current: T,
    source: I,
}

/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of inputs. Memory usage is one item per non-exhausted input.
pub struct HeapMerger<T, E, I, F>
where
    I: Iterator<Item = Result<T, E>>,
    F: Fn(&T, &T) -> Ordering,
{
    cursors: Vec<Cursor<T, I>>,
    compare: F,
}

impl<T, E, I, F> HeapMerger<T, E, I, F>
where
    I: Iterator<Item = Result<T, E>>,
    F: Fn(&T, &T) -> Ordering,
{
    /// Creates a merger reading the first item of every input.
    /// Inputs yielding no items take no part in the merge.
    /// Input items should be sorted according to `compare` otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `sources` - Sorted inputs to be merged
    /// * `compare` - Function be be used to compare items
    pub fn new<S>(sources: S, compare: F) -> Result<Self, E>
    where
        S: IntoIterator<Item = I>,
    {
        let mut cursors = Vec::new();
        for (idx, mut source) in sources.into_iter().enumerate() {
            match source.next() {
                Some(item) => cursors.push(Cursor { current: item?, source }),
                None => log::debug!("merge input {} is empty, skipped", idx),
            }
        }

        let mut merger = HeapMerger { cursors, compare };
        let compare = &merger.compare;
        heap::heapify(&mut merger.cursors, &|a: &Cursor<T, I>, b: &Cursor<T, I>| {
            compare(&a.current, &b.current)
        });

        return Ok(merger);
    }

    /// Number of inputs that are not exhausted yet.
    pub fn active_inputs(&self) -> usize {
        self.cursors.len()
    }
}

impl<T, E, I, F> Iterator for HeapMerger<T, E, I, F>
where
    I: Iterator<Item = Result<T, E>>,
    F: Fn(&T, &T) -> Ordering,
{
    type Item = Result<T, E>;

    /// Returns the next item from the inputs in ascending order.
    /// After an input error the merger yields nothing more.
    fn next(&mut self) -> Option<Self::Item> {
        let root = self.cursors.first_mut()?;

        let result = match root.source.next() {
            Some(Ok(item)) => mem::replace(&mut root.current, item),
            Some(Err(err)) => {
                self.cursors.clear();
                return Some(Err(err));
            }
            None => {
                // exhausted input is released, the last heap slot takes its place
                let exhausted = self.cursors.swap_remove(0);
                exhausted.current
            }
        };

        let compare = &self.compare;
        heap::sift_down(&mut self.cursors, 0, &|a: &Cursor<T, I>, b: &Cursor<T, I>| {
            compare(&a.current, &b.current)
        });

        return Some(Ok(result));
    }
}
