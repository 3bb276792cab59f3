//! Binary min-heap primitives over slices.
//!
//! The heap is the slice itself, so a heap shrinks by re-slicing or truncating the backing vector.
//! Element order is defined by an injected compare function; the root (`items[0]`) is always the minimum.

use std::cmp::Ordering;

/// Rearranges `items` into heap order in *O(n)*.
pub fn heapify<T, F>(items: &mut [T], compare: &F)
where
    F: Fn(&T, &T) -> Ordering,
{
    for index in (0..items.len() / 2).rev() {
        sift_down(items, index, compare);
    }
}

/// Restores heap order of the subtree rooted at `index`, assuming both child subtrees are already heaps.
pub fn sift_down<T, F>(items: &mut [T], mut index: usize, compare: &F)
where
    F: Fn(&T, &T) -> Ordering,
{
    let len = items.len();
    loop {
        let left = 2 * index + 1;
        if left >= len {
            break;
        }

        let right = left + 1;
        let smallest = if right < len && compare(&items[right], &items[left]) == Ordering::Less {
            right
        } else {
            left
        };

        if compare(&items[smallest], &items[index]) != Ordering::Less {
            break;
        }

        items.swap(index, smallest);
        index = smallest;
    }
}

#[cfg(test)]
pub(crate) fn is_heap<T, F>(items: &[T], compare: &F) -> bool
where
    F: Fn(&T, &T) -> Ordering,
{
    (1..items.len()).all(|child| compare(&items[(child - 1) / 2], &items[child]) != Ordering::Greater)
}
