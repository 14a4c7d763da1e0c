use std::fmt::{Debug, Error, Formatter};
use std::iter::{Extend, FromIterator};
use std::ops::Sub;
use std::result::Result;
use std::slice::Iter;

/// Elements with a width, measured in slots (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", where offsets into the vector are given in
/// terms of the sum of the widths of the previous elements (as opposed to the number of preceding
/// elements).
///
/// The JVM measures both the operand stack and the constant pool this way: `long` and `double`
/// values take two slots, everything else takes one. Keeping the offsets next to the entries means
/// that the stack depth in slots is always available without having to re-walk the entries.
#[derive(Clone)]
pub struct OffsetVec<T: Sized> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,

    /// Offset for the first element (usually 0, but 1 for the constant pool)
    initial_offset: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

impl<T: Sized + Width> OffsetVec<T> {
    /// New empty offset vector
    pub fn new() -> OffsetVec<T> {
        OffsetVec::new_starting_at(Offset(0))
    }

    /// New empty offset vector, with a custom starting offset
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
            initial_offset,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset of the next element to be added (for a stack, this is the depth in slots)
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Add an entry to the back, returning the offset at which it was placed
    pub fn push(&mut self, slot: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += slot.width();
        self.entries.push((offset, slot));
        offset
    }

    /// Remove an entry from the back
    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop().map(|(offset, elem)| {
            self.offset_len = offset;
            elem
        })
    }

    /// Peek at the entry at the back
    pub fn last(&self) -> Option<&T> {
        self.entries.last().map(|(_, elem)| elem)
    }

    /// Empty the vector
    pub fn clear(&mut self) {
        self.entries.clear();
        self.offset_len = self.initial_offset;
    }

    /// Get an entry by the offset at which it starts
    pub fn get_offset(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(off, _)| *off)
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    pub fn iter(&self) -> OffsetVecIter<'_, T> {
        OffsetVecIter(self.entries.iter())
    }
}

impl<A: PartialEq> PartialEq for OffsetVec<A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<A: Eq> Eq for OffsetVec<A> {}

impl<A: Width> Default for OffsetVec<A> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

/// Iterator for borrowed `OffsetVec`, yielding entries with their offsets
pub struct OffsetVecIter<'a, T>(Iter<'a, (Offset, T)>);

impl<'a, T> Iterator for OffsetVecIter<'a, T> {
    type Item = (Offset, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(off, elem)| (*off, elem))
    }
}

impl<'a, T> DoubleEndedIterator for OffsetVecIter<'a, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(|(off, elem)| (*off, elem))
    }
}

impl<'a, T: Width> IntoIterator for &'a OffsetVec<T> {
    type Item = (Offset, &'a T);
    type IntoIter = OffsetVecIter<'a, T>;

    fn into_iter(self) -> OffsetVecIter<'a, T> {
        self.iter()
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<A: IntoIterator<Item = T>>(elems: A) -> Self {
        let mut offset_vec = OffsetVec::new();
        offset_vec.extend(elems);
        offset_vec
    }
}

impl<T: Width> Extend<T> for OffsetVec<T> {
    fn extend<U: IntoIterator<Item = T>>(&mut self, iter: U) {
        for elem in iter {
            self.push(elem);
        }
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Slot {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Slot {
        fn width(&self) -> usize {
            match self {
                Slot::Narrow(_) => 1,
                Slot::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn offsets_track_widths() {
        let slots: OffsetVec<Slot> = vec![Slot::Narrow(1), Slot::Wide(2), Slot::Narrow(3)]
            .into_iter()
            .collect();
        assert_eq!(
            slots.iter().map(|(off, s)| (off, *s)).collect::<Vec<_>>(),
            vec![
                (Offset(0), Slot::Narrow(1)),
                (Offset(1), Slot::Wide(2)),
                (Offset(3), Slot::Narrow(3)),
            ]
        );
        assert_eq!(slots.offset_len(), Offset(4));
        assert_eq!(slots.get_offset(Offset(1)), Some(&Slot::Wide(2)));
        assert_eq!(slots.get_offset(Offset(2)), None);
    }

    #[test]
    fn pop_restores_offset() {
        let mut slots: OffsetVec<Slot> = OffsetVec::new_starting_at(Offset(1));
        slots.push(Slot::Wide(7));
        slots.push(Slot::Narrow(8));
        assert_eq!(slots.offset_len(), Offset(4));
        assert_eq!(slots.pop(), Some(Slot::Narrow(8)));
        assert_eq!(slots.offset_len(), Offset(3));
        assert_eq!(slots.pop(), Some(Slot::Wide(7)));
        assert_eq!(slots.offset_len(), Offset(1));
        assert_eq!(slots.pop(), None);
    }
}
