//! Array storage (spec §3's `ARYTAB` region, spec §4.6 `DIM`).
//!
//! An array is dense and rectangular. Bounds are inclusive of the
//! declared subscript, so `DIM A(10)` allocates eleven elements
//! (indices `0..=10`), matching the reference dialect's default base-0
//! indexing (spec §4.6).

use std::collections::HashMap;

use crate::error::BasicError;
use crate::strheap::StringDescriptor;
use crate::vars::{canonical_name, Slot};

/// The implicit dimension an array gets if it's subscripted before any
/// explicit `DIM` (spec §4.6: `DIM`-less use defaults every declared
/// dimension to 10, i.e. eleven elements).
pub const IMPLICIT_DIM: u16 = 10;

pub struct ArrayDescriptor {
    pub is_string: bool,
    pub dims: Vec<u16>,
    data: Vec<Slot>,
}

impl ArrayDescriptor {
    fn new(dims: Vec<u16>, is_string: bool) -> Self {
        let len: usize = dims.iter().map(|&d| d as usize + 1).product();
        let default = if is_string {
            Slot::Str(StringDescriptor::EMPTY)
        } else {
            Slot::Number(0.0)
        };
        let mut data = Vec::with_capacity(len);
        data.resize_with(len, || default.clone());
        ArrayDescriptor {
            is_string,
            dims,
            data,
        }
    }

    fn flat_index(&self, subscripts: &[u16]) -> Result<usize, BasicError> {
        if subscripts.len() != self.dims.len() {
            return Err(BasicError::SubscriptOutOfRange);
        }
        let mut index: usize = 0;
        for (sub, dim) in subscripts.iter().zip(self.dims.iter()) {
            if *sub > *dim {
                return Err(BasicError::SubscriptOutOfRange);
            }
            index = index * (*dim as usize + 1) + *sub as usize;
        }
        Ok(index)
    }

    pub fn get(&self, subscripts: &[u16]) -> Result<&Slot, BasicError> {
        let idx = self.flat_index(subscripts)?;
        Ok(&self.data[idx])
    }

    pub fn set(&mut self, subscripts: &[u16], slot: Slot) -> Result<(), BasicError> {
        let idx = self.flat_index(subscripts)?;
        self.data[idx] = slot;
        Ok(())
    }
}

#[derive(Default)]
pub struct ArrayTable {
    arrays: HashMap<String, ArrayDescriptor>,
}

impl ArrayTable {
    pub fn new() -> Self {
        ArrayTable {
            arrays: HashMap::new(),
        }
    }

    /// Explicit `DIM`. Errors `REDIMENSIONED ARRAY` if the name is
    /// already dimensioned (spec §4.6, §7), including by the implicit
    /// default, since the reference dialect treats first-touch sizing
    /// as equally binding.
    pub fn dim(&mut self, name: &str, dims: Vec<u16>, is_string: bool) -> Result<(), BasicError> {
        let key = canonical_name(name);
        if self.arrays.contains_key(&key) {
            return Err(BasicError::RedimensionedArray);
        }
        self.arrays
            .insert(key, ArrayDescriptor::new(dims, is_string));
        Ok(())
    }

    /// Look up an array, implicitly `DIM`-ing it at `IMPLICIT_DIM` in
    /// every requested dimension on first subscripted reference.
    fn get_or_implicit_dim(
        &mut self,
        name: &str,
        dim_count: usize,
        is_string: bool,
    ) -> &mut ArrayDescriptor {
        let key = canonical_name(name);
        self.arrays.entry(key).or_insert_with(|| {
            ArrayDescriptor::new(vec![IMPLICIT_DIM; dim_count], is_string)
        })
    }

    /// Read a slot. Callers resolve `Slot::Str` against the string heap
    /// themselves (the array table has no `MemoryImage` access).
    pub fn get_slot(
        &mut self,
        name: &str,
        subscripts: &[u16],
        is_string: bool,
    ) -> Result<Slot, BasicError> {
        let arr = self.get_or_implicit_dim(name, subscripts.len(), is_string);
        arr.get(subscripts).map(|s| s.clone())
    }

    pub fn set_number(
        &mut self,
        name: &str,
        subscripts: &[u16],
        value: f64,
    ) -> Result<(), BasicError> {
        let arr = self.get_or_implicit_dim(name, subscripts.len(), false);
        arr.set(subscripts, Slot::Number(value))
    }

    pub fn set_string(
        &mut self,
        name: &str,
        subscripts: &[u16],
        desc: StringDescriptor,
    ) -> Result<(), BasicError> {
        let arr = self.get_or_implicit_dim(name, subscripts.len(), true);
        arr.set(subscripts, Slot::Str(desc))
    }

    pub fn clear(&mut self) {
        self.arrays.clear();
    }

    pub fn live_string_descriptors(&mut self) -> Vec<&mut StringDescriptor> {
        self.arrays
            .values_mut()
            .filter(|arr| arr.is_string)
            .flat_map(|arr| arr.data.iter_mut())
            .filter_map(|slot| match slot {
                Slot::Str(desc) => Some(desc),
                Slot::Number(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dim_ten_allocates_eleven_elements_zero_through_ten() {
        let mut table = ArrayTable::new();
        table.dim("A", vec![10], false).unwrap();
        assert!(table.set_number("A", &[10], 5.0).is_ok());
        assert_eq!(
            table.set_number("A", &[11], 5.0),
            Err(BasicError::SubscriptOutOfRange)
        );
    }

    #[test]
    fn redimensioning_an_existing_array_errors() {
        let mut table = ArrayTable::new();
        table.dim("A", vec![5], false).unwrap();
        assert_eq!(
            table.dim("A", vec![10], false),
            Err(BasicError::RedimensionedArray)
        );
    }

    #[test]
    fn subscripted_reference_without_dim_gets_implicit_size_ten() {
        let mut table = ArrayTable::new();
        assert!(table.set_number("B", &[10], 1.0).is_ok());
        assert_eq!(
            table.set_number("B", &[11], 1.0),
            Err(BasicError::SubscriptOutOfRange)
        );
    }

    #[test]
    fn two_dimensional_indices_round_trip() {
        let mut table = ArrayTable::new();
        table.dim("M", vec![2, 2], false).unwrap();
        table.set_number("M", &[1, 2], 9.0).unwrap();
        match table.get_slot("M", &[1, 2], false).unwrap() {
            Slot::Number(n) => assert_eq!(n, 9.0),
            _ => panic!("expected number"),
        }
        match table.get_slot("M", &[2, 1], false).unwrap() {
            Slot::Number(n) => assert_eq!(n, 0.0),
            _ => panic!("expected number"),
        }
    }
}
