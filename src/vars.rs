//! The scalar variable table (spec §3's `VARTAB` region, spec §4.6 `LET`).
//!
//! Names are canonicalized the way the real tokenizer does: only the
//! first two letters (plus a trailing `$` for strings) are significant,
//! so `SCORE` and `SC` collide deliberately. Storage itself is a typed
//! `HashMap` rather than a byte-packed table; see the note atop
//! `memory.rs`.

use std::collections::HashMap;

use crate::error::BasicError;
use crate::strheap::StringDescriptor;
use crate::value::Value;

/// One scalar slot: a plain number, or a string heap descriptor plus a
/// cached copy of its text for cheap reads. Keeping both avoids a heap
/// read on every variable reference while still letting GC relocate the
/// descriptor and have the cache refreshed from it afterward.
#[derive(Debug, Clone)]
pub enum Slot {
    Number(f64),
    Str(StringDescriptor),
}

/// Canonicalize a variable name to its significant form: first two
/// letters/digits of the base name, plus `$` for strings. BASIC is
/// case-insensitive at the token level, so callers are expected to have
/// already upper-cased the raw source name.
pub fn canonical_name(raw: &str) -> String {
    let (base, is_string) = if let Some(stripped) = raw.strip_suffix('$') {
        (stripped, true)
    } else {
        (raw, false)
    };
    let mut out: String = base.chars().take(2).collect();
    if is_string {
        out.push('$');
    }
    out
}

#[derive(Default)]
pub struct ScalarTable {
    slots: HashMap<String, Slot>,
}

impl ScalarTable {
    pub fn new() -> Self {
        ScalarTable {
            slots: HashMap::new(),
        }
    }

    /// Read a scalar, defaulting to `0` or `""` if it has never been
    /// assigned (spec §4.6: reading an undefined variable does not error).
    pub fn get(&self, name: &str, image: &crate::memory::MemoryImage) -> Value {
        let key = canonical_name(name);
        match self.slots.get(&key) {
            Some(Slot::Number(n)) => Value::Number(*n),
            Some(Slot::Str(desc)) => {
                Value::Str(String::from_utf8_lossy(desc.read(image)).into_owned())
            }
            None => Value::default_for(key.ends_with('$')),
        }
    }

    /// Store a value, rejecting a number into a string slot or vice
    /// versa (spec §7 `TYPE MISMATCH`). Strings must already be on the
    /// heap (see `strheap::alloc`); this just records the descriptor.
    pub fn set_number(&mut self, name: &str, value: f64) -> Result<(), BasicError> {
        let key = canonical_name(name);
        if key.ends_with('$') {
            return Err(BasicError::TypeMismatch);
        }
        self.slots.insert(key, Slot::Number(value));
        Ok(())
    }

    pub fn set_string(&mut self, name: &str, desc: StringDescriptor) -> Result<(), BasicError> {
        let key = canonical_name(name);
        if !key.ends_with('$') {
            return Err(BasicError::TypeMismatch);
        }
        self.slots.insert(key, Slot::Str(desc));
        Ok(())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Every live string descriptor, for GC enumeration.
    pub fn live_string_descriptors(&mut self) -> Vec<&mut StringDescriptor> {
        self.slots
            .values_mut()
            .filter_map(|slot| match slot {
                Slot::Str(desc) => Some(desc),
                Slot::Number(_) => None,
            })
            .collect()
    }

    /// A name -> value snapshot of every assigned scalar, for the
    /// execution tracer.
    pub fn snapshot(&self, image: &crate::memory::MemoryImage) -> HashMap<String, Value> {
        self.slots
            .iter()
            .map(|(name, slot)| {
                let value = match slot {
                    Slot::Number(n) => Value::Number(*n),
                    Slot::Str(desc) => {
                        Value::Str(String::from_utf8_lossy(desc.read(image)).into_owned())
                    }
                };
                (name.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_collapse_to_first_two_significant_characters() {
        assert_eq!(canonical_name("SCORE"), "SC");
        assert_eq!(canonical_name("SC"), "SC");
        assert_eq!(canonical_name("NAME$"), "NA$");
    }

    #[test]
    fn unset_scalar_reads_as_default_for_its_type() {
        let table = ScalarTable::new();
        let image = crate::memory::MemoryImage::new(0xFFFF);
        assert_eq!(table.get("X", &image), Value::Number(0.0));
        assert_eq!(table.get("N$", &image), Value::Str(String::new()));
    }

    #[test]
    fn assigning_a_number_into_a_string_slot_is_a_type_mismatch() {
        let mut table = ScalarTable::new();
        assert_eq!(
            table.set_number("A$", 1.0),
            Err(BasicError::TypeMismatch)
        );
    }

    #[test]
    fn numeric_round_trip() {
        let mut table = ScalarTable::new();
        table.set_number("X", 42.0).unwrap();
        let image = crate::memory::MemoryImage::new(0xFFFF);
        assert_eq!(table.get("X", &image), Value::Number(42.0));
    }
}
