//! Scoped protocol configuration.
//!
//! Some codec decisions (which character set text fields use, which TLV
//! dictionary types tag values, which vendor quirks apply) are not carried
//! on the wire; they are ambient state negotiated out-of-band. This module
//! holds them as a per-thread stack of frames over one shared root: reads
//! walk from the innermost frame outward, writes go to the innermost frame,
//! and [`enter`] pushes a frame that is popped again when the returned guard
//! drops, even on unwind.
//!
//! Deleting a key records a tombstone in the innermost frame, masking any
//! outer value until the frame is left.

use std::cell::RefCell;
use std::sync::{Mutex, PoisonError};

use crate::charset::CharacterSet;
use crate::tlv::Dictionary;
use crate::types::VendorQuirks;

#[derive(Debug, Clone, Copy)]
struct Slot<T: Copy> {
    value: Option<T>,
    deleted: bool,
}

impl<T: Copy> Slot<T> {
    const EMPTY: Slot<T> = Slot {
        value: None,
        deleted: false,
    };

    fn set(&mut self, value: T) {
        self.value = Some(value);
        self.deleted = false;
    }

    fn delete(&mut self) {
        self.value = None;
        self.deleted = true;
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    character_set: Slot<CharacterSet>,
    tlv_dictionary: Slot<&'static Dictionary>,
    vendor_quirks: Slot<VendorQuirks>,
}

impl Frame {
    const EMPTY: Frame = Frame {
        character_set: Slot::EMPTY,
        tlv_dictionary: Slot::EMPTY,
        vendor_quirks: Slot::EMPTY,
    };
}

static GLOBAL: Mutex<Frame> = Mutex::new(Frame::EMPTY);

thread_local! {
    // Every thread starts with an empty base frame on top of the shared
    // root, so top-level writes stay thread-local.
    static STACK: RefCell<Vec<Frame>> = RefCell::new(vec![Frame::EMPTY]);
}

fn lookup<T: Copy>(slot_of: fn(&Frame) -> &Slot<T>) -> Option<T> {
    let local = STACK.with(|stack| {
        for frame in stack.borrow().iter().rev() {
            let slot = slot_of(frame);
            if slot.deleted {
                return Some(None);
            }
            if slot.value.is_some() {
                return Some(slot.value);
            }
        }
        None
    });
    match local {
        Some(resolved) => resolved,
        None => {
            let root = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = slot_of(&root);
            if slot.deleted {
                None
            } else {
                slot.value
            }
        }
    }
}

fn with_innermost(f: impl FnOnce(&mut Frame)) {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let frame = stack.last_mut().expect("context stack never empty");
        f(frame);
    });
}

/// Overrides for a context frame pushed with [`enter`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub character_set: Option<CharacterSet>,
    pub tlv_dictionary: Option<&'static Dictionary>,
    pub vendor_quirks: Option<VendorQuirks>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn character_set(mut self, set: CharacterSet) -> Self {
        self.character_set = Some(set);
        self
    }

    pub fn tlv_dictionary(mut self, dict: &'static Dictionary) -> Self {
        self.tlv_dictionary = Some(dict);
        self
    }

    pub fn vendor_quirks(mut self, quirks: VendorQuirks) -> Self {
        self.vendor_quirks = Some(quirks);
        self
    }
}

/// Pops the frame pushed by [`enter`] when dropped.
#[must_use = "the frame is popped when the guard drops"]
pub struct ContextGuard(());

impl Drop for ContextGuard {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Pushes a context frame with the given overrides.
pub fn enter(overrides: Overrides) -> ContextGuard {
    let mut frame = Frame::EMPTY;
    if let Some(set) = overrides.character_set {
        frame.character_set.set(set);
    }
    if let Some(dict) = overrides.tlv_dictionary {
        frame.tlv_dictionary.set(dict);
    }
    if let Some(quirks) = overrides.vendor_quirks {
        frame.vendor_quirks.set(quirks);
    }
    STACK.with(|stack| stack.borrow_mut().push(frame));
    ContextGuard(())
}

/// The active character set; CP437 ("ZVT 8-bit") if none was configured.
pub fn character_set() -> CharacterSet {
    lookup(|f| &f.character_set).unwrap_or(CharacterSet::DEFAULT)
}

pub fn set_character_set(set: CharacterSet) {
    with_innermost(|f| f.character_set.set(set));
}

pub fn delete_character_set() {
    with_innermost(|f| f.character_set.delete());
}

/// The explicitly selected TLV dictionary, if any. Callers fall back to the
/// quirk-appropriate ZVT dictionary.
pub fn tlv_dictionary() -> Option<&'static Dictionary> {
    lookup(|f| &f.tlv_dictionary)
}

pub fn set_tlv_dictionary(dict: &'static Dictionary) {
    with_innermost(|f| f.tlv_dictionary.set(dict));
}

/// The active vendor quirk set; empty by default.
pub fn vendor_quirks() -> VendorQuirks {
    lookup(|f| &f.vendor_quirks).unwrap_or_default()
}

pub fn set_vendor_quirks(quirks: VendorQuirks) {
    with_innermost(|f| f.vendor_quirks.set(quirks));
}

/// Writes the character set into the shared root, visible to every thread
/// that has no more specific value. Used after registration when the PT
/// announces its character set.
pub fn set_global_character_set(set: CharacterSet) {
    let mut root = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
    root.character_set.set(set);
}
