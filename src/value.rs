//! The fixed-width cell type shared by the value stack and instruction
//! streams.

use core::any::TypeId;
use core::mem::{align_of, size_of};

use static_assertions::const_assert_eq;

/// Any value that can live on the value stack or be embedded as an
/// immediate in an instruction stream.
///
/// A `Value` is always exactly 8 bytes and 8-byte aligned, regardless of
/// what it currently holds. In debug builds (or when the `harden` feature
/// is enabled) it additionally carries a tag identifying the type it was
/// last constructed from, so that [`Value::as_type`] can catch a caller
/// reading it back as the wrong type. Raw pointer-like payloads are always
/// funneled through [`RawPointer`] before being stored, so that the tag
/// collapses every pointer type to one, matching the source semantics.
#[derive(Clone, Copy)]
#[repr(align(8))]
pub struct Value {
    bytes: [u8; 8],
    #[cfg(any(debug_assertions, feature = "harden"))]
    tag: Tag,
}

const_assert_eq!(size_of::<[u8; 8]>(), 8);

/// Compares the raw bit pattern only; two values constructed from
/// different types that happen to share a bit pattern compare equal,
/// same as comparing the untagged cells the source project stores.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

#[cfg(any(debug_assertions, feature = "harden"))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tag {
    Uninitialized,
    Unknown,
    Typed(TypeId),
}

/// A single opaque pointer-like payload. Every pointer-ish quantity the
/// crate needs to store in a `Value` (function entry points, saved
/// breakpoint bodies) is funneled through this one type so that, in debug
/// builds, `Value`'s type tag collapses all of them to a single identity
/// rather than one per pointee type.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RawPointer(pub *const ());

// Safety: `RawPointer` is an opaque bit pattern; the crate never
// dereferences it, it only ferries indices and addresses through `Value`.
unsafe impl Send for RawPointer {}
unsafe impl Sync for RawPointer {}

impl Value {
    /// Constructs a `Value` holding an uninitialized payload. Reading it
    /// back (other than via `Value::Load`/`set_raw_value` first) is a
    /// contract violation.
    pub fn uninitialized() -> Self {
        Value {
            bytes: [0; 8],
            #[cfg(any(debug_assertions, feature = "harden"))]
            tag: Tag::Uninitialized,
        }
    }

    /// Constructs a `Value` holding `v`. `V` must be trivially copyable,
    /// no larger than 8 bytes, and no more strictly aligned than 8 bytes.
    pub fn new<V>(v: V) -> Self
    where
        V: Copy + 'static,
    {
        const {
            assert!(
                size_of::<V>() <= 8,
                "Value can only hold types up to 8 bytes"
            );
        }
        assert!(
            align_of::<V>() <= 8,
            "Value can only hold types aligned to at most 8 bytes"
        );
        let mut bytes = [0u8; 8];
        // Safety: `V` is `Copy` and no larger than `bytes`, so this is a
        // valid, non-overlapping byte copy.
        unsafe {
            core::ptr::copy_nonoverlapping(
                &v as *const V as *const u8,
                bytes.as_mut_ptr(),
                size_of::<V>(),
            );
        }
        Value {
            bytes,
            #[cfg(any(debug_assertions, feature = "harden"))]
            tag: Tag::Typed(TypeId::of::<V>()),
        }
    }

    /// Returns a `Value` holding the `bytes_to_load` bytes stored at `ptr`.
    /// Requires `bytes_to_load <= 8`. After a load the value's tag is
    /// "unknown", so any subsequent typed read is permitted.
    ///
    /// # Safety
    /// `ptr` must be valid to read `bytes_to_load` bytes from.
    pub unsafe fn load(ptr: *const u8, bytes_to_load: usize) -> Self {
        debug_assert!(bytes_to_load <= 8, "Bytes to load must not exceed 8.");
        let mut bytes = [0u8; 8];
        core::ptr::copy_nonoverlapping(ptr, bytes.as_mut_ptr(), bytes_to_load);
        Value {
            bytes,
            #[cfg(any(debug_assertions, feature = "harden"))]
            tag: Tag::Unknown,
        }
    }

    /// Stores `bytes_to_store` bytes of `value` into `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid to write `bytes_to_store` bytes to.
    pub unsafe fn store(value: Value, ptr: *mut u8, bytes_to_store: usize) {
        debug_assert!(bytes_to_store <= 8, "Bytes to store must not exceed 8.");
        core::ptr::copy_nonoverlapping(value.bytes.as_ptr(), ptr, bytes_to_store);
    }

    /// Returns the raw 64-bit bit pattern of this value.
    pub fn raw_value(&self) -> u64 {
        u64::from_ne_bytes(self.bytes)
    }

    /// Reconstitutes a `Value` from a bit pattern produced by
    /// [`Value::raw_value`]. The resulting value's tag is "unknown".
    pub fn from_raw_value(n: u64) -> Self {
        let mut v = Value::uninitialized();
        v.set_raw_value(n);
        v
    }

    /// Overwrites this value's bit pattern, marking its tag as "unknown".
    pub fn set_raw_value(&mut self, n: u64) {
        self.bytes = n.to_ne_bytes();
        #[cfg(any(debug_assertions, feature = "harden"))]
        {
            self.tag = Tag::Unknown;
        }
    }

    /// Reinterprets the stored bytes as `T`. In debug/hardened builds this
    /// panics with a diagnostic if `T` disagrees with the type this value
    /// was constructed from (unless the tag is "unknown", e.g. after a
    /// `load`/`set_raw_value`).
    pub fn as_type<T>(&self) -> T
    where
        T: Copy + 'static,
    {
        #[cfg(any(debug_assertions, feature = "harden"))]
        {
            let expected = TypeId::of::<T>();
            assert!(
                matches!(self.tag, Tag::Unknown) || self.tag == Tag::Typed(expected),
                "Value type mismatch: stored {:?}, requested {:?}",
                self.tag,
                expected,
            );
        }
        let mut out = core::mem::MaybeUninit::<T>::uninit();
        // Safety: `T` fits within the 8 bytes this `Value` always carries,
        // enforced at construction by `Value::new`.
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.bytes.as_ptr(),
                out.as_mut_ptr() as *mut u8,
                size_of::<T>(),
            );
            out.assume_init()
        }
    }
}

impl core::fmt::Debug for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Value(0x{:016x})", self.raw_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_raw_value() {
        let v = Value::new(42i64);
        let n = v.raw_value();
        let w = Value::from_raw_value(n);
        assert_eq!(w.as_type::<i64>(), 42);
    }

    #[test]
    fn load_and_store_roundtrip() {
        let payload: u32 = 0xdead_beef;
        let mut buf = [0u8; 8];
        unsafe {
            Value::store(Value::new(payload), buf.as_mut_ptr(), 4);
            let v = Value::load(buf.as_ptr(), 4);
            assert_eq!(v.as_type::<u32>(), payload);
        }
    }

    #[test]
    #[cfg_attr(not(any(debug_assertions, feature = "harden")), ignore)]
    #[should_panic(expected = "Value type mismatch")]
    fn tagged_read_with_wrong_type_panics() {
        let v = Value::new(3i32);
        let _ = v.as_type::<f32>();
    }

    #[test]
    fn unknown_tag_permits_any_read_after_raw_roundtrip() {
        let mut v = Value::new(3i32);
        v.set_raw_value(v.raw_value());
        let _ = v.as_type::<u64>();
    }

    #[quickcheck_macros::quickcheck]
    fn i64_round_trips_through_raw_value(n: i64) -> bool {
        Value::new(n).as_type::<i64>() == n
    }
}
