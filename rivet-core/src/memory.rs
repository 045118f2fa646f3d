//! The memory interface consumed by the execution engine, and a sparse implementation.
//!
//! The engine accesses memory one byte, halfword, or word at a time and performs no
//! bounds or alignment checking of its own: every operation must be defined for every
//! 32-bit address, and what "defined" means for addresses a program never legitimately
//! touches is the implementor's choice. All multi-byte values are little-endian, as
//! everywhere else in RV32.

use std::collections::HashMap;

/// Byte-addressed storage as seen by the execution engine.
///
/// Accesses can never fail and must not panic for any address. Multi-byte accesses
/// are little-endian and need not be naturally aligned; an access that runs past
/// `0xffff_ffff` wraps around to address `0`.
///
/// Only the byte accessors are required. The halfword and word accessors have
/// byte-composing default implementations; implementors with contiguous backing
/// storage may override them.
pub trait Memory {
    /// Returns the byte stored at `address`.
    fn read_byte(&self, address: u32) -> u8;

    /// Stores one byte at `address`.
    fn write_byte(&mut self, address: u32, value: u8);

    /// Returns the little-endian halfword stored at `address..address + 2`.
    fn read_halfword(&self, address: u32) -> u16 {
        u16::from_le_bytes([
            self.read_byte(address),
            self.read_byte(address.wrapping_add(1)),
        ])
    }

    /// Stores a halfword at `address..address + 2` in little-endian byte order.
    fn write_halfword(&mut self, address: u32, value: u16) {
        let bytes = value.to_le_bytes();
        self.write_byte(address, bytes[0]);
        self.write_byte(address.wrapping_add(1), bytes[1]);
    }

    /// Returns the little-endian word stored at `address..address + 4`.
    fn read_word(&self, address: u32) -> u32 {
        u32::from_le_bytes([
            self.read_byte(address),
            self.read_byte(address.wrapping_add(1)),
            self.read_byte(address.wrapping_add(2)),
            self.read_byte(address.wrapping_add(3)),
        ])
    }

    /// Stores a word at `address..address + 4` in little-endian byte order.
    fn write_word(&mut self, address: u32, value: u32) {
        let bytes = value.to_le_bytes();
        for (i, byte) in bytes.into_iter().enumerate() {
            self.write_byte(address.wrapping_add(i as u32), byte);
        }
    }
}

const PAGE_SHIFT: u32 = 12;
const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;

const_assert!(PAGE_SIZE.is_power_of_two());

/// Sparse memory covering the full 32-bit address space.
///
/// Backing pages of [`PAGE_SIZE`] bytes are allocated on first write; reads from
/// addresses no page has been allocated for return `0`. This makes every address
/// defined without committing 4 GiB up front, and leaves BSS-style regions zero
/// without anyone having to clear them.
#[derive(Debug, Clone, Default)]
pub struct PagedMemory {
    pages: HashMap<u32, Box<[u8; PAGE_SIZE as usize]>>,
}

impl PagedMemory {
    /// Returns an empty memory; every address reads as `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `bytes` into memory starting at `address`, wrapping at the end of the
    /// address space.
    pub fn write_bytes(&mut self, address: u32, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            self.write_byte(address.wrapping_add(i as u32), byte);
        }
    }

    fn page_offset(address: u32) -> usize {
        (address & (PAGE_SIZE - 1)) as usize
    }
}

impl Memory for PagedMemory {
    fn read_byte(&self, address: u32) -> u8 {
        match self.pages.get(&(address >> PAGE_SHIFT)) {
            Some(page) => page[Self::page_offset(address)],
            None => 0,
        }
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        let page = self
            .pages
            .entry(address >> PAGE_SHIFT)
            .or_insert_with(|| Box::new([0; PAGE_SIZE as usize]));
        page[Self::page_offset(address)] = value;
    }
}
