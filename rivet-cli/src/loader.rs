//! Loading of RISC-V ELF executables into simulator memory.

use goblin::elf::header::EM_RISCV;
use goblin::elf::section_header::{SHN_UNDEF, SHT_NOBITS};
use goblin::elf::sym::{STT_FUNC, STT_OBJECT};
use goblin::elf::Elf;
use log::debug;
use rivet_core::PagedMemory;
use std::collections::BTreeMap;
use thiserror::Error;

/// A program ready to run: initialized memory, the entry point, and the
/// addresses of its defined function and object symbols.
pub struct Image {
    pub memory: PagedMemory,
    pub entry: u32,
    pub symbols: BTreeMap<u32, String>,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("malformed ELF: {0}")]
    Elf(#[from] goblin::error::Error),
    #[error("not a 32-bit little-endian RISC-V executable")]
    WrongMachine,
    #[error("section {name:?} extends past the end of the file")]
    Truncated { name: String },
}

/// Parses `program_elf` and copies every allocatable section with file-backed
/// contents into a fresh [`PagedMemory`].
///
/// `SHT_NOBITS` sections (`.bss`) have no bytes in the file and need no copying
/// either, since fresh memory reads as zero.
pub fn load_elf(program_elf: &[u8]) -> Result<Image, LoadError> {
    let elf = Elf::parse(program_elf)?;

    if elf.is_64 || !elf.little_endian || elf.header.e_machine != EM_RISCV {
        return Err(LoadError::WrongMachine);
    }

    let mut memory = PagedMemory::new();

    let sections = elf
        .section_headers
        .iter()
        .filter(|h| h.is_alloc() && h.sh_type != SHT_NOBITS);

    for h in sections {
        let name = elf.shdr_strtab.get_at(h.sh_name).unwrap_or("").to_owned();
        let contents = h
            .file_range()
            .and_then(|range| program_elf.get(range))
            .ok_or_else(|| LoadError::Truncated { name: name.clone() })?;

        debug!(
            "loading section {:?} into memory at [{:#010x}..{:#010x}]",
            name,
            h.sh_addr,
            h.sh_addr + h.sh_size,
        );

        memory.write_bytes(h.sh_addr as u32, contents);
    }

    let mut symbols = BTreeMap::new();
    for sym in elf.syms.iter() {
        // Defined function and object symbols only; an st_shndx of SHN_UNDEF
        // marks a reference into some other binary.
        if !matches!(sym.st_type(), STT_FUNC | STT_OBJECT) || sym.st_shndx == SHN_UNDEF as usize {
            continue;
        }
        if let Some(name) = elf.strtab.get_at(sym.st_name) {
            if !name.is_empty() {
                symbols.insert(sym.st_value as u32, name.to_owned());
            }
        }
    }

    Ok(Image {
        memory,
        entry: elf.entry as u32,
        symbols,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use goblin::elf::header::EM_386;
    use goblin::elf::section_header::{
        SHF_ALLOC, SHF_EXECINSTR, SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB,
    };
    use goblin::elf::sym::STB_GLOBAL;
    use rivet_core::Memory;

    fn push_u16(image: &mut Vec<u8>, value: u16) {
        image.extend(value.to_le_bytes());
    }

    fn push_u32(image: &mut Vec<u8>, value: u32) {
        image.extend(value.to_le_bytes());
    }

    fn push_symbol(image: &mut Vec<u8>, name: u32, value: u32, info: u8, shndx: u16) {
        push_u32(image, name);
        push_u32(image, value);
        push_u32(image, 0); // st_size
        image.push(info);
        image.push(0); // st_other
        push_u16(image, shndx);
    }

    // sh_name, sh_type, sh_flags, sh_addr, sh_offset, sh_size, sh_link,
    // sh_info, sh_addralign, sh_entsize
    fn push_section_header(image: &mut Vec<u8>, fields: [u32; 10]) {
        for field in fields {
            push_u32(image, field);
        }
    }

    /// Hand-assembled ELF32: one loadable `.text` section holding two words at
    /// `0x10000`, and a symbol table with a function, an object, and an
    /// undefined reference.
    fn minimal_image(machine: u16) -> Vec<u8> {
        const ENTRY: u32 = 0x10000;
        const TEXT_OFFSET: u32 = 52;
        const SYMTAB_OFFSET: u32 = TEXT_OFFSET + 8;
        const STRTAB_OFFSET: u32 = SYMTAB_OFFSET + 4 * 16;
        const STRTAB: &[u8] = b"\0main\0data_obj\0external\0";
        const SHSTRTAB_OFFSET: u32 = STRTAB_OFFSET + STRTAB.len() as u32;
        const SHSTRTAB: &[u8] = b"\0.text\0.symtab\0.strtab\0.shstrtab\0";
        const SHOFF: u32 = (SHSTRTAB_OFFSET + SHSTRTAB.len() as u32 + 3) & !3;

        let mut image = vec![0x7F, b'E', b'L', b'F', 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        push_u16(&mut image, 2); // ET_EXEC
        push_u16(&mut image, machine);
        push_u32(&mut image, 1); // e_version
        push_u32(&mut image, ENTRY);
        push_u32(&mut image, 0); // e_phoff: no program headers
        push_u32(&mut image, SHOFF);
        push_u32(&mut image, 0); // e_flags
        push_u16(&mut image, 52); // e_ehsize
        push_u16(&mut image, 32); // e_phentsize
        push_u16(&mut image, 0); // e_phnum
        push_u16(&mut image, 40); // e_shentsize
        push_u16(&mut image, 5); // e_shnum
        push_u16(&mut image, 4); // e_shstrndx

        push_u32(&mut image, 0x05D0_0893); // addi x17, x0, 93
        push_u32(&mut image, 0x0000_0073); // ecall

        image.extend([0; 16]); // null symbol
        push_symbol(&mut image, 1, ENTRY, (STB_GLOBAL << 4) | STT_FUNC, 1);
        push_symbol(&mut image, 6, 0x20000, (STB_GLOBAL << 4) | STT_OBJECT, 1);
        push_symbol(&mut image, 15, 0, (STB_GLOBAL << 4) | STT_FUNC, SHN_UNDEF as u16);

        image.extend(STRTAB);
        image.extend(SHSTRTAB);
        image.resize(SHOFF as usize, 0);

        push_section_header(&mut image, [0; 10]);
        push_section_header(
            &mut image,
            [
                1,
                SHT_PROGBITS,
                SHF_ALLOC | SHF_EXECINSTR,
                ENTRY,
                TEXT_OFFSET,
                8,
                0,
                0,
                4,
                0,
            ],
        );
        push_section_header(
            &mut image,
            [7, SHT_SYMTAB, 0, 0, SYMTAB_OFFSET, 4 * 16, 3, 1, 4, 16],
        );
        push_section_header(
            &mut image,
            [15, SHT_STRTAB, 0, 0, STRTAB_OFFSET, STRTAB.len() as u32, 0, 0, 1, 0],
        );
        push_section_header(
            &mut image,
            [
                23,
                SHT_STRTAB,
                0,
                0,
                SHSTRTAB_OFFSET,
                SHSTRTAB.len() as u32,
                0,
                0,
                1,
                0,
            ],
        );
        image
    }

    #[test]
    fn test_rejects_non_elf_input() {
        assert!(matches!(
            load_elf(b"definitely not an elf"),
            Err(LoadError::Elf(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_machine() {
        assert!(matches!(
            load_elf(&minimal_image(EM_386)),
            Err(LoadError::WrongMachine)
        ));
    }

    #[test]
    fn test_loads_sections_entry_and_symbols() {
        let image = load_elf(&minimal_image(EM_RISCV)).unwrap();
        assert_eq!(0x10000, image.entry);
        assert_eq!(0x05D0_0893, image.memory.read_word(0x10000));
        assert_eq!(0x0000_0073, image.memory.read_word(0x10004));
        assert_eq!(Some("main"), image.symbols.get(&0x10000).map(String::as_str));
        assert_eq!(
            Some("data_obj"),
            image.symbols.get(&0x20000).map(String::as_str)
        );
        // The undefined reference stays out of the table.
        assert_eq!(2, image.symbols.len());
    }
}
