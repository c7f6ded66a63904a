//! fixtures shared by unit tests

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;

const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;

const DT_NULL: u64 = 0;
const DT_NEEDED: u64 = 1;
const DT_STRTAB: u64 = 5;
const DT_STRSZ: u64 = 10;

/// build a minimal little-endian ELF64 shared object whose dynamic section
/// declares `needed` as DT_NEEDED entries, in order
pub(crate) fn elf_with_needed(needed: &[&str]) -> Vec<u8> {
    let phnum = 2;
    let strtab_off = EHDR_SIZE + PHDR_SIZE * phnum;

    let mut strtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for name in needed {
        name_offsets.push(strtab.len() as u64);
        strtab.extend_from_slice(name.as_bytes());
        strtab.push(0);
    }

    let dyn_off = (strtab_off + strtab.len() + 7) & !7;
    let mut dynamic = Vec::new();
    for off in &name_offsets {
        push_dyn(&mut dynamic, DT_NEEDED, *off);
    }
    push_dyn(&mut dynamic, DT_STRTAB, strtab_off as u64);
    push_dyn(&mut dynamic, DT_STRSZ, strtab.len() as u64);
    push_dyn(&mut dynamic, DT_NULL, 0);

    let total = dyn_off + dynamic.len();
    let mut out = Vec::with_capacity(total);

    // e_ident: magic, ELFCLASS64, ELFDATA2LSB, EV_CURRENT, SYSV
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&3u16.to_le_bytes()); // ET_DYN
    out.extend_from_slice(&62u16.to_le_bytes()); // EM_X86_64
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    out.extend_from_slice(&(EHDR_SIZE as u64).to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    out.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
    out.extend_from_slice(&(phnum as u16).to_le_bytes());
    out.extend_from_slice(&64u16.to_le_bytes()); // e_shentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

    // identity-mapped load segment so vaddrs in .dynamic equal file offsets
    push_phdr(&mut out, PT_LOAD, 0, total);
    push_phdr(&mut out, PT_DYNAMIC, dyn_off, dynamic.len());

    out.extend_from_slice(&strtab);
    out.resize(dyn_off, 0);
    out.extend_from_slice(&dynamic);
    out
}

fn push_dyn(out: &mut Vec<u8>, tag: u64, val: u64) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&val.to_le_bytes());
}

fn push_phdr(out: &mut Vec<u8>, p_type: u32, offset: usize, size: usize) {
    out.extend_from_slice(&p_type.to_le_bytes());
    out.extend_from_slice(&4u32.to_le_bytes()); // PF_R
    out.extend_from_slice(&(offset as u64).to_le_bytes()); // p_offset
    out.extend_from_slice(&(offset as u64).to_le_bytes()); // p_vaddr
    out.extend_from_slice(&(offset as u64).to_le_bytes()); // p_paddr
    out.extend_from_slice(&(size as u64).to_le_bytes()); // p_filesz
    out.extend_from_slice(&(size as u64).to_le_bytes()); // p_memsz
    out.extend_from_slice(&8u64.to_le_bytes()); // p_align
}

#[test]
fn test_fixture_parses_with_goblin() {
    let bytes = elf_with_needed(&["libc.so.6", "libz.so.1"]);
    let elf = goblin::elf::Elf::parse(&bytes).unwrap();
    assert_eq!(elf.libraries, vec!["libc.so.6", "libz.so.1"]);
}
