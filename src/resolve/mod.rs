//! dependency closure: shared libraries of executables, kernel modules
//! and their load-order dependencies

pub mod elf;
pub mod modules;

pub use elf::{imported_libraries, ElfResolver, DEFAULT_LIB_DIRS};
pub use modules::{
    modules_in_dir, resolve_module, strip_exts, ModuleDb, ModuleMatcher, ModuleRecord, MODULES_DEP,
};
