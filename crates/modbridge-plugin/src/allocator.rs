//! Module allocator handed to factories.
//!
//! Memory handed out stays valid until the allocator is dropped, which
//! happens when the owning plugin is unloaded.

use std::cell::RefCell;
use std::ffi::c_void;

use tracing::{trace, warn};

use modbridge_sdk::abi::{Dword, IModuleAllocator, IModuleAllocatorVtbl};

/// Blocks are built from 16-byte units so every allocation is 16-byte aligned.
type Unit = u128;
const UNIT: usize = std::mem::size_of::<Unit>();

static ALLOCATOR_VTBL: IModuleAllocatorVtbl = IModuleAllocatorVtbl {
    allocate_memory,
};

/// Emulated `IModuleAllocator`.
#[repr(C)]
pub struct ModuleAllocator {
    base: IModuleAllocator,
    blocks: RefCell<Vec<Box<[Unit]>>>,
}

impl ModuleAllocator {
    /// Creates an empty allocator. Boxed so the interface pointer is stable.
    pub fn new() -> Box<Self> {
        Box::new(Self {
            base: IModuleAllocator {
                vtbl: &ALLOCATOR_VTBL,
            },
            blocks: RefCell::new(Vec::new()),
        })
    }

    /// Pointer to pass to a factory.
    pub fn as_raw(&self) -> *mut IModuleAllocator {
        std::ptr::from_ref(&self.base).cast_mut()
    }

    /// Allocates `size` zeroed bytes. Returns null if the memory cannot be
    /// reserved.
    pub fn allocate(&self, size: usize) -> *mut c_void {
        let units = size.div_ceil(UNIT).max(1);
        let mut block: Vec<Unit> = Vec::new();
        if block.try_reserve_exact(units).is_err() {
            warn!(size = size, "Module allocation failed");
            return std::ptr::null_mut();
        }
        block.resize(units, 0);

        let mut block = block.into_boxed_slice();
        let ptr = block.as_mut_ptr().cast::<c_void>();
        self.blocks.borrow_mut().push(block);
        trace!(size = size, "Module memory allocated");
        ptr
    }

    /// Number of live allocations.
    pub fn allocation_count(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// Bytes currently reserved, including rounding.
    pub fn allocated_bytes(&self) -> usize {
        self.blocks.borrow().iter().map(|b| b.len() * UNIT).sum()
    }
}

impl std::fmt::Debug for ModuleAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleAllocator")
            .field("allocations", &self.allocation_count())
            .field("bytes", &self.allocated_bytes())
            .finish()
    }
}

unsafe extern "system" fn allocate_memory(
    this: *mut IModuleAllocator,
    cb_allocation: Dword,
) -> *mut c_void {
    let allocator = unsafe { &*this.cast::<ModuleAllocator>() };
    allocator.allocate(cb_allocation as usize)
}
