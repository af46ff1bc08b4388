//! Register pool bookkeeping.
//!
//! The allocator works on one bank of interchangeable registers. A
//! `RegisterFile` knows which of them are taken and which liveness row owns
//! each one; choosing *which* value to give up a register is the allocator's
//! business, the file only executes the decision.

use crate::core::error::{CompileError, CompileResult};

/// Largest pool a `RegBitSet` can describe.
pub const MAX_REGISTERS: usize = 64;

/// Register index within the pool.
pub type RegId = u8;

/// Bit set over the register pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegBitSet(u64);

impl RegBitSet {
    pub fn new() -> Self {
        Self(0)
    }

    /// The first `count` registers.
    pub fn first(count: usize) -> Self {
        if count >= MAX_REGISTERS {
            Self(u64::MAX)
        } else {
            Self((1u64 << count) - 1)
        }
    }

    pub fn contains(self, reg: RegId) -> bool {
        (reg as usize) < MAX_REGISTERS && self.0 & (1u64 << reg) != 0
    }

    pub fn set(&mut self, reg: RegId) {
        if (reg as usize) < MAX_REGISTERS {
            self.0 |= 1u64 << reg;
        }
    }

    pub fn clear(&mut self, reg: RegId) {
        if (reg as usize) < MAX_REGISTERS {
            self.0 &= !(1u64 << reg);
        }
    }

    /// Lowest register in `self` that is not in `exclude`.
    pub fn first_excluding(self, exclude: RegBitSet) -> Option<RegId> {
        let available = self.0 & !exclude.0;
        (available != 0).then(|| available.trailing_zeros() as RegId)
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

/// Occupancy of the register pool for one function.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    pool: RegBitSet,
    used: RegBitSet,
    /// Liveness row owning each register.
    owners: Vec<Option<usize>>,
    /// Every register handed out at least once.
    touched: RegBitSet,
}

impl RegisterFile {
    pub fn new(size: usize) -> CompileResult<Self> {
        if size == 0 || size > MAX_REGISTERS {
            return Err(CompileError::RegisterAllocation {
                reason: format!("register pool of {size} is outside 1..={MAX_REGISTERS}"),
            });
        }
        Ok(Self {
            pool: RegBitSet::first(size),
            used: RegBitSet::new(),
            owners: vec![None; size],
            touched: RegBitSet::new(),
        })
    }

    /// Give the lowest free register to `row`.
    pub fn allocate(&mut self, row: usize) -> Option<RegId> {
        let reg = self.pool.first_excluding(self.used)?;
        self.assign(reg, row);
        Some(reg)
    }

    fn assign(&mut self, reg: RegId, row: usize) {
        self.used.set(reg);
        self.touched.set(reg);
        self.owners[reg as usize] = Some(row);
    }

    pub fn free(&mut self, reg: RegId) -> CompileResult<()> {
        if !self.used.contains(reg) {
            return Err(CompileError::RegisterAllocation {
                reason: format!("r{reg} freed while not allocated"),
            });
        }
        self.used.clear(reg);
        self.owners[reg as usize] = None;
        Ok(())
    }

    /// Hand an allocated register to a new owner. Returns the previous owner.
    pub fn transfer(&mut self, reg: RegId, row: usize) -> CompileResult<usize> {
        let previous = self.owner(reg).ok_or_else(|| CompileError::RegisterAllocation {
            reason: format!("r{reg} transferred while not allocated"),
        })?;
        self.assign(reg, row);
        Ok(previous)
    }

    pub fn owner(&self, reg: RegId) -> Option<usize> {
        self.owners.get(reg as usize).copied().flatten()
    }

    pub fn is_allocated(&self, reg: RegId) -> bool {
        self.used.contains(reg)
    }

    /// Allocated registers with their owners, lowest register first.
    pub fn residents(&self) -> impl Iterator<Item = (RegId, usize)> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter_map(|(reg, owner)| owner.map(|row| (reg as RegId, row)))
    }

    pub fn used_count(&self) -> u32 {
        self.used.count()
    }

    /// Number of distinct registers that were ever allocated.
    pub fn touched_count(&self) -> u32 {
        self.touched.count()
    }
}
