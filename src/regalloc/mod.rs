// This module implements the greedy weight-based register allocator that runs on each
// decoded function. It builds one liveness row per referenced value, turns the rows
// into a weight matrix, and then walks the instruction columns left to right with a
// small register pool. Values read or defined at a column need a register there: they
// keep the one they hold, take a free one, inherit the register of a value whose last
// read is this very column, or else evict the resident value with the highest weight
// (the one idle for longest). Values that cannot get a register live in the stack
// sentinel until their next use. Every eviction is recorded so the decision can be
// inspected; spill code itself is left to the emission stage.

//! Greedy register allocation over liveness rows.

pub mod liveness;
pub mod register_file;
pub mod weights;

pub use liveness::LiveRow;
pub use register_file::{RegId, RegisterFile};
pub use weights::{WeightMatrix, FIRST_USE, IN_USE, NOT_LIVE};

use crate::core::error::CompileResult;
use crate::core::session::CompilationSession;
use crate::ir::IrStatement;
use hashbrown::HashMap;
use std::fmt;

/// Raw encoding of a value that lives on the stack.
pub const STACK: i32 = -1;

/// Location of a value at one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Reg(RegId),
    Stack,
}

impl Slot {
    pub fn as_raw(self) -> i32 {
        match self {
            Slot::Reg(reg) => reg as i32,
            Slot::Stack => STACK,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Reg(reg) => write!(f, "r{reg}"),
            Slot::Stack => write!(f, "stack"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub column: usize,
    pub victim_row: usize,
    pub register: RegId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub rows: Vec<LiveRow>,
    pub weights: WeightMatrix,
    /// Location of each row at each column, `None` where the row is not live.
    pub slots: Vec<Vec<Option<Slot>>>,
    pub evictions: Vec<Eviction>,
    pub registers_used: usize,
}

impl Allocation {
    fn empty(columns: usize) -> Self {
        Self {
            rows: Vec::new(),
            weights: WeightMatrix::build(&[], columns),
            slots: Vec::new(),
            evictions: Vec::new(),
            registers_used: 0,
        }
    }

    pub fn slot(&self, row: usize, column: usize) -> Option<Slot> {
        self.slots.get(row)?.get(column).copied().flatten()
    }

    /// Row of the value defined at `column`.
    pub fn row_defined_at(&self, column: usize) -> Option<usize> {
        self.rows.iter().position(|row| row.def == column)
    }

    /// Raw location of every referenced value at its definition: register id
    /// or `STACK`, keyed by defining column.
    pub fn column_map(&self) -> HashMap<usize, i32> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(idx, row)| Some((row.def, self.slot(idx, row.def)?.as_raw())))
            .collect()
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, row) in self.rows.iter().enumerate() {
            write!(f, "  {:>4}:", row.value)?;
            for column in 0..self.weights.columns() {
                match self.slot(idx, column) {
                    Some(slot) => write!(f, " {slot:>5}")?,
                    None => write!(f, " {:>5}", ".")?,
                }
            }
            writeln!(f)?;
        }
        for eviction in &self.evictions {
            writeln!(
                f,
                "  evicted row {} from r{} at column {}",
                eviction.victim_row, eviction.register, eviction.column
            )?;
        }
        Ok(())
    }
}

/// Assign registers from a pool of `pool` to every value of `stmts`.
pub fn allocate(
    session: &CompilationSession<'_>,
    stmts: &[IrStatement],
    pool: usize,
) -> CompileResult<Allocation> {
    let mut file = RegisterFile::new(pool)?;
    let rows = liveness::build_rows(stmts)?;
    if rows.is_empty() {
        log::debug!("no referenced values, nothing to allocate");
        return Ok(Allocation::empty(stmts.len()));
    }

    let columns = stmts.len();
    let weights = WeightMatrix::build(&rows, columns);
    let mut allocator = Greedy {
        rows: &rows,
        weights: &weights,
        file: &mut file,
        current: vec![None; rows.len()],
        handed_over: Vec::new(),
        evictions: Vec::new(),
        grants: 0,
    };
    let mut slots = vec![vec![None; columns]; rows.len()];
    for column in 0..columns {
        allocator.step(column)?;
        for (idx, row) in rows.iter().enumerate() {
            if row.is_live_at(column) {
                slots[idx][column] = Some(allocator.location(idx).map_or(Slot::Stack, Slot::Reg));
            }
        }
        allocator.release_dying(column)?;
    }

    let Greedy { evictions, grants, .. } = allocator;
    session.record_registers_assigned(grants);
    session.record_evictions(evictions.len());
    log::debug!(
        "allocated {} rows over {columns} columns: {} evictions, {} registers",
        rows.len(),
        evictions.len(),
        file.touched_count()
    );

    Ok(Allocation {
        registers_used: file.touched_count() as usize,
        rows,
        weights,
        slots,
        evictions,
    })
}

struct Greedy<'r> {
    rows: &'r [LiveRow],
    weights: &'r WeightMatrix,
    file: &'r mut RegisterFile,
    /// Register each row holds right now.
    current: Vec<Option<RegId>>,
    /// Rows that gave their register away at the current column.
    handed_over: Vec<(usize, RegId)>,
    evictions: Vec<Eviction>,
    grants: usize,
}

impl Greedy<'_> {
    /// Give a register to every row that is used or defined at `column`.
    fn step(&mut self, column: usize) -> CompileResult<()> {
        self.handed_over.clear();
        let weight = |row: usize| self.weights.get(row, column);
        let mut wanting: Vec<usize> = (0..self.rows.len()).filter(|&r| weight(r) == IN_USE).collect();
        wanting.extend((0..self.rows.len()).filter(|&r| weight(r) == FIRST_USE));

        for row in wanting {
            if self.current[row].is_some() {
                continue;
            }
            if let Some(reg) = self.file.allocate(row) {
                self.grant(row, reg);
                continue;
            }
            if self.weights.get(row, column) == FIRST_USE {
                if let Some(reg) = self.inherit(row, column)? {
                    self.grant(row, reg);
                    continue;
                }
            }
            match self.victim(column) {
                Some((reg, victim)) => {
                    self.file.transfer(reg, row)?;
                    self.current[victim] = None;
                    self.evictions.push(Eviction {
                        column,
                        victim_row: victim,
                        register: reg,
                    });
                    log::debug!(
                        "column {column}: evicted {} from r{reg} for {}",
                        self.rows[victim].value,
                        self.rows[row].value
                    );
                    self.grant(row, reg);
                }
                None => {
                    log::trace!("column {column}: {} stays on the stack", self.rows[row].value);
                }
            }
        }
        Ok(())
    }

    /// Register `row` is read from or written to at the current column.
    fn location(&self, row: usize) -> Option<RegId> {
        self.current[row].or_else(|| {
            self.handed_over
                .iter()
                .find(|(owner, _)| *owner == row)
                .map(|(_, reg)| *reg)
        })
    }

    fn grant(&mut self, row: usize, reg: RegId) {
        self.current[row] = Some(reg);
        self.grants += 1;
    }

    /// Take over the register of a value read for the last time at `column`.
    fn inherit(&mut self, row: usize, column: usize) -> CompileResult<Option<RegId>> {
        let dying = self
            .file
            .residents()
            .find(|&(_, owner)| owner != row && self.rows[owner].last() == column);
        let Some((reg, owner)) = dying else {
            return Ok(None);
        };
        self.file.transfer(reg, row)?;
        self.current[owner] = None;
        self.handed_over.push((owner, reg));
        log::trace!(
            "column {column}: {} takes r{reg} from dying {}",
            self.rows[row].value,
            self.rows[owner].value
        );
        Ok(Some(reg))
    }

    /// Resident idle at `column` with the highest weight; ties go to the later row.
    fn victim(&self, column: usize) -> Option<(RegId, usize)> {
        self.file
            .residents()
            .filter(|&(_, owner)| self.weights.get(owner, column) > 0)
            .max_by_key(|&(_, owner)| (self.weights.get(owner, column), owner))
    }

    /// Free the registers of rows whose last use is `column`.
    fn release_dying(&mut self, column: usize) -> CompileResult<()> {
        for (row, live) in self.rows.iter().enumerate() {
            if live.last() != column {
                continue;
            }
            if let Some(reg) = self.current[row].take() {
                self.file.free(reg)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::with_session;
    use crate::ir::{IrArg, IrRef, Opcode};

    fn param(n: u32) -> IrStatement {
        IrStatement::new(IrRef(n), Opcode::LoadParam, vec![IrArg::Int(n as i32)])
    }

    fn add(n: u32, a: u32, b: u32) -> IrStatement {
        IrStatement::new(IrRef(n), Opcode::Add, vec![IrArg::Ref(IrRef(a)), IrArg::Ref(IrRef(b))])
    }

    #[test]
    fn test_no_referenced_values_short_circuits() {
        with_session(|session| {
            let stmts = vec![param(0), IrStatement::new(IrRef(1), Opcode::Retn, vec![])];
            let allocation = allocate(session, &stmts, 3).unwrap();
            assert!(allocation.rows.is_empty());
            assert!(allocation.evictions.is_empty());
            assert_eq!(allocation.registers_used, 0);
        });
    }

    #[test]
    fn test_short_lived_values_reuse_registers() {
        with_session(|session| {
            let stmts = vec![
                param(0),
                add(1, 0, 0),
                add(2, 1, 1),
                add(3, 2, 2),
                IrStatement::new(IrRef(4), Opcode::Ret, vec![IrArg::Ref(IrRef(3))]),
            ];
            let allocation = allocate(session, &stmts, 3).unwrap();
            assert!(allocation.evictions.is_empty());
            // Registers are released after a value's last read.
            assert_eq!(allocation.registers_used, 2);
            assert_eq!(allocation.slot(1, 1), Some(Slot::Reg(1)));
            assert_eq!(allocation.slot(2, 2), Some(Slot::Reg(0)));
            assert_eq!(allocation.slot(0, 2), None);
        });
    }

    #[test]
    fn test_pool_of_one_spills_to_stack() {
        with_session(|session| {
            let stmts = vec![
                param(0),
                param(1),
                add(2, 0, 1),
                IrStatement::new(IrRef(3), Opcode::Ret, vec![IrArg::Ref(IrRef(2))]),
            ];
            let allocation = allocate(session, &stmts, 1).unwrap();
            // Row 0 is evicted when row 1 is defined.
            assert_eq!(allocation.evictions.len(), 1);
            assert_eq!(allocation.evictions[0].victim_row, 0);
            assert_eq!(allocation.slot(0, 1), Some(Slot::Stack));
            assert_eq!(allocation.slot(1, 1), Some(Slot::Reg(0)));
            // The sum takes over the register of its dying operand.
            assert_eq!(allocation.slot(1, 2), Some(Slot::Reg(0)));
            assert_eq!(allocation.slot(2, 2), Some(Slot::Reg(0)));
            assert_eq!(Slot::Stack.as_raw(), STACK);
            assert_eq!(allocation.column_map().get(&1), Some(&0));
        });
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        with_session(|session| {
            assert!(allocate(session, &[param(0)], 0).is_err());
        });
    }
}
