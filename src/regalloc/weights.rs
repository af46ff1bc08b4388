//! Eviction weights.
//!
//! Each cell holds how expensive it would be to give up the row's register at
//! that column. Marked columns pin the value (`FIRST_USE` at the first mark,
//! `IN_USE` at later ones); between marks the weight counts the columns since
//! the last mark, so the value idle for longest is the cheapest to evict.

use super::liveness::LiveRow;

pub const NOT_LIVE: i32 = 0;
pub const FIRST_USE: i32 = -1;
pub const IN_USE: i32 = -2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightMatrix {
    columns: usize,
    cells: Vec<i32>,
}

impl WeightMatrix {
    pub fn build(rows: &[LiveRow], columns: usize) -> Self {
        let mut cells = vec![NOT_LIVE; rows.len() * columns];
        for (idx, row) in rows.iter().enumerate() {
            let cells = &mut cells[idx * columns..(idx + 1) * columns];
            let mut previous: Option<usize> = None;
            for (column, cell) in cells.iter_mut().enumerate().take(row.last() + 1) {
                if row.is_marked(column) {
                    *cell = if previous.is_none() { FIRST_USE } else { IN_USE };
                    previous = Some(column);
                } else if let Some(prev) = previous {
                    *cell = (column - prev) as i32;
                }
            }
        }
        Self { columns, cells }
    }

    pub fn get(&self, row: usize, column: usize) -> i32 {
        if column >= self.columns {
            return NOT_LIVE;
        }
        self.cells.get(row * self.columns + column).copied().unwrap_or(NOT_LIVE)
    }

    pub fn row(&self, row: usize) -> &[i32] {
        let start = (row * self.columns).min(self.cells.len());
        let end = (start + self.columns).min(self.cells.len());
        &self.cells[start..end]
    }

    pub fn columns(&self) -> usize {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrArg, IrRef, IrStatement, Opcode};
    use crate::regalloc::liveness::build_rows;

    #[test]
    fn test_gap_weights_count_distance_since_last_mark() {
        let stmts = vec![
            IrStatement::new(IrRef(0), Opcode::LoadParam, vec![IrArg::Int(0)]),
            IrStatement::new(IrRef(1), Opcode::LoadParam, vec![IrArg::Int(1)]),
            IrStatement::new(IrRef(2), Opcode::LoadParam, vec![IrArg::Int(2)]),
            IrStatement::new(IrRef(3), Opcode::Add, vec![IrArg::Ref(IrRef(0)), IrArg::Ref(IrRef(2))]),
            IrStatement::new(IrRef(4), Opcode::Add, vec![IrArg::Ref(IrRef(3)), IrArg::Ref(IrRef(1))]),
            IrStatement::new(IrRef(5), Opcode::Ret, vec![IrArg::Ref(IrRef(4))]),
        ];
        let rows = build_rows(&stmts).unwrap();
        let weights = WeightMatrix::build(&rows, stmts.len());

        assert_eq!(weights.row(0), &[FIRST_USE, 1, 2, IN_USE, NOT_LIVE, NOT_LIVE]);
        assert_eq!(weights.row(1), &[NOT_LIVE, FIRST_USE, 1, 2, IN_USE, NOT_LIVE]);
        assert_eq!(weights.get(4, 5), IN_USE);
        assert_eq!(weights.get(0, 99), NOT_LIVE);
    }
}
