//! Liveness rows over a flat statement stream.
//!
//! A row belongs to a statement whose value is read somewhere else and marks
//! every column that touches the value: the definition and each reader. A phi
//! operand is read on its incoming edge, so it is marked at the last column of
//! the predecessor block rather than at the phi. A value that is live into a
//! loop header and read inside the loop is also marked at the loop's back
//! edge, since the next iteration reads it again.

use crate::core::error::{CompileError, CompileResult};
use crate::ir::{BlockId, IrArg, IrRef, IrStatement, Opcode};
use hashbrown::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRow {
    /// Statement defining the value.
    pub value: IrRef,
    /// Column of the defining statement.
    pub def: usize,
    /// Marked columns, ascending.
    marks: Vec<usize>,
}

impl LiveRow {
    pub fn marks(&self) -> &[usize] {
        &self.marks
    }

    pub fn is_marked(&self, column: usize) -> bool {
        self.marks.binary_search(&column).is_ok()
    }

    pub fn first(&self) -> usize {
        self.marks.first().copied().unwrap_or(self.def)
    }

    pub fn last(&self) -> usize {
        self.marks.last().copied().unwrap_or(self.def)
    }

    pub fn is_live_at(&self, column: usize) -> bool {
        (self.first()..=self.last()).contains(&column)
    }

    fn mark(&mut self, column: usize) {
        if let Err(pos) = self.marks.binary_search(&column) {
            self.marks.insert(pos, column);
        }
    }
}

/// Build one row per referenced value, in definition order.
pub fn build_rows(stmts: &[IrStatement]) -> CompileResult<Vec<LiveRow>> {
    let columns: HashMap<IrRef, usize> = stmts
        .iter()
        .enumerate()
        .map(|(column, stmt)| (stmt.number, column))
        .collect();

    let labels = label_columns(stmts);
    let mut readers: Vec<Vec<usize>> = vec![Vec::new(); stmts.len()];
    for (column, stmt) in stmts.iter().enumerate() {
        for (used, at) in reads(stmt, column, &labels, stmts.len()) {
            let def = *columns.get(&used).ok_or_else(|| CompileError::MalformedSsa {
                reason: format!("{} reads {used}, which is not in the stream", stmt.number),
            })?;
            if at > def {
                readers[def].push(at);
            }
        }
    }

    let mut rows: Vec<LiveRow> = readers
        .into_iter()
        .enumerate()
        .filter(|(_, readers)| !readers.is_empty())
        .map(|(def, mut marks)| {
            marks.push(def);
            marks.sort_unstable();
            marks.dedup();
            LiveRow {
                value: stmts[def].number,
                def,
                marks,
            }
        })
        .collect();

    extend_over_loops(stmts, &mut rows);
    log::trace!("{} liveness rows over {} columns", rows.len(), stmts.len());
    Ok(rows)
}

fn label_columns(stmts: &[IrStatement]) -> HashMap<BlockId, usize> {
    stmts
        .iter()
        .enumerate()
        .filter(|(_, stmt)| stmt.opcode == Opcode::Label)
        .filter_map(|(column, stmt)| match stmt.args.first() {
            Some(IrArg::Block(block)) => Some((*block, column)),
            _ => None,
        })
        .collect()
}

/// Last column of `block`: the statement before the next label.
fn block_end(labels: &HashMap<BlockId, usize>, block: BlockId, len: usize) -> Option<usize> {
    let start = *labels.get(&block)?;
    let next = labels.values().copied().filter(|&c| c > start).min().unwrap_or(len);
    Some(next - 1)
}

/// Values read by `stmt` and the column each read happens at.
fn reads(
    stmt: &IrStatement,
    column: usize,
    labels: &HashMap<BlockId, usize>,
    len: usize,
) -> Vec<(IrRef, usize)> {
    if stmt.opcode != Opcode::Phi {
        return stmt.uses().map(|used| (used, column)).collect();
    }
    let mut edge = None;
    let mut out = Vec::new();
    for arg in &stmt.args {
        match arg {
            IrArg::Block(pred) => edge = block_end(labels, *pred, len),
            IrArg::Ref(used) => out.push((*used, edge.take().unwrap_or(column))),
            _ => {}
        }
    }
    out
}

/// Mark values that flow around a loop at the loop's back edge.
fn extend_over_loops(stmts: &[IrStatement], rows: &mut [LiveRow]) {
    let labels = label_columns(stmts);

    let back_edges: Vec<(usize, usize)> = stmts
        .iter()
        .enumerate()
        .filter(|(_, stmt)| stmt.opcode.is_jump())
        .filter_map(|(column, stmt)| {
            let target = stmt.args.iter().find_map(|arg| match arg {
                IrArg::Block(block) => labels.get(block).copied(),
                _ => None,
            })?;
            (target < column).then_some((target, column))
        })
        .collect();

    // Nested loops can extend a row into an enclosing loop's range.
    let mut changed = true;
    while changed {
        changed = false;
        for &(header, latch) in &back_edges {
            for row in rows.iter_mut() {
                let enters = row.first() < header;
                let read_inside = row.marks.iter().any(|&m| (header..=latch).contains(&m));
                if enters && read_inside && row.last() < latch {
                    row.mark(latch);
                    changed = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BlockId;

    fn stmt(number: u32, opcode: Opcode, args: Vec<IrArg>) -> IrStatement {
        IrStatement::new(IrRef(number), opcode, args)
    }

    #[test]
    fn test_rows_mark_definition_and_readers() {
        let stmts = vec![
            stmt(0, Opcode::LoadParam, vec![IrArg::Int(0)]),
            stmt(1, Opcode::LoadParam, vec![IrArg::Int(1)]),
            stmt(2, Opcode::Add, vec![IrArg::Ref(IrRef(0)), IrArg::Ref(IrRef(1))]),
            stmt(3, Opcode::Add, vec![IrArg::Ref(IrRef(2)), IrArg::Ref(IrRef(0))]),
            stmt(4, Opcode::Ret, vec![IrArg::Ref(IrRef(3))]),
        ];
        let rows = build_rows(&stmts).unwrap();
        let marks: Vec<&[usize]> = rows.iter().map(|r| r.marks()).collect();
        assert_eq!(marks, vec![&[0, 2, 3][..], &[1, 2], &[2, 3], &[3, 4]]);
    }

    #[test]
    fn test_dead_values_have_no_row() {
        let stmts = vec![
            stmt(0, Opcode::LoadParam, vec![IrArg::Int(0)]),
            stmt(1, Opcode::Retn, vec![]),
        ];
        assert!(build_rows(&stmts).unwrap().is_empty());
    }

    #[test]
    fn test_value_read_in_loop_lives_to_back_edge() {
        let stmts = vec![
            stmt(0, Opcode::LoadParam, vec![IrArg::Int(0)]),
            stmt(1, Opcode::Label, vec![IrArg::Block(BlockId(1))]),
            stmt(2, Opcode::Load, vec![IrArg::Ref(IrRef(0))]),
            stmt(3, Opcode::Jmp, vec![IrArg::Block(BlockId(1))]),
        ];
        let rows = build_rows(&stmts).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].marks(), &[0, 2, 3]);
        assert_eq!(rows[0].last(), 3);
    }

    #[test]
    fn test_phi_operands_are_read_at_the_end_of_their_predecessor() {
        let (entry, header) = (BlockId(0), BlockId(1));
        let stmts = vec![
            stmt(0, Opcode::Label, vec![IrArg::Block(entry)]),
            stmt(1, Opcode::LoadParam, vec![IrArg::Int(0)]),
            stmt(2, Opcode::Jmp, vec![IrArg::Block(header)]),
            stmt(3, Opcode::Label, vec![IrArg::Block(header)]),
            stmt(
                4,
                Opcode::Phi,
                vec![
                    IrArg::Block(entry),
                    IrArg::Ref(IrRef(1)),
                    IrArg::Block(header),
                    IrArg::Ref(IrRef(6)),
                ],
            ),
            stmt(5, Opcode::Add, vec![IrArg::Ref(IrRef(4)), IrArg::Ref(IrRef(4))]),
            stmt(6, Opcode::Add, vec![IrArg::Ref(IrRef(5)), IrArg::Ref(IrRef(5))]),
            stmt(7, Opcode::Jmp, vec![IrArg::Block(header)]),
        ];
        let rows = build_rows(&stmts).unwrap();
        let marks: Vec<&[usize]> = rows.iter().map(|r| r.marks()).collect();
        // The entry value dies on the entry edge; the back-edge value lives
        // from its definition to the jump.
        assert_eq!(marks, vec![&[1, 2][..], &[4, 5], &[5, 6], &[6, 7]]);
        assert!(rows.iter().all(|r| r.first() == r.def));
    }

    #[test]
    fn test_dangling_reference_is_an_error() {
        let stmts = vec![stmt(0, Opcode::Ret, vec![IrArg::Ref(IrRef(7))])];
        assert!(matches!(build_rows(&stmts), Err(CompileError::MalformedSsa { .. })));
    }
}
