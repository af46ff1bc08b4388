// This module lowers a finished SSA function back into one flat statement stream, the
// form the register allocator consumes. Blocks are laid out in creation order, each
// opened by a LABEL; surviving phis sit at the head of their block with each operand
// spelled as its predecessor block followed by a plain reference, so later stages
// know which edge carries the value. REROUTE tombstones are dropped and every
// reference is resolved through them, then renumbered so an instruction's number is
// its column in the stream.

//! SSA decoding into a flat statement stream.

use super::{IrArg, IrFunction, IrRef, IrStatement, Opcode};
use crate::core::error::{CompileError, CompileResult};
use crate::state::State;
use hashbrown::HashMap;
use std::fmt;

/// One function as a single assignment stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFunction {
    pub name: State,
    pub stmts: Vec<IrStatement>,
}

enum Slot {
    Label(super::BlockId),
    Stmt(IrRef),
}

impl IrFunction {
    pub fn decode(&self) -> CompileResult<DecodedFunction> {
        let mut layout = Vec::new();
        for block in self.blocks() {
            layout.push(Slot::Label(block.id));
            for &r in block.phis.iter().chain(block.stmts.iter()) {
                if self.statement(r)?.opcode != Opcode::Reroute {
                    layout.push(Slot::Stmt(r));
                }
            }
        }

        let renumbered: HashMap<IrRef, IrRef> = layout
            .iter()
            .enumerate()
            .filter_map(|(column, slot)| match slot {
                Slot::Stmt(r) => Some((*r, IrRef(column as u32))),
                Slot::Label(_) => None,
            })
            .collect();
        let remap = |r: IrRef| -> CompileResult<IrRef> {
            let live = self.resolve(r)?;
            renumbered.get(&live).copied().ok_or_else(|| CompileError::MalformedSsa {
                reason: format!("{r} in `{}` resolves to an unplaced value", self.name),
            })
        };

        let mut stmts = Vec::with_capacity(layout.len());
        for (column, slot) in layout.iter().enumerate() {
            let number = IrRef(column as u32);
            match *slot {
                Slot::Label(block) => {
                    stmts.push(IrStatement::new(number, Opcode::Label, vec![IrArg::Block(block)]));
                }
                Slot::Stmt(r) => {
                    let stmt = self.statement(r)?;
                    let mut args = Vec::with_capacity(stmt.args.len());
                    for arg in &stmt.args {
                        match arg {
                            IrArg::Ref(r) => args.push(IrArg::Ref(remap(*r)?)),
                            IrArg::Phi(phi) => {
                                let preds = &self.block(phi.block)?.preds;
                                if preds.len() != phi.operands.len() {
                                    return Err(CompileError::MalformedSsa {
                                        reason: format!(
                                            "{r} has {} operands for {} predecessors",
                                            phi.operands.len(),
                                            preds.len()
                                        ),
                                    });
                                }
                                for (pred, op) in preds.iter().zip(&phi.operands) {
                                    args.push(IrArg::Block(*pred));
                                    args.push(IrArg::Ref(remap(*op)?));
                                }
                            }
                            other => args.push(other.clone()),
                        }
                    }
                    stmts.push(IrStatement::new(number, stmt.opcode, args));
                }
            }
        }

        log::trace!("decoded `{}` into {} statements", self.name, stmts.len());
        Ok(DecodedFunction {
            name: self.name.clone(),
            stmts,
        })
    }
}

impl fmt::Display for DecodedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for stmt in &self.stmts {
            writeln!(f, "  {stmt}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::with_session;
    use crate::ir::SsaBuilder;
    use crate::state::{AddressFrame, AddressKind};

    #[test]
    fn test_tombstones_are_dropped_and_refs_renumbered() {
        with_session(|session| {
            let name = State::from_names(["f"], AddressKind::Function);
            let var = name.with(AddressFrame::new("i", AddressKind::VariableStatement));
            let mut func = IrFunction::new(name.clone());
            let mut ssa = SsaBuilder::new();

            let entry = func.add_block(name.with(AddressFrame::new("$b0", AddressKind::Block)));
            ssa.seal_block(session, &mut func, entry).unwrap();
            let init = func.push(entry, Opcode::LoadParam, vec![IrArg::Int(0)]).unwrap();
            ssa.write_variable(&var, entry, init);

            let header = func.add_block(name.with(AddressFrame::new("$b1", AddressKind::Block)));
            func.push(entry, Opcode::Jmp, vec![IrArg::Block(header)]).unwrap();
            func.add_edge(entry, header).unwrap();
            let read = ssa.read_variable(session, &mut func, &var, header).unwrap();
            let ret = func.push(header, Opcode::Ret, vec![IrArg::Ref(read)]).unwrap();
            func.push(header, Opcode::Jmp, vec![IrArg::Block(header)]).unwrap();
            func.add_edge(header, header).unwrap();
            ssa.seal_block(session, &mut func, header).unwrap();

            // The loop never redefines `i`, so its header phi became a tombstone.
            assert_eq!(func.statement(read).unwrap().opcode, Opcode::Reroute);
            assert_eq!(func.statement(ret).unwrap().args[0], IrArg::Ref(init));

            let decoded = func.decode().unwrap();
            let opcodes: Vec<Opcode> = decoded.stmts.iter().map(|s| s.opcode).collect();
            assert_eq!(
                opcodes,
                vec![Opcode::Label, Opcode::LoadParam, Opcode::Jmp, Opcode::Label, Opcode::Ret, Opcode::Jmp]
            );
            assert_eq!(decoded.stmts[4].args[0], IrArg::Ref(IrRef(1)));
            for (column, stmt) in decoded.stmts.iter().enumerate() {
                assert_eq!(stmt.number.index(), column);
            }
        });
    }

    #[test]
    fn test_live_phi_operands_follow_their_predecessor() {
        with_session(|session| {
            let name = State::from_names(["g"], AddressKind::Function);
            let var = name.with(AddressFrame::new("x", AddressKind::VariableStatement));
            let mut func = IrFunction::new(name.clone());
            let mut ssa = SsaBuilder::new();

            let blocks: Vec<_> = (0..4)
                .map(|i| func.add_block(name.with(AddressFrame::new(format!("$b{i}"), AddressKind::Block))))
                .collect();
            let (entry, left, right, merge) = (blocks[0], blocks[1], blocks[2], blocks[3]);
            ssa.seal_block(session, &mut func, entry).unwrap();
            func.add_edge(entry, left).unwrap();
            func.add_edge(entry, right).unwrap();
            ssa.seal_block(session, &mut func, left).unwrap();
            ssa.seal_block(session, &mut func, right).unwrap();
            let l = func.push(left, Opcode::LoadParam, vec![IrArg::Int(0)]).unwrap();
            ssa.write_variable(&var, left, l);
            let r = func.push(right, Opcode::LoadParam, vec![IrArg::Int(1)]).unwrap();
            ssa.write_variable(&var, right, r);
            func.add_edge(left, merge).unwrap();
            func.add_edge(right, merge).unwrap();
            ssa.seal_block(session, &mut func, merge).unwrap();
            let phi = ssa.read_variable(session, &mut func, &var, merge).unwrap();
            func.push(merge, Opcode::Ret, vec![IrArg::Ref(phi)]).unwrap();

            let decoded = func.decode().unwrap();
            let phi_stmt = decoded.stmts.iter().find(|s| s.opcode == Opcode::Phi).unwrap();
            assert_eq!(
                phi_stmt.args,
                vec![
                    IrArg::Block(left),
                    IrArg::Ref(IrRef(2)),
                    IrArg::Block(right),
                    IrArg::Ref(IrRef(4)),
                ]
            );
            let ret = decoded.stmts.last().unwrap();
            assert_eq!(ret.args, vec![IrArg::Ref(phi_stmt.number)]);
        });
    }
}
