// This module implements on-the-fly SSA construction after Braun et al., "Simple and
// Efficient Construction of Static Single Assignment Form". Every source variable is
// tracked per basic block as the IrRef of its current definition. Reading a variable
// that has no local definition walks to the predecessors: through a single predecessor
// directly, through several by placing a phi, and in a block whose predecessor set is
// not final yet (unsealed) by placing an operand-less phi that is completed when the
// block is sealed. As soon as a phi has its full operand set it is checked for
// triviality; a trivial phi is replaced by its only distinct operand, all of its users
// are rewritten in place, and phis among those users are checked again.

//! SSA variable versioning, phi placement and trivial-phi removal.

use super::{BlockId, IrArg, IrFunction, IrRef, Opcode};
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::state::State;
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct SsaBuilder {
    /// Current definition of each variable per block.
    current_def: HashMap<State, HashMap<BlockId, IrRef>>,
    sealed: HashSet<BlockId>,
    /// Operand-less phis placed in unsealed blocks, completed on sealing.
    incomplete_phis: HashMap<BlockId, Vec<(State, IrRef)>>,
    /// Phis whose operands are being collected right now.
    filling: HashSet<IrRef>,
}

impl SsaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sealed(&self, block: BlockId) -> bool {
        self.sealed.contains(&block)
    }

    pub fn write_variable(&mut self, var: &State, block: BlockId, value: IrRef) {
        match self.current_def.get_mut(var) {
            Some(defs) => {
                defs.insert(block, value);
            }
            None => {
                self.current_def
                    .insert(var.clone(), HashMap::from_iter([(block, value)]));
            }
        }
    }

    pub fn read_variable(
        &mut self,
        session: &CompilationSession<'_>,
        func: &mut IrFunction,
        var: &State,
        block: BlockId,
    ) -> CompileResult<IrRef> {
        if let Some(value) = self.current_def.get(var).and_then(|defs| defs.get(&block)) {
            return func.resolve(*value);
        }
        self.read_variable_recursive(session, func, var, block)
    }

    fn read_variable_recursive(
        &mut self,
        session: &CompilationSession<'_>,
        func: &mut IrFunction,
        var: &State,
        block: BlockId,
    ) -> CompileResult<IrRef> {
        let value = if !self.is_sealed(block) {
            let phi = self.new_phi(session, func, block)?;
            self.incomplete_phis
                .entry(block)
                .or_default()
                .push((var.clone(), phi));
            phi
        } else {
            let preds = func.block(block)?.preds.clone();
            if let &[pred] = preds.as_slice() {
                self.read_variable(session, func, var, pred)?
            } else {
                let phi = self.new_phi(session, func, block)?;
                self.write_variable(var, block, phi);
                self.add_phi_operands(session, func, var, phi)?
            }
        };
        self.write_variable(var, block, value);
        Ok(value)
    }

    fn new_phi(
        &mut self,
        session: &CompilationSession<'_>,
        func: &mut IrFunction,
        block: BlockId,
    ) -> CompileResult<IrRef> {
        let phi = func.push_phi(block)?;
        session.record_phi_created();
        log::trace!("{}: phi {phi} placed in {block}", func.name);
        Ok(phi)
    }

    /// Read the variable from every predecessor, then try to drop the phi.
    fn add_phi_operands(
        &mut self,
        session: &CompilationSession<'_>,
        func: &mut IrFunction,
        var: &State,
        phi: IrRef,
    ) -> CompileResult<IrRef> {
        let block = phi_block(func, phi)?;
        let preds = func.block(block)?.preds.clone();
        self.filling.insert(phi);
        for pred in preds {
            let operand = self.read_variable(session, func, var, pred)?;
            let operand = func.resolve(operand)?;
            let phi_stmt = func.statement_mut(phi)?;
            phi_stmt
                .phi_mut()
                .ok_or_else(|| not_a_phi(phi))?
                .operands
                .push(operand);
            if let Some(used) = func.statement_mut(operand)?.phi_mut() {
                used.users.insert(phi);
            }
        }
        self.filling.remove(&phi);
        self.try_remove_trivial_phi(session, func, phi)
    }

    /// Replace `phi` by its only distinct operand when it has one. Returns the
    /// value readers should use from now on.
    pub fn try_remove_trivial_phi(
        &mut self,
        session: &CompilationSession<'_>,
        func: &mut IrFunction,
        phi: IrRef,
    ) -> CompileResult<IrRef> {
        let phi = func.resolve(phi)?;
        let Some(data) = func.statement(phi)?.phi() else {
            return Ok(phi);
        };

        let mut same = None;
        for op in &data.operands {
            let op = func.resolve(*op)?;
            if Some(op) == same || op == phi {
                continue;
            }
            if same.is_some() {
                return Ok(phi);
            }
            same = Some(op);
        }
        let Some(same) = same else {
            // No operand besides itself: the variable is undefined on every path.
            log::trace!("{}: phi {phi} has no operands, kept as undefined", func.name);
            return Ok(phi);
        };

        let block = data.block;
        let users: Vec<IrRef> = data.users.iter().copied().filter(|u| *u != phi).collect();
        self.replace_phi(func, phi, same, block, &users)?;
        session.record_phi_removed();
        log::trace!("{}: trivial phi {phi} rerouted to {same}", func.name);

        for user in users {
            if self.filling.contains(&user) {
                continue;
            }
            if func.statement(user)?.opcode == Opcode::Phi {
                self.try_remove_trivial_phi(session, func, user)?;
            }
        }
        Ok(same)
    }

    fn replace_phi(
        &mut self,
        func: &mut IrFunction,
        phi: IrRef,
        same: IrRef,
        block: BlockId,
        users: &[IrRef],
    ) -> CompileResult<()> {
        for user in users {
            for arg in &mut func.statement_mut(*user)?.args {
                match arg {
                    IrArg::Ref(r) if *r == phi => *r = same,
                    IrArg::Phi(p) => {
                        for op in p.operands.iter_mut().filter(|op| **op == phi) {
                            *op = same;
                        }
                    }
                    _ => {}
                }
            }
        }
        if let Some(target) = func.statement_mut(same)?.phi_mut() {
            target.users.remove(&phi);
            target.users.extend(users.iter().copied());
        }

        let stmt = func.statement_mut(phi)?;
        stmt.opcode = Opcode::Reroute;
        stmt.args = vec![IrArg::Ref(same)];
        func.block_mut(block)?.phis.retain(|r| *r != phi);

        for defs in self.current_def.values_mut() {
            for value in defs.values_mut().filter(|v| **v == phi) {
                *value = same;
            }
        }
        Ok(())
    }

    /// Declare the predecessor set of `block` final and complete its pending phis.
    pub fn seal_block(
        &mut self,
        session: &CompilationSession<'_>,
        func: &mut IrFunction,
        block: BlockId,
    ) -> CompileResult<()> {
        if self.is_sealed(block) {
            return Err(CompileError::MalformedSsa {
                reason: format!("{block} of `{}` sealed twice", func.name),
            });
        }
        let pending = self.incomplete_phis.remove(&block).unwrap_or_default();
        for (var, phi) in pending {
            self.add_phi_operands(session, func, &var, phi)?;
        }
        self.sealed.insert(block);
        func.record_seal(block);
        session.record_block_sealed();
        log::trace!("{}: sealed {block}", func.name);
        Ok(())
    }

    /// Blocks that were created but never sealed.
    pub fn unsealed<'f>(&'f self, func: &'f IrFunction) -> impl Iterator<Item = BlockId> + 'f {
        func.blocks()
            .iter()
            .map(|b| b.id)
            .filter(move |id| !self.sealed.contains(id))
    }
}

fn phi_block(func: &IrFunction, phi: IrRef) -> CompileResult<BlockId> {
    func.statement(phi)?
        .phi()
        .map(|p| p.block)
        .ok_or_else(|| not_a_phi(phi))
}

fn not_a_phi(r: IrRef) -> CompileError {
    CompileError::MalformedSsa {
        reason: format!("{r} is not a phi"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::with_session;
    use crate::state::{AddressFrame, AddressKind};

    fn var(name: &str) -> State {
        State::from_names(["f", name], AddressKind::VariableStatement)
    }

    fn block_label(func: &IrFunction, idx: usize) -> State {
        func.name.with(AddressFrame::new(format!("$b{idx}"), AddressKind::Block))
    }

    fn new_block(func: &mut IrFunction) -> BlockId {
        let label = block_label(func, func.blocks().len());
        func.add_block(label)
    }

    fn def(func: &mut IrFunction, block: BlockId, value: i32) -> IrRef {
        func.push(block, Opcode::Def, vec![IrArg::Int(value)]).unwrap()
    }

    /// entry -> (left | right) -> merge
    fn diamond(func: &mut IrFunction) -> [BlockId; 4] {
        let blocks = [new_block(func), new_block(func), new_block(func), new_block(func)];
        let [entry, left, right, merge] = blocks;
        func.add_edge(entry, left).unwrap();
        func.add_edge(entry, right).unwrap();
        func.add_edge(left, merge).unwrap();
        func.add_edge(right, merge).unwrap();
        blocks
    }

    #[test]
    fn test_diverging_definitions_need_one_phi() {
        with_session(|session| {
            let mut func = IrFunction::new(State::from_names(["f"], AddressKind::Function));
            let mut ssa = SsaBuilder::new();
            let [entry, left, right, merge] = diamond(&mut func);
            for b in [entry, left, right, merge] {
                ssa.seal_block(session, &mut func, b).unwrap();
            }

            let x = var("x");
            let l = def(&mut func, left, 1);
            ssa.write_variable(&x, left, l);
            let r = def(&mut func, right, 2);
            ssa.write_variable(&x, right, r);

            let read = ssa.read_variable(session, &mut func, &x, merge).unwrap();
            let phis: Vec<_> = func.live_phis().collect();
            assert_eq!(phis.len(), 1);
            assert_eq!(phis[0].number, read);
            assert_eq!(phis[0].phi().unwrap().operands, vec![l, r]);
        });
    }

    #[test]
    fn test_common_definition_leaves_no_phi() {
        with_session(|session| {
            let mut func = IrFunction::new(State::from_names(["f"], AddressKind::Function));
            let mut ssa = SsaBuilder::new();
            let [entry, left, right, merge] = diamond(&mut func);
            for b in [entry, left, right, merge] {
                ssa.seal_block(session, &mut func, b).unwrap();
            }

            let x = var("x");
            let d = def(&mut func, entry, 7);
            ssa.write_variable(&x, entry, d);

            assert_eq!(ssa.read_variable(session, &mut func, &x, merge).unwrap(), d);
            assert_eq!(func.live_phis().count(), 0);
            let stats = session.stats();
            assert_eq!(stats.phis_created, 1);
            assert_eq!(stats.trivial_phis_removed, 1);
        });
    }

    #[test]
    fn test_loop_header_phi_completed_on_seal() {
        with_session(|session| {
            let mut func = IrFunction::new(State::from_names(["f"], AddressKind::Function));
            let mut ssa = SsaBuilder::new();
            let entry = new_block(&mut func);
            let header = new_block(&mut func);
            let body = new_block(&mut func);
            ssa.seal_block(session, &mut func, entry).unwrap();

            let x = var("x");
            let init = def(&mut func, entry, 0);
            ssa.write_variable(&x, entry, init);
            func.add_edge(entry, header).unwrap();

            let in_header = ssa.read_variable(session, &mut func, &x, header).unwrap();
            func.add_edge(header, body).unwrap();
            ssa.seal_block(session, &mut func, body).unwrap();

            let cur = ssa.read_variable(session, &mut func, &x, body).unwrap();
            assert_eq!(cur, in_header);
            let next = func
                .push(body, Opcode::Add, vec![IrArg::Ref(cur), IrArg::Int(1)])
                .unwrap();
            ssa.write_variable(&x, body, next);
            func.add_edge(body, header).unwrap();
            ssa.seal_block(session, &mut func, header).unwrap();

            let phi = func.statement(in_header).unwrap().phi().unwrap();
            assert_eq!(phi.operands, vec![init, next]);
            assert!(phi.users.contains(&next));
        });
    }

    #[test]
    fn test_unmodified_loop_variable_phi_is_removed() {
        with_session(|session| {
            let mut func = IrFunction::new(State::from_names(["f"], AddressKind::Function));
            let mut ssa = SsaBuilder::new();
            let entry = new_block(&mut func);
            let header = new_block(&mut func);
            let body = new_block(&mut func);
            ssa.seal_block(session, &mut func, entry).unwrap();

            let x = var("x");
            let init = def(&mut func, entry, 0);
            ssa.write_variable(&x, entry, init);
            func.add_edge(entry, header).unwrap();

            let in_header = ssa.read_variable(session, &mut func, &x, header).unwrap();
            let user = func
                .push(header, Opcode::Lt, vec![IrArg::Ref(in_header), IrArg::Int(10)])
                .unwrap();
            func.add_edge(header, body).unwrap();
            ssa.seal_block(session, &mut func, body).unwrap();
            func.add_edge(body, header).unwrap();
            ssa.seal_block(session, &mut func, header).unwrap();

            assert_eq!(func.live_phis().count(), 0);
            assert_eq!(func.statement(in_header).unwrap().opcode, Opcode::Reroute);
            assert_eq!(func.statement(user).unwrap().args[0], IrArg::Ref(init));
            assert_eq!(ssa.read_variable(session, &mut func, &x, body).unwrap(), init);
        });
    }

    #[test]
    fn test_sealing_twice_is_an_error() {
        with_session(|session| {
            let mut func = IrFunction::new(State::from_names(["f"], AddressKind::Function));
            let mut ssa = SsaBuilder::new();
            let entry = new_block(&mut func);
            ssa.seal_block(session, &mut func, entry).unwrap();
            assert!(matches!(
                ssa.seal_block(session, &mut func, entry),
                Err(CompileError::MalformedSsa { .. })
            ));
        });
    }
}
