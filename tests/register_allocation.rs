//! Register allocation under pressure: a pool of three with four values live
//! at once.

use bumpalo::Bump;
use ssac::ast::{BinaryOp, TreeBuilder};
use ssac::core::CompilationSession;
use ssac::ir::{IrArg, IrRef, IrStatement, Opcode};
use ssac::pipeline::Compiler;
use ssac::regalloc::{allocate, Slot, IN_USE};
use ssac::{AddressKind, State};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn stmt(number: u32, opcode: Opcode, args: Vec<IrArg>) -> IrStatement {
    IrStatement::new(IrRef(number), opcode, args)
}

fn value(n: u32) -> IrArg {
    IrArg::Ref(IrRef(n))
}

/// a, b, c, d = params; e = c + d; f = a + b; g = e + f; return g
fn four_live_values() -> Vec<IrStatement> {
    vec![
        stmt(0, Opcode::LoadParam, vec![IrArg::Int(0)]),
        stmt(1, Opcode::LoadParam, vec![IrArg::Int(1)]),
        stmt(2, Opcode::LoadParam, vec![IrArg::Int(2)]),
        stmt(3, Opcode::LoadParam, vec![IrArg::Int(3)]),
        stmt(4, Opcode::Add, vec![value(2), value(3)]),
        stmt(5, Opcode::Add, vec![value(0), value(1)]),
        stmt(6, Opcode::Add, vec![value(4), value(5)]),
        stmt(7, Opcode::Ret, vec![value(6)]),
    ]
}

#[test]
fn test_four_live_values_cause_exactly_one_eviction() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);

    let allocation = allocate(&session, &four_live_values(), 3).unwrap();

    assert_eq!(allocation.rows.len(), 7);
    assert_eq!(allocation.evictions.len(), 1);
    let eviction = allocation.evictions[0];
    assert_eq!(eviction.column, 3);
    assert_eq!(eviction.victim_row, 0);

    // The victim had the strictly highest weight among the resident values.
    let column = eviction.column;
    let victim_weight = allocation.weights.get(eviction.victim_row, column);
    for row in 1..3 {
        assert!(allocation.weights.get(row, column) < victim_weight);
    }

    // `d` took the victim's register; `a` waits on the stack until its use.
    assert_eq!(allocation.slot(3, 3), Some(Slot::Reg(eviction.register)));
    assert_eq!(allocation.slot(0, 4), Some(Slot::Stack));
    assert!(matches!(allocation.slot(0, 5), Some(Slot::Reg(_))));
    assert_eq!(allocation.weights.get(0, 5), IN_USE);

    assert!(allocation.registers_used <= 3);
    assert_eq!(session.stats().evictions, 1);
}

#[test]
fn test_no_two_live_values_share_a_register_outside_handover() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let stmts = four_live_values();

    let allocation = allocate(&session, &stmts, 3).unwrap();
    for column in 0..stmts.len() {
        let mut seen = Vec::new();
        for (idx, row) in allocation.rows.iter().enumerate() {
            // A value read for the last time may hand its register to the
            // value defined at the same column.
            if row.last() == column {
                continue;
            }
            if let Some(Slot::Reg(reg)) = allocation.slot(idx, column) {
                assert!(!seen.contains(&reg), "r{reg} shared at column {column}");
                seen.push(reg);
            }
        }
    }
}

#[test]
fn test_larger_pool_needs_no_eviction() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);

    let allocation = allocate(&session, &four_live_values(), 4).unwrap();
    assert!(allocation.evictions.is_empty());
    assert_eq!(allocation.column_map().values().filter(|slot| **slot < 0).count(), 0);
}

#[test]
fn test_pipeline_allocates_every_function() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = TreeBuilder::new(&session);

    let sum = |x: &str, y: &str| b.binary(BinaryOp::Add, b.reference(x), b.reference(y));
    let file = session.alloc_vec(vec![b.function(
        "mix",
        vec![
            b.param("a", b.int_ty()),
            b.param("b", b.int_ty()),
            b.param("c", b.int_ty()),
            b.param("d", b.int_ty()),
        ],
        Some(b.int_ty()),
        vec![
            b.local("e", None, Some(sum("c", "d"))),
            b.local("f", None, Some(sum("a", "b"))),
            b.ret(Some(sum("e", "f"))),
        ],
    )]);

    let compiled = Compiler::new(&session).compile(&[file]).unwrap();
    assert!(compiled.succeeded());

    let name = State::from_names(["mix"], AddressKind::Function);
    let allocation = compiled.allocation(&name).unwrap();
    let decoded = compiled.decoded(&name).unwrap();
    assert_eq!(allocation.weights.columns(), decoded.stmts.len());
    assert!(!allocation.evictions.is_empty());
    assert_eq!(compiled.stats.evictions, allocation.evictions.len());
}

#[test]
fn test_loop_carried_value_is_not_live_before_its_definition() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = TreeBuilder::new(&session);

    let file = session.alloc_vec(vec![b.function(
        "count",
        vec![b.param("n", b.int_ty())],
        Some(b.int_ty()),
        vec![
            b.local("i", Some(b.int_ty()), Some(b.int(0))),
            b.while_(
                b.binary(BinaryOp::Lt, b.reference("i"), b.reference("n")),
                vec![b.set("i", b.binary(BinaryOp::Add, b.reference("i"), b.int(1)))],
            ),
            b.ret(Some(b.reference("i"))),
        ],
    )]);
    let compiled = Compiler::new(&session).compile(&[file]).unwrap();
    assert!(compiled.succeeded());

    let name = State::from_names(["count"], AddressKind::Function);
    let allocation = compiled.allocation(&name).unwrap();
    let decoded = compiled.decoded(&name).unwrap();

    for (idx, row) in allocation.rows.iter().enumerate() {
        assert_eq!(row.first(), row.def, "row {idx} marked before its definition");
        for column in 0..row.def {
            assert_eq!(allocation.slot(idx, column), None, "row {idx} holds a slot at {column}");
        }
    }

    // The back-edge operand of the header phi is defined after the phi.
    let phi = decoded.stmts.iter().find(|s| s.opcode == Opcode::Phi).unwrap();
    let Some(IrArg::Ref(carried)) = phi.args.last() else {
        panic!("phi without operands");
    };
    assert!(carried.index() > phi.number.index());
    let row = allocation.rows.iter().find(|r| r.value == *carried).unwrap();
    assert!(row.marks().iter().all(|&m| m >= row.def));
}

#[test]
fn test_equal_weights_keep_the_earlier_row_resident() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);

    // `a` and `b` are both read at column 2 and again at column 4, so at
    // column 3 they have been idle equally long when `c` needs a register.
    let stmts = vec![
        stmt(0, Opcode::LoadParam, vec![IrArg::Int(0)]),
        stmt(1, Opcode::LoadParam, vec![IrArg::Int(1)]),
        stmt(2, Opcode::Add, vec![value(0), value(1)]),
        stmt(3, Opcode::LoadParam, vec![IrArg::Int(2)]),
        stmt(4, Opcode::Add, vec![value(0), value(1)]),
        stmt(5, Opcode::Add, vec![value(3), value(4)]),
        stmt(6, Opcode::Ret, vec![value(5)]),
    ];
    let allocation = allocate(&session, &stmts, 2).unwrap();

    assert_eq!(allocation.weights.get(0, 3), allocation.weights.get(1, 3));
    assert!(allocation.weights.get(0, 3) > 0);

    let first = allocation.evictions[0];
    assert_eq!(first.column, 3);
    assert_eq!(first.victim_row, 1);
    assert_eq!(allocation.slot(0, 3), Some(Slot::Reg(0)));
    assert_eq!(allocation.slot(1, 3), Some(Slot::Stack));
    assert_eq!(allocation.slot(2, 3), Some(Slot::Reg(first.register)));
}
