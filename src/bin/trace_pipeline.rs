//! Run a built-in sample program through the whole pipeline and print every
//! intermediate result: generated IR, decoded streams, register assignments,
//! diagnostics and session statistics.

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use ssac::ast::{BinaryOp, Decl, TreeBuilder};
use ssac::symbols::AccessModifier;
use ssac::{CompilationSession, CompileOptions, Compiler};
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// A variable assigned on both arms of an if/else and read after the merge
    IfMerge,
    /// A counter updated in a while loop whose condition reads it
    WhileLoop,
    /// A private member reached through a derived type
    Access,
}

#[derive(Parser)]
#[command(name = "trace_pipeline")]
#[command(about = "Trace a sample program through analysis, SSA construction and register allocation", long_about = None)]
struct Cli {
    /// Sample program to compile
    #[arg(value_enum, default_value = "if-merge")]
    scenario: Scenario,

    /// Number of allocatable registers
    #[arg(short, long, default_value_t = 3)]
    registers: usize,

    /// Do not report access violations
    #[arg(long)]
    no_access: bool,

    /// Do not fold constant expressions
    #[arg(long)]
    no_fold: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn sample<'a>(b: &TreeBuilder<'_, 'a>, scenario: Scenario) -> Vec<Decl<'a>> {
    match scenario {
        Scenario::IfMerge => vec![b.function(
            "pick",
            vec![b.param("c", b.bool_ty())],
            Some(b.int_ty()),
            vec![
                b.local("x", Some(b.int_ty()), Some(b.int(0))),
                b.if_(
                    vec![(b.reference("c"), vec![b.set("x", b.int(1))])],
                    Some(vec![b.set("x", b.int(2))]),
                ),
                b.ret(Some(b.reference("x"))),
            ],
        )],
        Scenario::WhileLoop => vec![b.function(
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
        )],
        Scenario::Access => vec![
            b.data(
                "A",
                None,
                vec![b.with_access(
                    b.var("x", Some(b.int_ty()), Some(b.int(1))),
                    AccessModifier::Private,
                )],
            ),
            b.data("B", Some("A"), vec![]),
            b.function(
                "main",
                vec![],
                None,
                vec![b.local("v", None, Some(b.reference("B.x")))],
            ),
        ],
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let options = CompileOptions {
        register_pool: cli.registers,
        enforce_access: !cli.no_access,
        fold_constants: !cli.no_fold,
    };
    let arena = Bump::new();
    let session = CompilationSession::with_options(&arena, options);
    let builder = TreeBuilder::new(&session);
    let file = session.alloc_vec(sample(&builder, cli.scenario));

    let mut compiler = Compiler::new(&session);
    let compiled = match compiler.compile(&[file]) {
        Ok(compiled) => compiled,
        Err(err) => {
            eprintln!("fatal: {err}");
            for diagnostic in session.diagnostics().entries() {
                eprintln!("  {diagnostic}");
            }
            return ExitCode::FAILURE;
        }
    };

    println!("{}", compiled.program);
    for function in &compiled.decoded {
        print!("{function}");
        if let Some(allocation) = compiled.allocation(&function.name) {
            println!("registers:");
            print!("{allocation}");
        }
        println!();
    }

    for diagnostic in compiled.diagnostics.entries() {
        println!(
            "{:?} {} at {}: [{}]",
            diagnostic.level,
            diagnostic.code.as_str(),
            diagnostic.offset,
            diagnostic.args.join(", ")
        );
    }
    print!("{}", compiled.stats);

    if compiled.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
