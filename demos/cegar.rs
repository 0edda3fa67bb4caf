use std::rc::Rc;

use clap::{Parser, ValueEnum};

use cegar_rs::algorithm::{CegarAlgorithm, CegarOptions};
use cegar_rs::arg::dot::{to_dot, ArgView};
use cegar_rs::arg::reached::WaitlistOrder;
use cegar_rs::arg::StateId;
use cegar_rs::bdd_solver::BddSolver;
use cegar_rs::cfa::{Cfa, CfaBuilder};
use cegar_rs::error::Verdict;
use cegar_rs::formula::Formula;
use cegar_rs::predicate::AbstractionType;
use cegar_rs::refinement::{PredicateBasis, PredicateSharing};
use cegar_rs::shutdown::ShutdownNotifier;

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Program {
    /// Lock acquired and released in a loop, error if it is held on exit.
    Lock,
    /// A diamond whose join leads to a reachable error.
    Diamond,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Sharing {
    Global,
    Scope,
    Function,
    Location,
    LocationInstance,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Basis {
    All,
    Target,
    Cutpoint,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Abstraction {
    Cartesian,
    Boolean,
    Combined,
    Elimination,
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Program to analyse.
    #[arg(value_enum, default_value = "lock")]
    program: Program,

    /// Where new predicates are attached.
    #[clap(long, value_enum, default_value = "location")]
    sharing: Sharing,

    /// Which old predicates a new precision starts from.
    #[clap(long, value_enum, default_value = "target")]
    basis: Basis,

    #[clap(long, value_enum, default_value = "boolean")]
    abstraction: Abstraction,

    /// Explore depth-first instead of breadth-first.
    #[clap(long)]
    dfs: bool,

    /// Restart from the ARG root after this many refinements (0 = never).
    #[clap(long, value_name = "INT", default_value = "0")]
    restart: usize,

    /// Print the final ARG in DOT format.
    #[clap(long)]
    dot: bool,
}

fn lock_program() -> Cfa {
    let mut b = CfaBuilder::new("main");
    let entry = b.entry();
    let head = b.node();
    let body = b.node();
    let locked = b.node();
    let unlocked = b.node();
    let exit = b.node();
    let err = b.node();
    let end = b.node();
    b.assign(entry, head, "lock", Formula::mk_false());
    b.branch(head, Formula::var("c"), body, exit);
    b.assign(body, locked, "lock", Formula::mk_true());
    b.assign(locked, unlocked, "lock", Formula::mk_false());
    b.havoc(unlocked, head, "c");
    b.branch(exit, Formula::var("lock"), err, end);
    b.error(err);
    b.build()
}

fn diamond_program() -> Cfa {
    let mut b = CfaBuilder::new("main");
    let entry = b.entry();
    let split = b.node();
    let then = b.node();
    let other = b.node();
    let join = b.node();
    let err = b.node();
    let end = b.node();
    b.havoc(entry, split, "x");
    b.branch(split, Formula::var("x"), then, other);
    b.assign(then, join, "y", Formula::mk_true());
    b.assign(other, join, "y", Formula::mk_false());
    b.branch(join, Formula::var("y"), err, end);
    b.error(err);
    b.build()
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let cfa = Rc::new(match args.program {
        Program::Lock => lock_program(),
        Program::Diamond => diamond_program(),
    });
    println!("CFA with {} nodes and {} error locations", cfa.num_nodes(), cfa.error_locations().len());

    let mut options = CegarOptions::default();
    options.refinement.sharing = match args.sharing {
        Sharing::Global => PredicateSharing::Global,
        Sharing::Scope => PredicateSharing::Scope,
        Sharing::Function => PredicateSharing::Function,
        Sharing::Location => PredicateSharing::Location,
        Sharing::LocationInstance => PredicateSharing::LocationInstance,
    };
    options.refinement.basis = match args.basis {
        Basis::All => PredicateBasis::All,
        Basis::Target => PredicateBasis::Target,
        Basis::Cutpoint => PredicateBasis::Cutpoint,
    };
    options.refinement.restart_after_refinements = args.restart;
    options.abstraction.abstraction_type = match args.abstraction {
        Abstraction::Cartesian => AbstractionType::Cartesian,
        Abstraction::Boolean => AbstractionType::Boolean,
        Abstraction::Combined => AbstractionType::Combined,
        Abstraction::Elimination => AbstractionType::Elimination,
    };
    if args.dfs {
        options.algorithm.waitlist_order = WaitlistOrder::Dfs;
    }

    let shutdown = ShutdownNotifier::new();
    let solver = Rc::new(BddSolver::new(shutdown.clone()));
    let (mut cegar, mut reached) = CegarAlgorithm::predicate_analysis(cfa.clone(), solver, &options, shutdown)?;
    let verdict = cegar.run(&mut reached)?;

    match &verdict {
        Verdict::Safe => println!("Verdict: SAFE"),
        Verdict::Unsafe(cex) => {
            println!("Verdict: UNSAFE");
            println!("Counterexample:\n{}", cex);
        }
    }
    println!("{}", cegar.statistics());

    if args.dot {
        let arg = reached.arg().borrow();
        let on_path: Vec<_> = match &verdict {
            Verdict::Unsafe(cex) => cex.path().states().to_vec(),
            Verdict::Safe => Vec::new(),
        };
        let highlight = |from: StateId, to: StateId| on_path.windows(2).any(|w| w[0] == from && w[1] == to);
        let dot = to_dot(&ArgView::new(&arg, Some(cfa.as_ref())), &highlight)?;
        println!("{}", dot);
    }

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
