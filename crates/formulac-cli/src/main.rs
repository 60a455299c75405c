//! formulac CLI - compile, inspect and translate spreadsheet formulas

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use formulac::{
    FormulaCompiler, FormulaTokenArray, Grammar, OpCodeMapRegistry, Payload, ReferenceResolver,
    Token,
};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum GrammarArg {
    Native,
    English,
    Podf,
    Odff,
    EnglishXl,
    Ooxml,
}

impl From<GrammarArg> for Grammar {
    fn from(arg: GrammarArg) -> Grammar {
        match arg {
            GrammarArg::Native => Grammar::NATIVE,
            GrammarArg::English => Grammar::ENGLISH,
            GrammarArg::Podf => Grammar::PODF,
            GrammarArg::Odff => Grammar::ODFF,
            GrammarArg::EnglishXl => Grammar::ENGLISH_XL,
            GrammarArg::Ooxml => Grammar::OOXML,
        }
    }
}

#[derive(Parser)]
#[command(name = "formulac")]
#[command(author, version, about = "Spreadsheet formula compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a formula and print its RPN token listing
    Compile {
        /// Formula text, with or without the leading '='
        formula: String,

        /// Grammar to compile in
        #[arg(short, long, value_enum, default_value = "english")]
        grammar: GrammarArg,

        /// Repair syntax errors with sentinel tokens instead of aborting
        #[arg(short, long)]
        repair: bool,
    },

    /// Translate a formula from one grammar to another
    Translate {
        /// Formula text in the source grammar
        formula: String,

        /// Source grammar
        #[arg(long, value_enum, default_value = "english")]
        from: GrammarArg,

        /// Target grammar
        #[arg(long, value_enum, default_value = "ooxml")]
        to: GrammarArg,
    },

    /// Compile, decompile and verify the rendition is stable
    Roundtrip {
        /// Formula text
        formula: String,

        /// Grammar to use for both directions
        #[arg(short, long, value_enum, default_value = "english")]
        grammar: GrammarArg,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            formula,
            grammar,
            repair,
        } => compile(&formula, grammar.into(), repair),
        Commands::Translate { formula, from, to } => translate(&formula, from.into(), to.into()),
        Commands::Roundtrip { formula, grammar } => roundtrip(&formula, grammar.into()),
    }
}

fn compile(formula: &str, grammar: Grammar, repair: bool) -> Result<()> {
    let registry = Arc::new(OpCodeMapRegistry::new());
    let mut compiler = FormulaCompiler::new(registry, grammar);
    if repair {
        compiler.enable_stop_on_error(false);
        compiler.set_auto_correction(true);
    }

    let mut rpn = FormulaTokenArray::new();
    let clean = compiler
        .compile_token_array(formula, &mut rpn)
        .with_context(|| format!("Failed to compile '{}'", formula))?;

    for (i, token) in rpn.iter().enumerate() {
        println!("{:4}  {}", i, describe_token(&compiler, token));
    }

    if !clean {
        if let Some(code) = rpn.error() {
            eprintln!("Repaired with error {}", code);
        }
        if !compiler.corrected_formula().is_empty() {
            eprintln!("Corrected: ={}", compiler.corrected_formula());
        }
    }

    Ok(())
}

fn translate(formula: &str, from: Grammar, to: Grammar) -> Result<()> {
    let registry = Arc::new(OpCodeMapRegistry::new());
    let mut source = FormulaCompiler::new(Arc::clone(&registry), from);
    let rpn = source
        .compile(formula)
        .with_context(|| format!("Failed to compile '{}'", formula))?;

    let target = FormulaCompiler::new(registry, to);
    let text = target
        .create_string_from_token_array(&rpn)
        .context("Failed to render the token array")?;
    println!("{}", text);
    Ok(())
}

fn roundtrip(formula: &str, grammar: Grammar) -> Result<()> {
    let registry = Arc::new(OpCodeMapRegistry::new());
    let mut compiler = FormulaCompiler::new(registry, grammar);

    let first = compiler
        .compile(formula)
        .with_context(|| format!("Failed to compile '{}'", formula))?;
    let text = compiler
        .create_string_from_token_array(&first)
        .context("Failed to render the token array")?;
    let second = compiler
        .compile(&text)
        .with_context(|| format!("Rendition '{}' does not compile", text))?;

    println!("{}", text);
    if !first.semantically_equal(&second) {
        bail!("round trip changed the compiled token array");
    }
    Ok(())
}

fn describe_token<R: ReferenceResolver>(
    compiler: &FormulaCompiler<R>,
    token: &Token,
) -> String {
    let map = compiler.op_code_map();
    match &token.payload {
        Payload::None => format!("{:?} {}", token.op, map.symbol(token.op)),
        Payload::Byte(argc) => format!("{:?} {} argc={}", token.op, map.symbol(token.op), argc),
        Payload::Double(value) => format!("push {}", value),
        Payload::Str(s) => format!("{:?} \"{}\"", token.op, s),
        Payload::SingleRef(r) => format!("push ref {}", r.to_a1()),
        Payload::DoubleRef(r) => format!("push range {}", r.to_a1()),
        Payload::Matrix(m) => format!("push matrix {}x{}", m.rows, m.cols),
        Payload::External { name, argc } => format!("external {} argc={}", name, argc),
        Payload::Name(n) => format!("push name {}", n),
        Payload::Jump(offsets) => format!("{:?} jump {:?}", token.op, offsets),
        Payload::Error(e) => format!("push error {}", e),
    }
}
