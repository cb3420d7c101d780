use clap::{Parser as ClapParser, Subcommand};
use dynaquery::cli::{self, CheckOptions, CheckResult, CliError};
use std::io::{self, Read};

#[derive(ClapParser)]
#[command(name = "dynaquery")]
#[command(about = "dynaquery - run dynamic filter, ordering and projection expressions over JSON rows")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and execute expressions against a JSON array of rows
    Check {
        /// Boolean expression rows must satisfy
        #[arg(short, long)]
        filter: Option<String>,

        /// Ordering clause, e.g. "Name, Price DESC"
        #[arg(short, long)]
        order_by: Option<String>,

        /// Projection, e.g. "new(Name, Price * 2 as DoublePrice)"
        #[arg(short, long)]
        select: Option<String>,

        /// Rows to skip after ordering
        #[arg(long)]
        skip: Option<usize>,

        /// Maximum number of rows to return
        #[arg(long)]
        take: Option<usize>,

        /// JSON value for @0, @1, ... (repeatable)
        #[arg(short, long = "arg")]
        args: Vec<String>,

        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,

        /// Only validate syntax, don't execute
        #[arg(long)]
        syntax_only: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            filter,
            order_by,
            select,
            skip,
            take,
            args,
            input,
            pretty,
            syntax_only,
        } => run_check(CheckOptions {
            filter,
            order_by,
            select,
            skip,
            take,
            args,
            input,
            pretty,
            syntax_only,
        }),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run_check(mut options: CheckOptions) -> Result<(), CliError> {
    if options.input.is_none() && !options.syntax_only && !atty::is(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        options.input = Some(buffer);
    }

    match cli::execute_check(&options)? {
        CheckResult::SyntaxValid => println!("Syntax is valid"),
        CheckResult::Success(output) => {
            let json = if options.pretty {
                serde_json::to_string_pretty(&output)
            } else {
                serde_json::to_string(&output)
            }?;
            println!("{}", json);
        }
    }
    Ok(())
}
