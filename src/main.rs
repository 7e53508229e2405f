//! CLI binary (§6). Thin dispatcher: parse arguments, run the library
//! pipeline, and render whichever of the eight subcommands was asked for.

#[cfg(feature = "cli")]
fn main() -> color_eyre::Result<()> {
    use std::collections::HashMap;

    use clap::Parser;
    use logica::cli::{read_source, Cli, Command};
    use logica::config::Config;
    use logica::error::{render_all, Error};

    color_eyre::install()?;
    env_logger::init();

    let mut cli = Cli::parse();
    let source = read_source(&mut cli.file)?;
    let file_name = cli.file.path().to_string_lossy().into_owned();

    let mut config = Config::default()
        .with_search_paths_from_env(&std::env::var("LOGICAPATH").unwrap_or_default())
        .with_display_mode(cli.display);
    if let Some(path) = &cli.config {
        config = config.with_config_file(Config::from_yaml_file(path)?);
    }
    let dialect_name = std::env::var("LOGICA_DIALECT").unwrap_or_else(|_| config.default_engine.clone());

    let compiled = match logica::compile_source(&file_name, source.clone(), &config.search_paths, &dialect_name) {
        Ok(c) => c,
        Err(errors) => {
            print_errors(&errors, &file_name, &source);
            std::process::exit(1);
        }
    };

    match &cli.command {
        Command::Parse => {
            println!("{}", serde_json::to_string_pretty(&compiled.program.rules_by_name)?);
        }
        Command::InferTypes => {
            println!("{}", serde_json::to_string_pretty(&render_all(&compiled.type_diagnostics, &compiled.source_map).inner)?);
        }
        Command::ShowSignatures => {
            let dialect = &compiled.program.dialect;
            println!("dialect: {}", dialect.name());
            println!("infix operators:");
            for (op, sql) in dialect.infix_operators() {
                println!("  {op:>4}  ->  {sql}");
            }
            println!("built-in overrides:");
            for (name, template) in dialect.built_in_functions() {
                println!("  {name}  ->  {template}");
            }
        }
        Command::Print { flags, .. } => {
            for name in cli.command.predicates().unwrap_or_default() {
                match compile_one(&compiled, &name, &flags_map(flags)) {
                    Ok(sql) => print_compiled(&sql),
                    Err(e) => fail(&e),
                }
            }
        }
        Command::Run { flags, .. } => run_predicates(&compiled, &config, &cli.command, flags, false)?,
        Command::RunToCsv { flags, .. } => run_predicates(&compiled, &config, &cli.command, flags, true)?,
        Command::RunInTerminal { flags, .. } => run_predicates(&compiled, &config, &cli.command, flags, false)?,
        Command::BuildSchema { .. } => {
            for err in &compiled.type_diagnostics {
                eprintln!("{}", render_all(&[err.clone()], &compiled.source_map));
            }
            for name in cli.command.predicates().unwrap_or_default() {
                println!("{name}: (schema inference is diagnostic-only; see infer-types)");
            }
        }
    }

    fn flags_map(pairs: &[(String, String)]) -> HashMap<String, String> {
        pairs.iter().cloned().collect()
    }

    fn compile_one(
        compiled: &logica::CompiledProgram,
        name: &str,
        _flags: &HashMap<String, String>,
    ) -> Result<logica::program::CompiledPredicateSql, Error> {
        compiled.program.compile(name)
    }

    fn print_compiled(sql: &logica::program::CompiledPredicateSql) {
        let formatted = |stmt: &str| sqlformat::format(stmt, &sqlformat::QueryParams::default(), sqlformat::FormatOptions::default());
        for stmt in &sql.preamble {
            println!("{}", formatted(stmt));
        }
        for stmt in &sql.ground_statements {
            println!("{}", formatted(stmt));
        }
        println!("{}", formatted(&sql.sql));
    }

    fn fail(e: &Error) -> ! {
        eprintln!("{}", e.message());
        std::process::exit(1);
    }

    fn print_errors(errors: &[Error], _file_name: &str, _source: &str) {
        for error in errors {
            eprintln!("{}", error.message());
        }
    }

    fn run_predicates(
        compiled: &logica::CompiledProgram,
        config: &Config,
        command: &Command,
        flags: &[(String, String)],
        as_csv: bool,
    ) -> color_eyre::Result<()> {
        use logica::concertina::{display, Action, ActionType, Graph, Launcher};

        let flags = flags_map(flags);
        let names = command.predicates().unwrap_or_default();
        if config.display_mode != display::DisplayMode::None {
            let actions: Vec<Action> = names
                .iter()
                .map(|name| Action {
                    name: name.clone(),
                    action_type: ActionType::Final,
                    requires: Vec::new(),
                    launcher: Launcher::Query,
                    engine: config.default_engine.clone(),
                    predicate: name.clone(),
                    sql: String::new(),
                })
                .collect();
            if let Ok(graph) = Graph::build(actions) {
                print!("{}", display::render(&graph, config.display_mode));
            }
        }
        for name in names {
            let sql = compile_one(compiled, &name, &flags).map_err(|e| color_eyre::eyre::eyre!(e.message()))?;
            for stmt in sql.preamble.iter().chain(sql.ground_statements.iter()) {
                config.runner.run(stmt, &config.default_engine, false).map_err(|e| color_eyre::eyre::eyre!(e.message()))?;
            }
            let result = config
                .runner
                .run(&sql.sql, &config.default_engine, true)
                .map_err(|e| color_eyre::eyre::eyre!(e.message()))?;
            let Some((header, rows)) = result else { continue };
            if as_csv {
                let mut writer = csv::Writer::from_writer(std::io::stdout());
                writer.write_record(&header)?;
                for row in &rows {
                    writer.write_record(row)?;
                }
                writer.flush()?;
            } else {
                println!("{}", header.join(" | "));
                for row in &rows {
                    println!("{}", row.join(" | "));
                }
            }
        }
        Ok(())
    }

    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("this binary was built without the `cli` feature");
    std::process::exit(1);
}
