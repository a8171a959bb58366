use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use clap::Parser;
use refindex::{
    CodeIndex,
    DataDir,
    IndexStore,
    Settings,
    SharedIndex,
    cli::{Cli, Command},
    error,
    ingestion,
    search,
    server::{self, ServerState},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("REFINDEX_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let documents = data_dir.documents_dir(cli.documents.as_deref());
    let store = IndexStore::new(data_dir.index_file());
    let settings = cli.indexer.settings();

    match cli.command {
        Command::Build => {
            cmd_build(&store, &documents, &settings)?;
        }
        Command::Search(args) => {
            let index = load_index(&store, &documents, &settings)?;
            let results = search::search(&index, &args.terms);
            if args.json {
                search::format_json(&results)?;
            } else {
                search::format_human(&results);
            }
        }
        Command::Codes(args) => {
            let index = load_index(&store, &documents, &settings)?;
            let codes = search::list_codes(&index);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&codes)?);
            } else if codes.is_empty() {
                println!("No codes indexed.");
            } else {
                for code in &codes {
                    println!("{code}");
                }
            }
        }
        Command::Serve(args) => {
            let index = load_index(&store, &documents, &settings)?;
            let state = ServerState::new(
                SharedIndex::new(index),
                store,
                documents,
                settings,
            );
            server::run_server(args.addr, state)?;
        }
        Command::Status(args) => {
            cmd_status(&data_dir, &store, &documents, args.json)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

/// The persisted index, built and saved first if there is none yet.
fn load_index(
    store: &IndexStore,
    documents: &Path,
    settings: &Settings,
) -> error::Result<CodeIndex> {
    store.load_or_build(|| {
        let cancel = AtomicBool::new(false);
        ingestion::build_from_dir(documents, settings, &cancel)
            .map(|(index, _)| index)
    })
}

/// Set the returned flag on Ctrl-C.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "Ctrl-C will not cancel the build");
                return;
            }
        };
        if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
            eprintln!("Cancelling, waiting for running documents...");
            flag.store(true, Ordering::Relaxed);
        }
    });
    cancel
}

fn cmd_build(
    store: &IndexStore,
    documents: &Path,
    settings: &Settings,
) -> error::Result<()> {
    eprintln!("Indexing {}...", documents.display());
    let cancel = cancel_on_ctrl_c();
    let (index, report) =
        ingestion::build_from_dir(documents, settings, &cancel)?;
    store.save(&index)?;

    eprintln!("  Documents: {}", report.documents);
    if !report.skipped.is_empty() {
        eprintln!("  Skipped: {}", report.skipped.len());
        for id in &report.skipped {
            eprintln!("    {id}");
        }
    }
    eprintln!("  Codes: {}", report.codes);
    eprintln!("  Entries: {}", report.entries);
    info!(path = %store.path().display(), "build complete");
    Ok(())
}

fn cmd_status(
    data_dir: &DataDir,
    store: &IndexStore,
    documents: &Path,
    json: bool,
) -> error::Result<()> {
    let index = store.load()?;
    let (codes, entries) = index
        .as_ref()
        .map_or((0, 0), |i| (i.code_count(), i.entry_count()));

    if json {
        let status = serde_json::json!({
            "data_dir": data_dir.root(),
            "documents_dir": documents,
            "index_file": store.path(),
            "indexed": index.is_some(),
            "codes": codes,
            "entries": entries,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Documents: {}", documents.display());
        println!("Index file: {}", store.path().display());
        if index.is_some() {
            println!("Codes: {codes}");
            println!("Entries: {entries}");
        } else {
            println!("Not built yet.");
        }
    }
    Ok(())
}
