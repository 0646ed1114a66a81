use std::io::{self, BufRead, Write};

use tracing_subscriber::EnvFilter;

use pagedb::{Database, QueryResult};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let data_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./data".to_string());

    let mut db = match Database::open(&data_dir) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("failed to open database at {data_dir}: {e}");
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match db.execute(line) {
            Ok(results) => {
                for result in results {
                    print_result(&result);
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }

        stdout.flush().unwrap();
    }

    if let Err(e) = db.close() {
        eprintln!("error while closing: {e}");
    }
}

fn print_result(result: &QueryResult) {
    match result {
        QueryResult::None => {}
        QueryResult::RowsAffected(count) => {
            println!("{count} row(s)");
        }
        QueryResult::Rows { header, rows } => {
            println!("{}", header.join(","));
            for row in rows {
                let fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                println!("{}", fields.join(","));
            }
        }
    }
}
