//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `roster_core` linkage and the configured database end to end.
//! - Print the projected roster for an optional search term.
//!
//! Usage: `roster_cli [search term...]`

use log::error;
use roster_core::db::open_db;
use roster_core::{
    init_logging, RosterConfig, RosterProjection, StoreStudentRepository, StudentStore,
};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    println!("roster_core ping={}", roster_core::ping());
    println!("roster_core version={}", roster_core::core_version());

    let config = RosterConfig::from_env();
    if let Some(log_dir) = config.log_dir.as_ref().and_then(|dir| dir.to_str()) {
        if let Err(err) = init_logging(config.log_level.as_str(), log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(&config, std::env::args().skip(1).collect::<Vec<_>>().join(" ")) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_run module=cli status=error error={message}");
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &RosterConfig, term: String) -> Result<(), String> {
    let conn = open_db(&config.db_path).map_err(|err| {
        format!(
            "failed to open roster db `{}`: {err}",
            config.db_path.display()
        )
    })?;
    let store = StudentStore::open(conn).map_err(|err| format!("failed to open store: {err}"))?;
    let projection = RosterProjection::spawn(
        StoreStudentRepository::new(Arc::new(store)),
        &tokio::runtime::Handle::current(),
    );

    projection.set_search_term(term);
    let view = projection.current_view();
    println!(
        "roster db={} term={:?} matches={}",
        config.db_path.display(),
        projection.search_term(),
        view.count
    );
    for record in &view.records {
        println!("{:>6}  {:<24}  {}", record.id, record.name, record.course);
    }

    projection.shutdown();
    Ok(())
}
