//! CLI `doctor` command: run diagnostics and print a health report.

use anyhow::{Context, Result};

use strata::config::StrataConfig;
use strata::db;
use strata::schema::manager::SchemaManager;

/// Check the database, schema state and startup prerequisites.
pub fn doctor(config: &StrataConfig) -> Result<()> {
    println!("Strata Health Report");
    println!("====================");
    println!();

    report_database(config)?;
    println!();
    report_schema(config);
    println!();
    report_prerequisites(config);

    Ok(())
}

fn report_database(config: &StrataConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database:          not found at {}", db_path.display());
        println!("Run `strata serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Row counts:");
    println!("  Things:          {}", report.thing_count);
    println!("  Actions:         {}", report.action_count);
    println!("  Audit log:       {}", report.log_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
    }
    Ok(())
}

fn report_schema(config: &StrataConfig) {
    let Some(dir) = config.resolved_schema_dir() else {
        println!("Schema state:      NOT CONFIGURED (add a [schema] section; serve will exit)");
        return;
    };
    if !dir.exists() {
        println!("Schema state:      {} (not created yet)", dir.display());
        return;
    }
    match SchemaManager::open(&dir) {
        Ok((manager, schema)) => {
            println!("Schema state:      {}", dir.display());
            println!("  Status:          {:?}", manager.state());
            println!("  Thing classes:   {}", schema.things.classes.len());
            println!("  Action classes:  {}", schema.actions.classes.len());
            println!("  Hash:            {}", schema.hash());
        }
        Err(e) => println!("Schema state:      FAILED ({e})"),
    }
}

fn report_prerequisites(config: &StrataConfig) {
    let files = [
        ("Contextionary knn", config.contextionary.knn_file.as_deref()),
        ("Contextionary idx", config.contextionary.idx_file.as_deref()),
    ];
    for (label, file) in files {
        match file.map(strata::config::expand_tilde) {
            None => println!("{label}: not specified"),
            Some(path) if path.exists() => println!("{label}: {}", path.display()),
            Some(path) => println!("{label}: MISSING ({})", path.display()),
        }
    }

    match &config.network {
        None => println!("Network:           solo"),
        Some(net) => println!(
            "Network:           p2p via {} as '{}'",
            net.genesis_url, net.peer_name
        ),
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
